use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

pub const DEFAULT_CONFIG_PATH: &str = "config.json";
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Everything the node needs, read once at startup from `config.json`.
///
/// Only `openai_api_key` is mandatory; `OPENAI_API_KEY` and
/// `HINDSIGHT_API_BASE` in the environment override the file.
#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_allowed_origin")]
    pub allowed_origin: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_api_base() -> String { DEFAULT_API_BASE.to_string() }
fn default_embedding_model() -> String { "text-embedding-ada-002".to_string() }
fn default_chat_model() -> String { "gpt-4".to_string() }
fn default_max_output_tokens() -> u32 { 150 }
fn default_db_path() -> PathBuf { PathBuf::from("local_browsing_history.db") }
fn default_index_path() -> PathBuf { PathBuf::from("history_index.bin") }
fn default_batch_size() -> usize { 10 }
fn default_listen_addr() -> String { "0.0.0.0:8000".to_string() }
fn default_allowed_origin() -> String { "http://localhost:3000".to_string() }
fn default_request_timeout_secs() -> u64 { 30 }

impl Default for Settings {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            api_base: default_api_base(),
            embedding_model: default_embedding_model(),
            chat_model: default_chat_model(),
            max_output_tokens: default_max_output_tokens(),
            db_path: default_db_path(),
            index_path: default_index_path(),
            batch_size: default_batch_size(),
            listen_addr: default_listen_addr(),
            allowed_origin: default_allowed_origin(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Credentials and endpoints handed to provider constructors.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub api_key: String,
    pub api_base: String,
    pub embedding_model: String,
    pub chat_model: String,
    pub request_timeout_secs: u64,
}

impl Settings {
    /// Reads `path` if it exists, otherwise starts from defaults, then applies
    /// environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut settings = if path.exists() {
            let raw = fs::read_to_string(path)?;
            serde_json::from_str(&raw).map_err(|e| {
                Error::Configuration(format!("invalid config file {}: {}", path.display(), e))
            })?
        } else {
            Settings::default()
        };

        settings.apply_overrides(
            std::env::var("OPENAI_API_KEY").ok(),
            std::env::var("HINDSIGHT_API_BASE").ok(),
        );
        Ok(settings)
    }

    fn apply_overrides(&mut self, api_key: Option<String>, api_base: Option<String>) {
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            self.openai_api_key = Some(key);
        }
        if let Some(base) = api_base.filter(|b| !b.trim().is_empty()) {
            self.api_base = base;
        }
    }

    pub fn provider_config(&self) -> Result<ProviderConfig> {
        let api_key = self
        .openai_api_key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| {
            Error::Configuration(
                "OpenAI API key not found. Add 'openai_api_key' to config.json or set OPENAI_API_KEY".into(),
            )
        })?;

        Ok(ProviderConfig {
            api_key,
            api_base: self.api_base.trim_end_matches('/').to_string(),
            embedding_model: self.embedding_model.clone(),
            chat_model: self.chat_model.clone(),
            request_timeout_secs: self.request_timeout_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_fills_defaults() {
        let s: Settings = serde_json::from_str(r#"{"openai_api_key": "sk-test", "batch_size": 32}"#).unwrap();
        assert_eq!(s.batch_size, 32);
        assert_eq!(s.chat_model, "gpt-4");
        assert_eq!(s.max_output_tokens, 150);
        assert_eq!(s.index_path, PathBuf::from("history_index.bin"));
    }

    #[test]
    fn missing_key_is_configuration_error() {
        let s = Settings::default();
        assert!(matches!(s.provider_config(), Err(Error::Configuration(_))));
    }

    #[test]
    fn overrides_win_over_file_and_trim_base() {
        let mut s = Settings::default();
        s.openai_api_key = Some("from-file".into());
        s.apply_overrides(Some("from-env".into()), Some("http://localhost:9999/v1/".into()));

        let p = s.provider_config().unwrap();
        assert_eq!(p.api_key, "from-env");
        assert_eq!(p.api_base, "http://localhost:9999/v1");
    }

    #[test]
    fn blank_override_is_ignored() {
        let mut s = Settings::default();
        s.openai_api_key = Some("from-file".into());
        s.apply_overrides(Some("  ".into()), None);
        assert_eq!(s.provider_config().unwrap().api_key, "from-file");
    }
}
