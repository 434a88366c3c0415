#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, Connection};
use tempfile::TempDir;

use hindsight::builder::IndexBuilder;
use hindsight::error::{Error, Result};
use hindsight::index::FlatIndex;
use hindsight::positions::PositionResolver;
use hindsight::provider::{EmbeddingProvider, TextGenerator};
use hindsight::retriever::Retriever;
use hindsight::storage::RecordStore;
use hindsight::synth::Synthesizer;
use hindsight::Hindsight;

/// One dimension per topic; words outside the vocabulary are ignored.
const CONCEPTS: &[&[&str]] = &[
    &["upstox", "account", "accounts", "investment", "balance", "demat", "funds", "trading", "portfolio"],
    &["weather", "forecast", "rain", "sunny", "temperature"],
    &["recipe", "recipes", "blog", "pasta", "cooking", "dinner"],
    &["rust", "crate", "compiler", "borrow"],
    &["flight", "flights", "hotel", "booking"],
];

pub fn keyword_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; CONCEPTS.len()];
    for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
        let word = word.to_lowercase();
        if let Some(dim) = CONCEPTS.iter().position(|c| c.contains(&word.as_str())) {
            v[dim] += 1.0;
        }
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

/// Deterministic topic embedder that counts calls and can be told to fail.
#[derive(Default)]
pub struct KeywordEmbedder {
    pub calls: AtomicUsize,
    pub batch_sizes: Mutex<Vec<usize>>,
    /// Fail the n-th call (1-based).
    pub fail_on_call: Option<usize>,
    /// Delay the batch whose first text contains this word.
    pub slow_word: Option<(String, Duration)>,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(call: usize) -> Self {
        Self { fail_on_call: Some(call), ..Self::default() }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.batch_sizes.lock().unwrap().push(texts.len());
        if self.fail_on_call == Some(n) {
            return Err(Error::Provider("429 rate limited".into()));
        }
        if let Some((word, delay)) = &self.slow_word {
            if texts.first().map(|t| t.to_lowercase().contains(word.as_str())).unwrap_or(false) {
                tokio::time::sleep(*delay).await;
            }
        }
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }
}

/// Records every prompt and answers with a canned string.
pub struct RecordingGenerator {
    pub prompts: Mutex<Vec<(String, u32)>>,
    pub answer: String,
    pub fail: bool,
}

impl RecordingGenerator {
    pub fn new(answer: &str) -> Self {
        Self { prompts: Mutex::new(Vec::new()), answer: answer.to_string(), fail: false }
    }

    pub fn failing() -> Self {
        Self { fail: true, ..Self::new("") }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().map(|(p, _)| p.clone())
    }
}

#[async_trait]
impl TextGenerator for RecordingGenerator {
    async fn generate(&self, prompt: &str, max_output_tokens: u32) -> Result<String> {
        self.prompts.lock().unwrap().push((prompt.to_string(), max_output_tokens));
        if self.fail {
            return Err(Error::Generation("upstream 500".into()));
        }
        Ok(self.answer.clone())
    }
}

/// Record store file inside `dir` with rows inserted in the given order.
pub fn store_with(dir: &TempDir, rows: &[(i64, &str, &str)]) -> Arc<RecordStore> {
    let path = dir.path().join("history.db");
    let store = RecordStore::open(&path).unwrap();
    let conn = Connection::open(&path).unwrap();
    for (id, title, desc) in rows {
        conn.execute(
            "INSERT INTO browsing_history (id, url, title, description) VALUES (?1, ?2, ?3, ?4)",
            params![id, format!("https://example.com/{}", id), title, desc],
        )
        .unwrap();
    }
    Arc::new(store)
}

pub fn delete_record(dir: &TempDir, id: i64) {
    let conn = Connection::open(dir.path().join("history.db")).unwrap();
    conn.execute("DELETE FROM browsing_history WHERE id = ?1", params![id]).unwrap();
}

pub fn insert_record(dir: &TempDir, id: i64, title: &str, description: &str) {
    let conn = Connection::open(dir.path().join("history.db")).unwrap();
    conn.execute(
        "INSERT INTO browsing_history (id, url, title, description) VALUES (?1, ?2, ?3, ?4)",
        params![id, format!("https://example.com/{}", id), title, description],
    )
    .unwrap();
}

pub fn demo_rows() -> Vec<(i64, &'static str, &'static str)> {
    vec![
        (1, "Upstox Accounts", "Manage your demat account"),
        (2, "Weather Forecast", "Rain expected tomorrow"),
        (3, "Recipe Blog", "Quick pasta for dinner"),
    ]
}

pub struct Pipeline {
    pub engine: Hindsight,
    pub embedder: Arc<KeywordEmbedder>,
    pub generator: Arc<RecordingGenerator>,
}

/// Builds the index from `store` with `embedder`, reloads it from disk and
/// wires a full engine around it.
pub async fn pipeline(
    dir: &TempDir,
    store: Arc<RecordStore>,
    embedder: Arc<KeywordEmbedder>,
    generator: Arc<RecordingGenerator>,
) -> Pipeline {
    let index_path = dir.path().join("history_index.bin");
    IndexBuilder::new(store.clone(), embedder.clone(), 2)
    .build_index(&index_path)
    .await
    .unwrap();

    let index = FlatIndex::load(&index_path).unwrap();
    let resolver = PositionResolver::for_index(&index_path, index.len()).unwrap();
    let engine = Hindsight::new(
        Retriever::new(embedder.clone(), Arc::new(index), resolver, store),
        Synthesizer::new(generator.clone(), 150),
    );
    Pipeline { engine, embedder, generator }
}
