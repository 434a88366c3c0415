//! Page metadata enrichment: fetch each stored URL and write back its
//! `<title>` and `<meta name="description">`.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::storage::{PageMetadata, RecordStore};

pub const NO_TITLE: &str = "No title found";
pub const NO_DESCRIPTION: &str = "No description found";

#[derive(Debug, Clone)]
pub struct EnrichOptions {
    pub request_delay: Duration,
    pub timeout: Duration,
    pub max_urls: Option<usize>,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        Self {
            request_delay: Duration::from_secs(2),
            timeout: Duration::from_secs(5),
            max_urls: None,
        }
    }
}

/// Title and description from an HTML document, with fallbacks for absent tags.
pub fn extract_metadata(html: &str) -> (String, String) {
    let doc = Html::parse_document(html);

    let title = Selector::parse("title")
    .ok()
    .and_then(|sel| doc.select(&sel).next())
    .map(|el| el.text().collect::<String>().trim().to_string())
    .filter(|t| !t.is_empty());

    let description = Selector::parse(r#"meta[name="description"]"#)
    .ok()
    .and_then(|sel| doc.select(&sel).next())
    .and_then(|el| el.value().attr("content"))
    .map(|c| c.trim().to_string())
    .filter(|d| !d.is_empty());

    (
        title.unwrap_or_else(|| NO_TITLE.to_string()),
        description.unwrap_or_else(|| NO_DESCRIPTION.to_string()),
    )
}

pub struct MetadataScraper {
    store: Arc<RecordStore>,
    http: Client,
    options: EnrichOptions,
}

impl MetadataScraper {
    pub fn new(store: Arc<RecordStore>, options: EnrichOptions) -> Result<Self> {
        let http = Client::builder()
        .timeout(options.timeout)
        .build()
        .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { store, http, options })
    }

    async fn fetch(&self, url: &str) -> std::result::Result<(String, String), reqwest::Error> {
        let body = self.http.get(url).send().await?.error_for_status()?.text().await?;
        Ok(extract_metadata(&body))
    }

    /// Visits every URL (up to `max_urls`). A failed page is logged and left
    /// untouched; it never aborts the pass. Returns the number of rows updated.
    pub async fn process_urls(&self) -> Result<usize> {
        let urls = self.store.urls(self.options.max_urls)?;
        let total = urls.len();
        let mut metadata = Vec::new();

        for (i, (id, url)) in urls.into_iter().enumerate() {
            info!("Processing URL {}/{}: {}", i + 1, total, url);
            match self.fetch(&url).await {
                Ok((title, description)) => {
                    info!("Extracted title: {}", title.chars().take(50).collect::<String>());
                    metadata.push(PageMetadata { id, title, description });
                }
                Err(e) => warn!("Error processing {}: {}", url, e),
            }

            if i + 1 < total && !self.options.request_delay.is_zero() {
                tokio::time::sleep(self.options.request_delay).await;
            }
        }

        self.store.update_metadata(&metadata)?;
        info!("Successfully processed {} of {} URLs", metadata.len(), total);
        Ok(metadata.len())
    }
}
