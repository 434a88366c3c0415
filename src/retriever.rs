use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::index::FlatIndex;
use crate::model::{Hit, Record};
use crate::positions::PositionResolver;
use crate::provider::EmbeddingProvider;
use crate::storage::RecordStore;

/// Query text → top-k records, nearest first.
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<FlatIndex>,
    resolver: Arc<PositionResolver>,
    store: Arc<RecordStore>,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<FlatIndex>,
        resolver: PositionResolver,
        store: Arc<RecordStore>,
    ) -> Self {
        Self { embedder, index, resolver: Arc::new(resolver), store }
    }

    pub fn index(&self) -> &FlatIndex {
        &self.index
    }

    pub async fn retrieve(&self, query_text: &str, k: usize) -> Result<Vec<Hit>> {
        if self.index.is_empty() {
            debug!("Index is empty; nothing to retrieve");
            return Ok(Vec::new());
        }

        let query = self.embedder.embed_one(query_text).await?;
        let result = self.index.search(&query, k)?;

        let (positions, distances): (Vec<usize>, Vec<f32>) = result.hits().unzip();
        let records = self.resolve(positions.clone()).await?;

        let mut hits = Vec::with_capacity(records.len());
        for ((position, distance), record) in positions.iter().zip(distances).zip(records) {
            match record {
                Some(record) => hits.push(Hit { record, distance }),
                None => warn!("Index position {} resolves to no record; skipping", position),
            }
        }
        Ok(hits)
    }

    // rusqlite blocks; keep the lookups off the async workers.
    async fn resolve(&self, positions: Vec<usize>) -> Result<Vec<Option<Record>>> {
        let resolver = self.resolver.clone();
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || resolver.resolve(&store, &positions))
        .await
        .map_err(|e| Error::Task(format!("record lookup: {}", e)))?
    }
}
