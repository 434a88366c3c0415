use std::fs;
use std::path::Path;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::index::FlatIndex;
use crate::positions::PositionMap;
use crate::provider::EmbeddingProvider;
use crate::storage::RecordStore;

/// Result of a successful build; already persisted when returned.
#[derive(Debug, Clone)]
pub struct BuiltIndex {
    pub index: FlatIndex,
    pub positions: PositionMap,
}

/// Offline pass: record store → embeddings → index + position map on disk.
pub struct IndexBuilder {
    store: Arc<RecordStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    concurrency: usize,
}

impl IndexBuilder {
    pub fn new(store: Arc<RecordStore>, embedder: Arc<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        Self { store, embedder, batch_size: batch_size.max(1), concurrency: 1 }
    }

    /// Number of embedding batches allowed in flight at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Builds and persists the index at `index_path`, with its position map
    /// alongside. Any provider failure aborts before anything is written.
    pub async fn build_index(&self, index_path: &Path) -> Result<BuiltIndex> {
        let records = self.store.all_records()?;
        let positions = PositionMap::new(records.iter().map(|r| r.id).collect());

        if records.is_empty() {
            warn!("Record store is empty; writing an empty index");
            let built = BuiltIndex { index: FlatIndex::new(0), positions };
            self.persist(&built, index_path)?;
            return Ok(built);
        }

        let texts: Vec<String> = records.iter().map(|r| r.embedding_text()).collect();

        // The first vector fixes the dimension for the whole corpus.
        let probe = self.embedder.embed_one(&texts[0]).await?;
        let mut index = FlatIndex::new(probe.len());
        info!("Embedding dimension {}; indexing {} records", probe.len(), texts.len());

        let total_batches = (texts.len() + self.batch_size - 1) / self.batch_size;
        let embedder = &self.embedder;

        // `buffered` yields in submission order, so positions follow record order
        // even with several batches in flight.
        let mut batches = stream::iter(texts.chunks(self.batch_size))
        .map(|batch| async move {
            let vectors = embedder.embed(batch).await?;
            if vectors.len() != batch.len() {
                return Err(Error::Provider(format!(
                    "batch of {} texts returned {} vectors",
                    batch.len(),
                    vectors.len()
                )));
            }
            Ok::<_, Error>(vectors)
        })
        .buffered(self.concurrency);

        let mut done = 0;
        while let Some(result) = batches.next().await {
            let vectors = result?;
            index.add(&vectors)?;
            done += 1;
            info!("Processed batch {} of {}", done, total_batches);
        }

        let built = BuiltIndex { index, positions };
        self.persist(&built, index_path)?;
        info!("Vector index saved to {}", index_path.display());
        Ok(built)
    }

    // Both files are staged in full before either replaces its predecessor,
    // so a failed write leaves the previous index and map pair untouched.
    fn persist(&self, built: &BuiltIndex, index_path: &Path) -> Result<()> {
        let map_path = PositionMap::path_for(index_path);
        let index_tmp = FlatIndex::staging_path(index_path);
        let map_tmp = PositionMap::staging_path(&map_path);

        let staged = built
        .index
        .write_file(&index_tmp)
        .and_then(|_| built.positions.write_file(&map_tmp));
        if let Err(e) = staged {
            warn!("Could not stage index files; keeping the previous build");
            let _ = fs::remove_file(&index_tmp);
            let _ = fs::remove_file(&map_tmp);
            return Err(e);
        }

        fs::rename(&map_tmp, &map_path)?;
        fs::rename(&index_tmp, index_path)?;
        Ok(())
    }
}
