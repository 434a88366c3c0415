pub mod builder;
pub mod config;
pub mod enrich;
pub mod error;
pub mod history;
pub mod index;
pub mod manager;
pub mod model;
pub mod parser;
pub mod positions;
pub mod provider;
pub mod retriever;
pub mod server;
pub mod storage;
pub mod synth;
pub mod vector;

use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::config::Settings;
use crate::index::FlatIndex;
use crate::model::{Query, QueryMode, DEFAULT_TOP_K};
use crate::positions::PositionResolver;
use crate::provider::{ChatCompletions, OpenAiEmbeddings};
use crate::retriever::Retriever;
use crate::storage::RecordStore;
use crate::synth::Synthesizer;

pub use crate::error::{Error, Result};

/// Answer returned in RAG mode when retrieval comes back empty.
pub const NO_RELEVANT_CONTENT: &str = "No relevant content found in Chrome history.";

/// Query entry point: dispatches on mode, composes retrieval and synthesis.
///
/// Holds the loaded index read-only for its whole lifetime; rebuilding the
/// index means building a new `Hindsight`.
pub struct Hindsight {
    retriever: Retriever,
    synthesizer: Synthesizer,
}

impl fmt::Debug for Hindsight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hindsight")
        .field("index_count", &self.retriever.index().len())
        .field("dimension", &self.retriever.index().dimension())
        .finish()
    }
}

impl Hindsight {
    pub fn new(retriever: Retriever, synthesizer: Synthesizer) -> Self {
        Self { retriever, synthesizer }
    }

    /// Wires up the OpenAI-backed pipeline from `settings`.
    /// Fails with `Configuration` without credentials and `IndexLoad` when the
    /// persisted index is missing or corrupt.
    pub fn open(settings: &Settings) -> Result<Self> {
        let provider = settings.provider_config()?;

        info!("Opening record store {}", settings.db_path.display());
        let store = Arc::new(RecordStore::open(&settings.db_path)?);

        info!("Loading vector index from {}", settings.index_path.display());
        let index = FlatIndex::load(&settings.index_path)?;
        let resolver = PositionResolver::for_index(&settings.index_path, index.len())?;
        info!("Loaded {} vectors (dim {})", index.len(), index.dimension());

        let embedder = Arc::new(OpenAiEmbeddings::new(&provider)?);
        let generator = Arc::new(ChatCompletions::new(&provider)?);

        Ok(Self::new(
            Retriever::new(embedder, Arc::new(index), resolver, store),
            Synthesizer::new(generator, settings.max_output_tokens),
        ))
    }

    pub async fn query(&self, query: &Query) -> Result<String> {
        match query.mode {
            QueryMode::Rag => {
                if query.k == 0 {
                    return Err(Error::InvalidTopK(query.k));
                }
                let hits = self.retriever.retrieve(&query.text, query.k).await?;
                info!("Retrieved {} records (k={})", hits.len(), query.k);
                if hits.is_empty() {
                    return Ok(NO_RELEVANT_CONTENT.to_string());
                }
                let records: Vec<_> = hits.into_iter().map(|h| h.record).collect();
                self.synthesizer.generate_grounded(&query.text, &records).await
            }
            QueryMode::Direct => self.synthesizer.generate_direct(&query.text).await,
        }
    }

    /// Boundary form of [`query`](Hindsight::query): the mode string is
    /// validated here, before any provider is contacted.
    pub async fn submit_query(&self, text: &str, mode: &str, k: Option<usize>) -> Result<String> {
        let mode: QueryMode = mode.parse()?;
        let query = Query { text: text.to_string(), mode, k: k.unwrap_or(DEFAULT_TOP_K) };
        self.query(&query).await
    }
}
