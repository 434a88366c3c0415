use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Default number of history entries pulled into a RAG answer.
pub const DEFAULT_TOP_K: usize = 3;

/// A browsing-history entry as the pipeline sees it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Record {
    /// Row id assigned by the record store. Stable, never reused.
    pub id: i64,
    pub title: String,
    pub description: String,
}

impl Record {
    pub fn new(id: i64, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self { id, title: title.into(), description: description.into() }
    }

    /// Text submitted to the embedding provider for this record.
    pub fn embedding_text(&self) -> String {
        format!("{} {}", self.title, self.description)
    }
}

/// How a query is answered. Decided once at the service boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// Retrieve similar history entries, then synthesize from them.
    Rag,
    /// Hand the query straight to the generator.
    Direct,
}

impl FromStr for QueryMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rag" => Ok(QueryMode::Rag),
            "generate" | "direct" => Ok(QueryMode::Direct),
            _ => Err(Error::InvalidMode(s.to_string())),
        }
    }
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryMode::Rag => write!(f, "rag"),
            QueryMode::Direct => write!(f, "generate"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub text: String,
    pub mode: QueryMode,
    pub k: usize,
}

impl Query {
    pub fn rag(text: impl Into<String>, k: usize) -> Self {
        Self { text: text.into(), mode: QueryMode::Rag, k }
    }

    pub fn direct(text: impl Into<String>) -> Self {
        Self { text: text.into(), mode: QueryMode::Direct, k: DEFAULT_TOP_K }
    }
}

/// One element of a retrieval result: a record and its squared L2 distance to the query.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Hit {
    pub record: Record,
    pub distance: f32,
}
