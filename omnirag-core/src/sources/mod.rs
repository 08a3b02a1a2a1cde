//! Source adapters: the three ways context can be retrieved.
//!
//! Each adapter answers one [`Strategy`]. Adapters never panic and never hide
//! failure: a [`Retrieval`] carries either the documents found (possibly none)
//! or the error that stopped the adapter, so callers can tell "failed" from
//! "found nothing" even when they treat both as zero documents.

pub mod graph;
pub mod record;
pub mod vector;

use async_trait::async_trait;

use crate::documents::RetrievedDocument;
use crate::error::RagError;
use crate::types::{SearchMode, Strategy};

pub use graph::{GraphQuery, GraphService, HttpGraphService, QueryBindings, SparqlGenerator};
pub use record::RecordLookup;
pub use vector::VectorSearch;

/// Everything an adapter may need for one call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalRequest {
    pub user_text: String,
    /// Entity names to look up (record lookup only).
    pub entity_names: Vec<String>,
    pub max_docs: usize,
    /// Forced ranking mode for vector search; `None` picks automatically.
    pub mode: Option<SearchMode>,
}

impl RetrievalRequest {
    pub fn new(user_text: impl Into<String>, max_docs: usize) -> Self {
        Self {
            user_text: user_text.into(),
            entity_names: Vec::new(),
            max_docs,
            mode: None,
        }
    }

    pub fn with_entities(mut self, names: Vec<String>) -> Self {
        self.entity_names = names;
        self
    }

    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = Some(mode);
        self
    }
}

/// Outcome of one adapter call.
#[derive(Debug)]
pub struct Retrieval {
    /// Structured query text the adapter generated, if any.
    pub generated_query: Option<String>,
    /// Short human-readable description of where the context came from.
    pub source_label: Option<String>,
    pub outcome: Result<Vec<RetrievedDocument>, RagError>,
}

impl Retrieval {
    pub fn found(documents: Vec<RetrievedDocument>) -> Self {
        Self {
            generated_query: None,
            source_label: None,
            outcome: Ok(documents),
        }
    }

    pub fn failed(error: impl Into<RagError>) -> Self {
        Self {
            generated_query: None,
            source_label: None,
            outcome: Err(error.into()),
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.generated_query = Some(query.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.source_label = Some(label.into());
        self
    }

    /// Documents found; empty on failure.
    pub fn documents(&self) -> &[RetrievedDocument] {
        self.outcome.as_deref().unwrap_or(&[])
    }

    pub fn is_failure(&self) -> bool {
        self.outcome.is_err()
    }
}

/// A retrieval capability behind a uniform interface.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// The strategy this adapter serves.
    fn strategy(&self) -> Strategy;

    async fn retrieve(&self, request: &RetrievalRequest) -> Retrieval;
}

/// Split query text into search tokens: whitespace-separated, edge
/// punctuation trimmed, longer than one character.
pub fn search_tokens(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| w.chars().count() > 1)
        .map(str::to_string)
        .collect()
}
