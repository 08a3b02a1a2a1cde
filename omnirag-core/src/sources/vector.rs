//! Similarity search with full-text and hybrid ranking modes.
//!
//! Degradation ladders, each step logged and never surfaced on its own:
//!
//! - full-text: primary field -> alternate field -> substring containment
//! - hybrid: fused ranking -> vector-only ranking
//!
//! The hybrid path issues its vector and full-text legs concurrently.

use async_trait::async_trait;
use futures::future::join;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{Retrieval, RetrievalRequest, SourceAdapter, search_tokens};
use crate::config::{RetrievalConfig, StoreConfig};
use crate::documents::{DocumentFilter, RetrievedDocument, VectorDoc};
use crate::embeddings::Embedder;
use crate::error::{RagError, StoreError};
use crate::rrf::reciprocal_rank_fusion;
use crate::store::{RecordStore, ScoredRecord};
use crate::types::{SearchMode, Strategy};

/// Field names and fusion settings for vector search.
#[derive(Debug, Clone)]
pub struct VectorSearchSettings {
    pub embedding_field: String,
    /// Ranked full-text fields in the order they are tried.
    pub fulltext_fields: Vec<String>,
    pub contains_fields: Vec<String>,
    pub rrf_k: u32,
    pub store_side_rrf: bool,
}

impl VectorSearchSettings {
    pub fn from_config(store: &StoreConfig, retrieval: &RetrievalConfig) -> Self {
        Self {
            embedding_field: store.embedding_field.clone(),
            fulltext_fields: store.fulltext_fields.clone(),
            contains_fields: store.contains_fields.clone(),
            rrf_k: retrieval.rrf_k,
            store_side_rrf: retrieval.store_side_rrf,
        }
    }
}

pub struct VectorSearch {
    store: Arc<dyn RecordStore>,
    embedder: Arc<dyn Embedder>,
    settings: VectorSearchSettings,
    filter: DocumentFilter,
}

impl VectorSearch {
    pub fn new(
        store: Arc<dyn RecordStore>,
        embedder: Arc<dyn Embedder>,
        settings: VectorSearchSettings,
        filter: DocumentFilter,
    ) -> Self {
        Self {
            store,
            embedder,
            settings,
            filter,
        }
    }

    /// Run one search in an explicit mode.
    ///
    /// `rrf` without a usable embedding degrades to full-text; `vector`
    /// without one is an error.
    pub async fn search(
        &self,
        query_text: &str,
        top_k: usize,
        mode: SearchMode,
    ) -> Result<(SearchMode, Vec<RetrievedDocument>), RagError> {
        let tokens = search_tokens(query_text);
        match mode {
            SearchMode::Vector => {
                let vector = self.embedder.embed(query_text).await?;
                let records = self.vector_leg(&vector, top_k).await?;
                Ok((mode, self.to_documents(records, mode)))
            }
            SearchMode::FullText => {
                let records = self.fulltext_ladder(query_text, &tokens, top_k).await?;
                Ok((mode, self.to_documents(records, mode)))
            }
            SearchMode::Rrf => match self.embedder.embed(query_text).await {
                Ok(vector) => {
                    let records = self.hybrid(&vector, query_text, &tokens, top_k).await?;
                    Ok((mode, self.to_documents(records, mode)))
                }
                Err(e) => {
                    warn!(error = %e, "Embedding failed; hybrid search degrading to full-text");
                    let records = self.fulltext_ladder(query_text, &tokens, top_k).await?;
                    Ok((SearchMode::FullText, self.to_documents(records, SearchMode::FullText)))
                }
            },
        }
    }

    /// Pick the mode from what is available: hybrid when both an embedding
    /// and search tokens exist, full-text when embedding fails, vector when
    /// the text yields no tokens.
    pub async fn search_auto(
        &self,
        query_text: &str,
        top_k: usize,
    ) -> Result<(SearchMode, Vec<RetrievedDocument>), RagError> {
        let tokens = search_tokens(query_text);
        match self.embedder.embed(query_text).await {
            Ok(vector) if !tokens.is_empty() => {
                let records = self.hybrid(&vector, query_text, &tokens, top_k).await?;
                Ok((SearchMode::Rrf, self.to_documents(records, SearchMode::Rrf)))
            }
            Ok(vector) => {
                let records = self.vector_leg(&vector, top_k).await?;
                Ok((SearchMode::Vector, self.to_documents(records, SearchMode::Vector)))
            }
            Err(e) => {
                warn!(error = %e, "Embedding failed; using full-text search");
                let records = self.fulltext_ladder(query_text, &tokens, top_k).await?;
                Ok((SearchMode::FullText, self.to_documents(records, SearchMode::FullText)))
            }
        }
    }

    async fn vector_leg(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredRecord>, StoreError> {
        self.store
            .vector_knn(vector, &self.settings.embedding_field, k)
            .await
    }

    /// Ranked full-text over each configured field in turn, then substring
    /// containment. Errors only when every tier fails.
    async fn fulltext_ladder(
        &self,
        query_text: &str,
        tokens: &[String],
        k: usize,
    ) -> Result<Vec<ScoredRecord>, RagError> {
        if tokens.is_empty() {
            debug!("No full-text tokens in query");
            return Ok(Vec::new());
        }
        for field in &self.settings.fulltext_fields {
            match self.store.fulltext_rank(field, tokens, k).await {
                Ok(records) => {
                    debug!(field = %field, found = records.len(), "Full-text ranking done");
                    return Ok(records);
                }
                Err(e) => warn!(field = %field, error = %e, "Full-text ranking failed; trying next tier"),
            }
        }
        let records = self
            .store
            .contains_search(&self.settings.contains_fields, query_text, k)
            .await
            .inspect_err(|e| warn!(error = %e, "Substring fallback failed"))?;
        info!(found = records.len(), "Full-text served by substring fallback");
        Ok(records)
    }

    /// Fused vector and full-text ranking.
    async fn hybrid(
        &self,
        vector: &[f32],
        query_text: &str,
        tokens: &[String],
        k: usize,
    ) -> Result<Vec<ScoredRecord>, RagError> {
        if self.settings.store_side_rrf {
            let text_field = self
                .settings
                .fulltext_fields
                .first()
                .map(String::as_str)
                .unwrap_or("description");
            return match self
                .store
                .hybrid_rank(vector, &self.settings.embedding_field, text_field, tokens, k)
                .await
            {
                Ok(records) => Ok(records),
                Err(e) => {
                    warn!(error = %e, "Store-side hybrid ranking failed; using vector-only");
                    Ok(self.vector_leg(vector, k).await?)
                }
            };
        }

        let (vector_result, text_result) = join(
            self.vector_leg(vector, k),
            self.fulltext_ladder(query_text, tokens, k),
        )
        .await;

        match (vector_result, text_result) {
            (Ok(by_vector), Ok(by_text)) => {
                debug!(vector = by_vector.len(), text = by_text.len(), "Fusing hybrid legs");
                Ok(reciprocal_rank_fusion(
                    &[by_vector, by_text],
                    self.settings.rrf_k,
                    k,
                ))
            }
            (Ok(by_vector), Err(e)) => {
                warn!(error = %e, "Full-text leg failed; using vector-only ranking");
                Ok(by_vector)
            }
            (Err(e), Ok(by_text)) => {
                warn!(error = %e, "Vector leg failed; using full-text ranking");
                Ok(by_text)
            }
            (Err(vector_err), Err(text_err)) => {
                warn!(error = %text_err, "Full-text leg failed as well");
                Err(vector_err.into())
            }
        }
    }

    fn to_documents(&self, records: Vec<ScoredRecord>, mode: SearchMode) -> Vec<RetrievedDocument> {
        records
            .into_iter()
            .enumerate()
            .map(|(idx, record)| {
                RetrievedDocument::Vector(VectorDoc {
                    attributes: self.filter.sanitize(&record.attributes),
                    rank: idx + 1,
                    score: record.score,
                    mode,
                })
            })
            .collect()
    }
}

#[async_trait]
impl SourceAdapter for VectorSearch {
    fn strategy(&self) -> Strategy {
        Strategy::Vector
    }

    async fn retrieve(&self, request: &RetrievalRequest) -> Retrieval {
        let result = match request.mode {
            Some(mode) => self.search(&request.user_text, request.max_docs, mode).await,
            None => self.search_auto(&request.user_text, request.max_docs).await,
        };
        match result {
            Ok((mode, documents)) => {
                info!(mode = %mode, found = documents.len(), "Vector search done");
                Retrieval::found(documents).with_label(format!("vector search ({})", mode))
            }
            Err(e) => {
                warn!(error = %e, "Vector search failed");
                Retrieval::failed(e).with_label("vector search")
            }
        }
    }
}
