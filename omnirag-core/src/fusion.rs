//! Result fusion: the single retrieval entry point.
//!
//! [`ResultFusionEngine::get_rag_data`] classifies the query (unless the
//! caller overrides the strategy), dispatches to one adapter, falls back to
//! vector search when a `db` or `graph` call returns nothing, and seals the
//! collected documents into a [`FusionResult`]. Nothing in here returns an
//! error: adapter failures are logged, recorded on the result, and counted as
//! zero documents.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::documents::{ContextRender, DocumentFilter, RetrievedDocument};
use crate::entities::EntityIndex;
use crate::error::RagError;
use crate::sources::{Retrieval, RetrievalRequest, SourceAdapter};
use crate::strategy::StrategyClassifier;
use crate::types::{Strategy, StrategyDecision};

/// An adapter call that failed and was treated as returning nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdapterFailure {
    pub strategy: Strategy,
    pub error: String,
}

/// The sealed outcome of one retrieval call.
#[derive(Debug, Clone, Serialize)]
pub struct FusionResult {
    pub request_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub user_text: String,
    pub max_doc_count: usize,
    /// Strategies in the order they ran; a fallback appends `vector`.
    pub strategies_tried: Vec<Strategy>,
    pub documents: Vec<RetrievedDocument>,
    pub doc_count: usize,
    pub generated_query: Option<String>,
    /// The entity the context is about: the classifier's matched entity, or
    /// the most mentioned known entity when the strategy was overridden.
    pub context_label: Option<String>,
    /// Which adapter supplied the documents, e.g. `vector search (rrf)`.
    pub source_label: Option<String>,
    /// Absent when the caller overrode the strategy.
    pub decision: Option<StrategyDecision>,
    pub strategy_overridden: bool,
    pub elapsed_ms: u64,
    pub adapter_failures: Vec<AdapterFailure>,
}

impl FusionResult {
    /// Strategy names joined with commas, e.g. `db,vector`.
    pub fn strategy_label(&self) -> String {
        self.strategies_tried
            .iter()
            .map(Strategy::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn has_docs(&self) -> bool {
        self.doc_count > 0
    }

    pub fn has_db_docs(&self) -> bool {
        self.has_docs() && self.strategies_tried.contains(&Strategy::Db)
    }

    pub fn has_graph_docs(&self) -> bool {
        self.has_docs() && self.strategies_tried.contains(&Strategy::Graph)
    }

    /// Render the documents as a system-prompt context block.
    ///
    /// Empty when there are no documents, so the caller can fall back to a
    /// context-free prompt.
    pub fn as_system_prompt_text(&self) -> String {
        if self.documents.is_empty() {
            return String::new();
        }
        let mut lines = vec![
            format!(
                "Use the following {} Documents to answer the user query.",
                self.documents.len()
            ),
            "Each Document lists one attribute per line as 'name: value'.".to_string(),
            "Each Document starts and ends with '###' to make it easy to parse.".to_string(),
        ];
        for doc in &self.documents {
            lines.push("\nDocument ###".to_string());
            lines.push(doc.render_context());
            lines.push(String::new());
            lines.push("###".to_string());
        }
        lines.join("\n")
    }
}

/// Accumulates one call's result. Documents and strategies are append-only;
/// [`finish`](Self::finish) fixes `doc_count`.
#[derive(Debug)]
pub struct FusionResultBuilder {
    user_text: String,
    max_doc_count: usize,
    strategies_tried: Vec<Strategy>,
    documents: Vec<RetrievedDocument>,
    generated_query: Option<String>,
    context_label: Option<String>,
    source_label: Option<String>,
    decision: Option<StrategyDecision>,
    strategy_overridden: bool,
    adapter_failures: Vec<AdapterFailure>,
    started: Instant,
}

impl FusionResultBuilder {
    pub fn new(user_text: impl Into<String>, max_doc_count: usize) -> Self {
        Self {
            user_text: user_text.into(),
            max_doc_count,
            strategies_tried: Vec::new(),
            documents: Vec::new(),
            generated_query: None,
            context_label: None,
            source_label: None,
            decision: None,
            strategy_overridden: false,
            adapter_failures: Vec::new(),
            started: Instant::now(),
        }
    }

    pub fn add_strategy(&mut self, strategy: Strategy) {
        self.strategies_tried.push(strategy);
    }

    pub fn set_decision(&mut self, decision: StrategyDecision) {
        self.decision = Some(decision);
    }

    pub fn set_context(&mut self, entity: Option<String>) {
        self.context_label = entity;
    }

    pub fn mark_overridden(&mut self) {
        self.strategy_overridden = true;
    }

    pub fn doc_count(&self) -> usize {
        self.documents.len()
    }

    /// Append a sanitized copy of `doc`. Returns false once the result is full.
    pub fn add_document(&mut self, doc: &RetrievedDocument, filter: &DocumentFilter) -> bool {
        if self.documents.len() >= self.max_doc_count {
            return false;
        }
        self.documents.push(doc.sanitized(filter));
        true
    }

    /// Fold one adapter outcome in. Returns how many documents were added.
    pub fn absorb(
        &mut self,
        strategy: Strategy,
        retrieval: Retrieval,
        filter: &DocumentFilter,
    ) -> usize {
        if let Some(query) = retrieval.generated_query {
            self.generated_query = Some(query);
        }
        let documents = match retrieval.outcome {
            Ok(documents) => documents,
            Err(e) => {
                error!(strategy = %strategy, error = %e, "Adapter failed; counting as zero documents");
                self.adapter_failures.push(AdapterFailure {
                    strategy,
                    error: e.to_string(),
                });
                Vec::new()
            }
        };

        let added = documents
            .iter()
            .take_while(|doc| self.add_document(doc, filter))
            .count();
        if added < documents.len() {
            info!(dropped = documents.len() - added, max = self.max_doc_count, "Result full");
        }
        if added > 0 || self.source_label.is_none() {
            self.source_label = retrieval.source_label.or(self.source_label.take());
        }
        added
    }

    pub fn finish(self) -> FusionResult {
        FusionResult {
            request_id: Uuid::new_v4(),
            created_at: Utc::now(),
            doc_count: self.documents.len(),
            user_text: self.user_text,
            max_doc_count: self.max_doc_count,
            strategies_tried: self.strategies_tried,
            documents: self.documents,
            generated_query: self.generated_query,
            context_label: self.context_label,
            source_label: self.source_label,
            decision: self.decision,
            strategy_overridden: self.strategy_overridden,
            elapsed_ms: self.started.elapsed().as_millis() as u64,
            adapter_failures: self.adapter_failures,
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct ResultFusionEngine {
    classifier: StrategyClassifier,
    record_lookup: Arc<dyn SourceAdapter>,
    vector_search: Arc<dyn SourceAdapter>,
    graph_query: Arc<dyn SourceAdapter>,
    filter: DocumentFilter,
    adapter_timeout: Option<Duration>,
}

impl ResultFusionEngine {
    pub fn new(
        classifier: StrategyClassifier,
        record_lookup: Arc<dyn SourceAdapter>,
        vector_search: Arc<dyn SourceAdapter>,
        graph_query: Arc<dyn SourceAdapter>,
    ) -> Self {
        Self {
            classifier,
            record_lookup,
            vector_search,
            graph_query,
            filter: DocumentFilter::default(),
            adapter_timeout: None,
        }
    }

    pub fn with_filter(mut self, filter: DocumentFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Bound each adapter call; an elapsed call counts as a failure.
    pub fn with_adapter_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.adapter_timeout = timeout;
        self
    }

    pub fn classifier(&self) -> &StrategyClassifier {
        &self.classifier
    }

    pub fn entities(&self) -> &Arc<EntityIndex> {
        self.classifier.entities()
    }

    /// Retrieve context for `user_text`, at most `max_doc_count` documents.
    ///
    /// `strategy_override` must be `db`, `vector` or `graph` (any case) to
    /// take effect; it bypasses classification and disables the vector
    /// fallback. Anything else is ignored with a warning.
    pub async fn get_rag_data(
        &self,
        user_text: &str,
        max_doc_count: usize,
        strategy_override: Option<&str>,
    ) -> FusionResult {
        let mut builder = FusionResultBuilder::new(user_text, max_doc_count);

        let forced = strategy_override.and_then(|raw| {
            raw.parse::<Strategy>()
                .inspect_err(|e| warn!(error = %e, "Ignoring strategy override"))
                .ok()
        });

        let (strategy, entity) = match forced {
            Some(strategy) => {
                builder.mark_overridden();
                (strategy, self.entities().most_frequent_mention(user_text))
            }
            None => {
                let decision = self.classifier.determine(user_text).await;
                let picked = (decision.strategy, decision.matched_entity.clone());
                builder.set_decision(decision);
                picked
            }
        };

        builder.set_context(entity.clone());
        let request = RetrievalRequest::new(user_text, max_doc_count)
            .with_entities(entity.into_iter().collect());

        builder.add_strategy(strategy);
        let found = self.dispatch(strategy, &request, &mut builder).await;

        if found == 0 && strategy != Strategy::Vector {
            if forced.is_some() {
                info!(strategy = %strategy, "No documents; override in effect, not falling back");
            } else {
                info!(strategy = %strategy, "No documents; falling back to vector search");
                builder.add_strategy(Strategy::Vector);
                self.dispatch(Strategy::Vector, &request, &mut builder).await;
            }
        }

        let result = builder.finish();
        info!(
            request_id = %result.request_id,
            strategies = %result.strategy_label(),
            doc_count = result.doc_count,
            failures = result.adapter_failures.len(),
            elapsed_ms = result.elapsed_ms,
            "RAG data ready"
        );
        result
    }

    async fn dispatch(
        &self,
        strategy: Strategy,
        request: &RetrievalRequest,
        builder: &mut FusionResultBuilder,
    ) -> usize {
        let adapter = match strategy {
            Strategy::Db => &self.record_lookup,
            Strategy::Vector => &self.vector_search,
            Strategy::Graph => &self.graph_query,
        };
        let retrieval = match self.adapter_timeout {
            Some(limit) => match tokio::time::timeout(limit, adapter.retrieve(request)).await {
                Ok(retrieval) => retrieval,
                Err(_) => Retrieval::failed(RagError::Timeout {
                    operation: format!("{} retrieval", strategy),
                    timeout_secs: limit.as_secs(),
                }),
            },
            None => adapter.retrieve(request).await,
        };
        builder.absorb(strategy, retrieval, &self.filter)
    }
}
