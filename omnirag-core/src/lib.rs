//! # OmniRAG Core
//!
//! Retrieval orchestration for RAG applications.
//! Decides per query whether context should come from exact record lookup,
//! vector similarity search, or a knowledge graph, queries that source with
//! fallback and degradation, and returns a bounded, sanitised document set.

pub mod brain;
pub mod config;
pub mod documents;
pub mod embeddings;
pub mod entities;
pub mod error;
pub mod fusion;
pub mod ontology;
pub mod prompts;
pub mod providers;
pub mod rrf;
pub mod sources;
pub mod store;
pub mod strategy;
pub mod types;

// Re-export commonly used types at the crate root.
pub use brain::{CompletionRequest, CompletionResponse, LlmProvider, MockLlmProvider, TokenUsage};
pub use config::{RagConfig, load_config};
pub use documents::{Attributes, ContextRender, DocumentFilter, RetrievedDocument};
pub use embeddings::{Embedder, LocalEmbedder, create_embedder};
pub use entities::EntityIndex;
pub use error::{GraphError, LlmError, RagError, Result, StoreError};
pub use fusion::{FusionResult, FusionResultBuilder, ResultFusionEngine};
pub use ontology::Ontology;
pub use providers::create_provider;
pub use sources::{
    GraphQuery, GraphService, HttpGraphService, RecordLookup, Retrieval, RetrievalRequest,
    SourceAdapter, SparqlGenerator, VectorSearch,
};
pub use store::{InMemoryRecordStore, RecordStore, ScoredRecord};
pub use strategy::{StrategyClassifier, normalize_strategy};
pub use types::{DecisionMethod, SearchMode, Strategy, StrategyDecision};
