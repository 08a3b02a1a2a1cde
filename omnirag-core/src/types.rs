//! Fundamental types shared across the retrieval pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The knowledge source that answers a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Exact record lookup by entity name.
    Db,
    /// Similarity search over embeddings (optionally hybrid with full-text).
    #[default]
    Vector,
    /// Relationship traversal through a generated graph query.
    Graph,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [Strategy::Db, Strategy::Vector, Strategy::Graph];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Db => "db",
            Strategy::Vector => "vector",
            Strategy::Graph => "graph",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not one of the three strategy labels.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown strategy '{0}' (expected db, vector, or graph)")]
pub struct ParseStrategyError(pub String);

impl FromStr for Strategy {
    type Err = ParseStrategyError;

    /// Strict parse: only the three labels, ignoring case and surrounding whitespace.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "db" => Ok(Strategy::Db),
            "vector" => Ok(Strategy::Vector),
            "graph" => Ok(Strategy::Graph),
            _ => Err(ParseStrategyError(s.to_string())),
        }
    }
}

/// How a strategy decision was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionMethod {
    /// The fast textual rule matched a short lookup utterance.
    Rule,
    /// The LLM classifier was consulted (or its failure was absorbed).
    Llm,
}

impl fmt::Display for DecisionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionMethod::Rule => write!(f, "rule"),
            DecisionMethod::Llm => write!(f, "llm"),
        }
    }
}

/// The classifier's verdict for a single query. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyDecision {
    pub query: String,
    pub strategy: Strategy,
    /// For `Rule` decisions this is always a known entity; for `Llm`
    /// decisions it is the most frequently mentioned known entity, if any.
    pub matched_entity: Option<String>,
    pub decision_method: DecisionMethod,
}

/// Ranking mode for the vector source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Nearest neighbours by embedding distance.
    Vector,
    /// Ranked full-text match with field and substring degradation.
    #[serde(rename = "fulltext")]
    FullText,
    /// Vector and full-text legs fused by reciprocal rank.
    Rrf,
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchMode::Vector => write!(f, "vector"),
            SearchMode::FullText => write!(f, "fulltext"),
            SearchMode::Rrf => write!(f, "rrf"),
        }
    }
}
