//! Retrieval strategy classification.
//!
//! Two phases, short-circuiting:
//!
//! 1. **Rule**: a short utterance that starts with a lookup verb and names a
//!    known entity is a record lookup. No LLM call is made.
//! 2. **LLM**: otherwise the model picks `db`, `vector` or `graph`. Its raw
//!    answer is normalised by [`normalize_strategy`]. Any failure leaves the
//!    strategy at `vector`; classification never returns an error.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::brain::{CompletionRequest, LlmProvider};
use crate::config::RetrievalConfig;
use crate::entities::EntityIndex;
use crate::prompts::STRATEGY_SYSTEM_PROMPT;
use crate::types::{DecisionMethod, Strategy, StrategyDecision};

/// JSON keys a model may use to wrap its answer.
const ANSWER_KEYS: [&str; 4] = ["source", "strategy", "data_source", "result"];

pub struct StrategyClassifier {
    llm: Arc<dyn LlmProvider>,
    entities: Arc<EntityIndex>,
    lookup_verbs: Vec<String>,
    rule_max_tokens: usize,
    temperature: f32,
}

impl StrategyClassifier {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        entities: Arc<EntityIndex>,
        retrieval: &RetrievalConfig,
    ) -> Self {
        Self {
            llm,
            entities,
            lookup_verbs: retrieval
                .lookup_verbs
                .iter()
                .map(|v| v.to_lowercase())
                .collect(),
            rule_max_tokens: retrieval.rule_max_tokens,
            temperature: 0.0,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn entities(&self) -> &Arc<EntityIndex> {
        &self.entities
    }

    /// The rule phase alone.
    ///
    /// Matches when the query has fewer than `rule_max_tokens` whitespace
    /// tokens, the first is a lookup verb, and a later token is a known
    /// entity. The first such token wins.
    pub fn classify_by_rule(&self, query: &str) -> Option<StrategyDecision> {
        let tokens: Vec<&str> = query.split_whitespace().collect();
        let (first, rest) = tokens.split_first()?;
        if tokens.len() >= self.rule_max_tokens {
            return None;
        }
        let verb = first.to_lowercase();
        if !self.lookup_verbs.contains(&verb) {
            return None;
        }
        let entity = rest.iter().find(|t| self.entities.is_known(t))?;
        Some(StrategyDecision {
            query: query.to_string(),
            strategy: Strategy::Db,
            matched_entity: Some(entity.to_lowercase()),
            decision_method: DecisionMethod::Rule,
        })
    }

    /// Decide the strategy for `query`. Never fails.
    pub async fn determine(&self, query: &str) -> StrategyDecision {
        if let Some(decision) = self.classify_by_rule(query) {
            info!(
                strategy = %decision.strategy,
                entity = ?decision.matched_entity,
                "Strategy decided by rule"
            );
            return decision;
        }

        let mut decision = StrategyDecision {
            query: query.to_string(),
            strategy: Strategy::Vector,
            matched_entity: self.entities.most_frequent_mention(query),
            decision_method: DecisionMethod::Llm,
        };

        let request = CompletionRequest::new(STRATEGY_SYSTEM_PROMPT, query)
            .with_temperature(self.temperature)
            .with_max_tokens(64);

        match self.llm.complete(request).await {
            Ok(response) => {
                decision.strategy = normalize_strategy(&response.text);
                debug!(raw = %response.text, model = %response.model, "Classifier raw answer");
                info!(
                    strategy = %decision.strategy,
                    entity = ?decision.matched_entity,
                    "Strategy decided by LLM"
                );
            }
            Err(e) => {
                warn!(error = %e, "Strategy classification failed; defaulting to vector");
            }
        }
        decision
    }
}

/// Map raw model output onto a strategy; unrecognised output becomes `vector`.
pub fn normalize_strategy(raw: &str) -> Strategy {
    let mut text = raw.trim().to_lowercase();

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) {
        let extracted = match &value {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Object(map) => ANSWER_KEYS
                .iter()
                .find_map(|k| map.get(*k).and_then(|v| v.as_str()).map(str::to_string)),
            _ => None,
        };
        if let Some(s) = extracted {
            text = s.trim().to_lowercase();
        }
    }

    if text == "database" {
        text = "db".to_string();
    }
    if let Ok(strategy) = text.parse::<Strategy>() {
        return strategy;
    }

    if text.contains("graph") {
        Strategy::Graph
    } else if text.contains("vector") || text.contains("embedding") {
        Strategy::Vector
    } else if text.contains("db")
        || text.contains("database")
        || text.contains("sql")
        || text
            .split(|c: char| !c.is_alphanumeric())
            .any(|w| crate::config::DEFAULT_LOOKUP_VERBS.contains(&w))
    {
        Strategy::Db
    } else {
        Strategy::Vector
    }
}
