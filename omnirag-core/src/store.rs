//! The record store capability.
//!
//! [`RecordStore`] is the only view the core has of the document database:
//! point reads, exact name lookup, and the three ranked searches.
//! [`InMemoryRecordStore`] implements it over a JSON snapshot and is what
//! tests and the CLI run against.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::config::StoreConfig;
use crate::documents::Attributes;
use crate::embeddings::{LocalEmbedder, cosine_similarity};
use crate::error::StoreError;
use crate::rrf::{DEFAULT_RRF_K, reciprocal_rank_fusion};

/// A record plus its relevance score (higher is better).
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub attributes: Attributes,
    pub score: f64,
}

/// Identity of a record for deduplication: `id`, then `name`, then its JSON text.
pub fn record_key(attrs: &Attributes) -> String {
    for field in ["id", "name"] {
        if let Some(value) = attrs.get(field) {
            return match value {
                Value::String(s) => format!("{}:{}", field, s),
                other => format!("{}:{}", field, other),
            };
        }
    }
    Value::Object(attrs.clone()).to_string()
}

/// Abstract query capability over the document database.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Read one configuration record by id and partition key.
    async fn point_read(
        &self,
        id: &str,
        partition_key: &str,
    ) -> Result<Option<Attributes>, StoreError>;

    /// Records whose name exactly equals one of `names`, in store order.
    async fn lookup_by_name(&self, names: &[String]) -> Result<Vec<Attributes>, StoreError>;

    /// The `k` nearest records to `vector` over `field`, in ascending distance order.
    async fn vector_knn(
        &self,
        vector: &[f32],
        field: &str,
        k: usize,
    ) -> Result<Vec<ScoredRecord>, StoreError>;

    /// Ranked full-text match of `tokens` against `field`.
    ///
    /// Fails with [`StoreError::UnsupportedField`] when `field` has no full-text index.
    async fn fulltext_rank(
        &self,
        field: &str,
        tokens: &[String],
        k: usize,
    ) -> Result<Vec<ScoredRecord>, StoreError>;

    /// Case-insensitive substring match of `text` against any of `fields`.
    async fn contains_search(
        &self,
        fields: &[String],
        text: &str,
        k: usize,
    ) -> Result<Vec<ScoredRecord>, StoreError>;

    /// Store-side combined ranking of a vector leg and a full-text leg.
    async fn hybrid_rank(
        &self,
        vector: &[f32],
        vector_field: &str,
        text_field: &str,
        tokens: &[String],
        k: usize,
    ) -> Result<Vec<ScoredRecord>, StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// On-disk snapshot: either a bare array of records or this object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Snapshot {
    Documents(Vec<Attributes>),
    Full {
        #[serde(default)]
        documents: Vec<Attributes>,
        #[serde(default)]
        config: Vec<Attributes>,
    },
}

/// Record store held entirely in memory.
pub struct InMemoryRecordStore {
    documents: Vec<Attributes>,
    config_records: Vec<Attributes>,
    name_field: String,
    fulltext_fields: HashSet<String>,
}

impl InMemoryRecordStore {
    /// Create a store whose ranked full-text support covers `config.fulltext_fields`.
    pub fn new(documents: Vec<Attributes>, config: &StoreConfig) -> Self {
        Self {
            documents,
            config_records: Vec::new(),
            name_field: config.name_field.clone(),
            fulltext_fields: config.fulltext_fields.iter().cloned().collect(),
        }
    }

    /// Add a configuration record readable through `point_read`.
    pub fn with_config_record(mut self, record: Attributes) -> Self {
        self.config_records.push(record);
        self
    }

    /// Replace the set of fields that support ranked full-text search.
    pub fn with_fulltext_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fulltext_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Compute embeddings for records that lack `field`, from their descriptive text.
    pub fn with_local_embeddings(mut self, embedder: &LocalEmbedder, field: &str) -> Self {
        for doc in &mut self.documents {
            if doc.contains_key(field) {
                continue;
            }
            let text = ["name", "description", "summary", "kwds"]
                .iter()
                .filter_map(|f| doc.get(*f))
                .map(value_text)
                .collect::<Vec<_>>()
                .join(" ");
            let vector: Vec<Value> = embedder
                .embed_text(&text)
                .into_iter()
                .map(|x| Value::from(x as f64))
                .collect();
            doc.insert(field.to_string(), Value::Array(vector));
        }
        self
    }

    /// Load a JSON snapshot from disk.
    pub async fn load_json_file(path: &Path, config: &StoreConfig) -> Result<Self, StoreError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StoreError::Unavailable {
                message: format!("cannot read {}: {}", path.display(), e),
            })?;
        Self::from_json_str(&text, config)
    }

    pub fn from_json_str(text: &str, config: &StoreConfig) -> Result<Self, StoreError> {
        let snapshot: Snapshot =
            serde_json::from_str(text).map_err(|e| StoreError::InvalidDocument {
                message: format!("invalid snapshot: {}", e),
            })?;
        let (documents, config_records) = match snapshot {
            Snapshot::Full { documents, config } => (documents, config),
            Snapshot::Documents(documents) => (documents, Vec::new()),
        };
        let mut store = Self::new(documents, config);
        store.config_records = config_records;
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn ranked(mut scored: Vec<(usize, f64)>, docs: &[Attributes], k: usize) -> Vec<ScoredRecord> {
        // Stable: equal scores stay in store order.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(k)
            .map(|(idx, score)| ScoredRecord {
                attributes: docs[idx].clone(),
                score,
            })
            .collect()
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(value_text).collect::<Vec<_>>().join(" "),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn as_vector(value: &Value) -> Option<Vec<f32>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

fn term_frequencies(text: &str) -> HashMap<String, usize> {
    let mut tf = HashMap::new();
    for word in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        *tf.entry(word.to_string()).or_insert(0) += 1;
    }
    tf
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn point_read(
        &self,
        id: &str,
        partition_key: &str,
    ) -> Result<Option<Attributes>, StoreError> {
        Ok(self
            .config_records
            .iter()
            .find(|r| {
                r.get("id").and_then(Value::as_str) == Some(id)
                    && r.get("pk")
                        .and_then(Value::as_str)
                        .is_none_or(|pk| pk == partition_key)
            })
            .cloned())
    }

    async fn lookup_by_name(&self, names: &[String]) -> Result<Vec<Attributes>, StoreError> {
        Ok(self
            .documents
            .iter()
            .filter(|doc| {
                doc.get(&self.name_field)
                    .and_then(Value::as_str)
                    .is_some_and(|n| names.iter().any(|wanted| wanted == n))
            })
            .cloned()
            .collect())
    }

    async fn vector_knn(
        &self,
        vector: &[f32],
        field: &str,
        k: usize,
    ) -> Result<Vec<ScoredRecord>, StoreError> {
        let scored = self
            .documents
            .iter()
            .enumerate()
            .filter_map(|(idx, doc)| {
                let candidate = as_vector(doc.get(field)?)?;
                (candidate.len() == vector.len())
                    .then(|| (idx, cosine_similarity(vector, &candidate) as f64))
            })
            .collect();
        Ok(Self::ranked(scored, &self.documents, k))
    }

    async fn fulltext_rank(
        &self,
        field: &str,
        tokens: &[String],
        k: usize,
    ) -> Result<Vec<ScoredRecord>, StoreError> {
        if !self.fulltext_fields.contains(field) {
            return Err(StoreError::UnsupportedField {
                field: field.to_string(),
            });
        }
        let wanted: Vec<String> = tokens.iter().map(|t| t.to_lowercase()).collect();
        let scored = self
            .documents
            .iter()
            .enumerate()
            .filter_map(|(idx, doc)| {
                let tf = term_frequencies(&value_text(doc.get(field)?));
                let score: usize = wanted.iter().filter_map(|t| tf.get(t)).sum();
                (score > 0).then_some((idx, score as f64))
            })
            .collect();
        Ok(Self::ranked(scored, &self.documents, k))
    }

    async fn contains_search(
        &self,
        fields: &[String],
        text: &str,
        k: usize,
    ) -> Result<Vec<ScoredRecord>, StoreError> {
        let needle = text.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .documents
            .iter()
            .filter(|doc| {
                fields.iter().any(|f| {
                    doc.get(f)
                        .is_some_and(|v| value_text(v).to_lowercase().contains(&needle))
                })
            })
            .take(k)
            .map(|doc| ScoredRecord {
                attributes: doc.clone(),
                score: 1.0,
            })
            .collect())
    }

    async fn hybrid_rank(
        &self,
        vector: &[f32],
        vector_field: &str,
        text_field: &str,
        tokens: &[String],
        k: usize,
    ) -> Result<Vec<ScoredRecord>, StoreError> {
        let vector_leg = self.vector_knn(vector, vector_field, k).await?;
        let text_leg = self.fulltext_rank(text_field, tokens, k).await?;
        Ok(reciprocal_rank_fusion(
            &[vector_leg, text_leg],
            DEFAULT_RRF_K,
            k,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Attributes {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn sample_store() -> InMemoryRecordStore {
        let docs = vec![
            doc(json!({ "id": "1", "name": "flask", "description": "A lightweight web framework", "summary": "web" })),
            doc(json!({ "id": "2", "name": "numpy", "description": "Fundamental array computing", "summary": "arrays arrays" })),
            doc(json!({ "id": "3", "name": "fastapi", "description": "Fast web framework for APIs", "summary": "web api" })),
        ];
        InMemoryRecordStore::new(docs, &StoreConfig::default())
            .with_local_embeddings(&LocalEmbedder::new(256), "embedding")
            .with_config_record(doc(json!({ "id": "entities", "pk": "entities", "libraries": { "flask": 1 } })))
    }

    #[test]
    fn test_record_key_priority() {
        assert_eq!(record_key(&doc(json!({ "id": "7", "name": "x" }))), "id:7");
        assert_eq!(record_key(&doc(json!({ "name": "x" }))), "name:x");
        assert_eq!(record_key(&doc(json!({ "a": 1 }))), r#"{"a":1}"#);
    }

    #[tokio::test]
    async fn test_point_read() {
        let store = sample_store();
        assert!(store.point_read("entities", "entities").await.unwrap().is_some());
        assert!(store.point_read("entities", "other").await.unwrap().is_none());
        assert!(store.point_read("missing", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lookup_by_name_exact() {
        let store = sample_store();
        let found = store
            .lookup_by_name(&["flask".into(), "django".into()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["name"], "flask");
        assert!(store.lookup_by_name(&["Flask".into()]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_vector_knn_orders_by_similarity() {
        let store = sample_store();
        let query = LocalEmbedder::new(256).embed_text("fast web framework apis");
        let results = store.vector_knn(&query, "embedding", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].attributes["name"], "fastapi");
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn test_vector_knn_skips_mismatched_dimensions() {
        let store = sample_store();
        let results = store.vector_knn(&[1.0, 0.0], "embedding", 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_fulltext_rank_and_unsupported_field() {
        let store = sample_store();
        let results = store
            .fulltext_rank("summary", &["arrays".into()], 5)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].score, 2.0);

        let err = store
            .fulltext_rank("name", &["flask".into()], 5)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedField { .. }));
    }

    #[tokio::test]
    async fn test_contains_search() {
        let store = sample_store();
        let fields = vec!["description".to_string(), "name".to_string()];
        let results = store.contains_search(&fields, "WEB FRAME", 5).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(store.contains_search(&fields, "  ", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_hybrid_rank_rewards_overlap() {
        let store = sample_store();
        let query = LocalEmbedder::new(256).embed_text("web framework");
        let results = store
            .hybrid_rank(&query, "embedding", "description", &["web".into()], 3)
            .await
            .unwrap();
        assert!(!results.is_empty());
        assert_ne!(results[0].attributes["name"], "numpy");
    }

    #[test]
    fn test_snapshot_formats() {
        let config = StoreConfig::default();
        let bare = InMemoryRecordStore::from_json_str(r#"[{"name":"a"},{"name":"b"}]"#, &config).unwrap();
        assert_eq!(bare.len(), 2);

        let full = InMemoryRecordStore::from_json_str(
            r#"{"documents":[{"name":"a"}],"config":[{"id":"entities","libraries":["a"]}]}"#,
            &config,
        )
        .unwrap();
        assert_eq!(full.len(), 1);
        assert_eq!(full.config_records.len(), 1);

        assert!(InMemoryRecordStore::from_json_str("42", &config).is_err());
    }

    #[tokio::test]
    async fn test_load_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.json");
        std::fs::write(&path, r#"[{"name":"flask"}]"#).unwrap();
        let store = InMemoryRecordStore::load_json_file(&path, &StoreConfig::default())
            .await
            .unwrap();
        assert!(!store.is_empty());

        let missing = InMemoryRecordStore::load_json_file(&dir.path().join("nope.json"), &StoreConfig::default()).await;
        assert!(matches!(missing, Err(StoreError::Unavailable { .. })));
    }
}
