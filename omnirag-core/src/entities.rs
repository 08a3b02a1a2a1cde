//! Known-entity index.
//!
//! Holds the lowercase names of every retrievable entity, loaded once from the
//! entity configuration record. The classifier uses it to recognise record
//! lookups and to guess which entity an open question is about.

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::EntitiesConfig;
use crate::documents::Attributes;
use crate::error::StoreError;
use crate::store::RecordStore;

/// In-memory set of known entity names.
///
/// `None` means not yet initialized. A failed load leaves it that way, so
/// membership checks fail open and the next `initialize` retries.
pub struct EntityIndex {
    config: EntitiesConfig,
    names: RwLock<Option<HashSet<String>>>,
}

impl EntityIndex {
    pub fn new(config: EntitiesConfig) -> Self {
        Self {
            config,
            names: RwLock::new(None),
        }
    }

    /// An already-initialized index, mainly for tests and offline use.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let index = Self::new(EntitiesConfig::default());
        let set = names
            .into_iter()
            .map(|n| n.as_ref().trim().to_lowercase())
            .filter(|n| !n.is_empty())
            .collect();
        index.replace(Some(set));
        index
    }

    /// Load names from the entity configuration record.
    ///
    /// A no-op once loaded unless `force` is set. A missing record yields an
    /// initialized but empty index. A store failure leaves the index as it was.
    pub async fn initialize(&self, store: &dyn RecordStore, force: bool) -> Result<(), StoreError> {
        if !force && self.is_initialized() {
            debug!("Entity index already initialized");
            return Ok(());
        }

        let record = store
            .point_read(&self.config.document_id, &self.config.document_id)
            .await
            .inspect_err(|e| warn!(error = %e, "Failed to load entity record"))?;

        let names = match record {
            Some(doc) => self.names_from_record(&doc),
            None => {
                warn!(id = %self.config.document_id, "Entity record not found");
                HashSet::new()
            }
        };
        info!(count = names.len(), force, "Entity index loaded");
        self.replace(Some(names));
        Ok(())
    }

    /// Extract lowercase names from the group attribute, which is either an
    /// object keyed by name or an array of names.
    fn names_from_record(&self, doc: &Attributes) -> HashSet<String> {
        let raw: Vec<String> = match doc.get(&self.config.group_attr) {
            Some(Value::Object(groups)) => groups.keys().cloned().collect(),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => {
                warn!(attr = %self.config.group_attr, "Entity record has no usable name group");
                Vec::new()
            }
        };
        raw.into_iter()
            .filter(|name| {
                !self
                    .config
                    .ignored_groups
                    .iter()
                    .any(|ignored| ignored.eq_ignore_ascii_case(name))
            })
            .map(|name| name.trim().to_lowercase())
            .filter(|name| !name.is_empty())
            .collect()
    }

    fn replace(&self, value: Option<HashSet<String>>) {
        *self.names.write().unwrap_or_else(|e| e.into_inner()) = value;
    }

    pub fn is_initialized(&self) -> bool {
        self.names
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Case-insensitive membership; empty input is never known.
    pub fn is_known(&self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }
        self.names
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|set| set.contains(&name.to_lowercase()))
    }

    /// Number of known names, or -1 before a successful load.
    pub fn count(&self) -> i64 {
        self.names
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map_or(-1, |set| set.len() as i64)
    }

    /// Known entities mentioned in `text`, with counts, in first-mention order.
    ///
    /// Text is lowercased, `,` and `.` become spaces, and single-character
    /// tokens are ignored.
    pub fn mentions(&self, text: &str) -> Vec<(String, usize)> {
        let guard = self.names.read().unwrap_or_else(|e| e.into_inner());
        let Some(set) = guard.as_ref() else {
            return Vec::new();
        };

        let normalized = text.to_lowercase().replace([',', '.'], " ");
        let mut order: Vec<String> = Vec::new();
        let mut counts: HashMap<String, usize> = HashMap::new();
        for word in normalized.split_whitespace() {
            if word.chars().count() > 1 && set.contains(word) {
                let count = counts.entry(word.to_string()).or_insert(0);
                if *count == 0 {
                    order.push(word.to_string());
                }
                *count += 1;
            }
        }
        order
            .into_iter()
            .map(|name| {
                let count = counts.get(&name).copied().unwrap_or(0);
                (name, count)
            })
            .collect()
    }

    /// The most mentioned known entity; ties go to the first mentioned.
    pub fn most_frequent_mention(&self, text: &str) -> Option<String> {
        let mut best: Option<(String, usize)> = None;
        for (name, count) in self.mentions(text) {
            if best.as_ref().is_none_or(|(_, top)| count > *top) {
                best = Some((name, count));
            }
        }
        best.map(|(name, _)| name)
    }

    /// Sorted snapshot of the known names.
    pub fn names(&self) -> Vec<String> {
        let guard = self.names.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = guard
            .as_ref()
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::store::InMemoryRecordStore;
    use async_trait::async_trait;
    use serde_json::json;

    fn record(value: Value) -> Attributes {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn store_with(entities: Value) -> InMemoryRecordStore {
        InMemoryRecordStore::new(Vec::new(), &StoreConfig::default()).with_config_record(record(
            json!({ "id": "entities", "pk": "entities", "libraries": entities }),
        ))
    }

    struct BrokenStore;

    #[async_trait]
    impl RecordStore for BrokenStore {
        async fn point_read(&self, _: &str, _: &str) -> Result<Option<Attributes>, StoreError> {
            Err(StoreError::Unavailable {
                message: "down".into(),
            })
        }
        async fn lookup_by_name(&self, _: &[String]) -> Result<Vec<Attributes>, StoreError> {
            unreachable!()
        }
        async fn vector_knn(
            &self,
            _: &[f32],
            _: &str,
            _: usize,
        ) -> Result<Vec<crate::store::ScoredRecord>, StoreError> {
            unreachable!()
        }
        async fn fulltext_rank(
            &self,
            _: &str,
            _: &[String],
            _: usize,
        ) -> Result<Vec<crate::store::ScoredRecord>, StoreError> {
            unreachable!()
        }
        async fn contains_search(
            &self,
            _: &[String],
            _: &str,
            _: usize,
        ) -> Result<Vec<crate::store::ScoredRecord>, StoreError> {
            unreachable!()
        }
        async fn hybrid_rank(
            &self,
            _: &[f32],
            _: &str,
            _: &str,
            _: &[String],
            _: usize,
        ) -> Result<Vec<crate::store::ScoredRecord>, StoreError> {
            unreachable!()
        }
    }

    #[test]
    fn test_uninitialized_count_is_negative() {
        let index = EntityIndex::new(EntitiesConfig::default());
        assert_eq!(index.count(), -1);
        assert!(!index.is_known("flask"));
        assert_eq!(index.most_frequent_mention("flask"), None);
    }

    #[tokio::test]
    async fn test_initialize_from_object_record_drops_placeholder() {
        let store = store_with(json!({ "pypi": {}, "Flask": {}, "numpy": {} }));
        let index = EntityIndex::new(EntitiesConfig::default());
        index.initialize(&store, false).await.unwrap();
        assert_eq!(index.count(), 2);
        assert!(index.is_known("flask"));
        assert!(index.is_known("FLASK"));
        assert!(!index.is_known("pypi"));
        assert_eq!(index.names(), vec!["flask", "numpy"]);
    }

    #[tokio::test]
    async fn test_initialize_from_array_record() {
        let store = store_with(json!(["fastapi", "pydantic"]));
        let index = EntityIndex::new(EntitiesConfig::default());
        index.initialize(&store, false).await.unwrap();
        assert_eq!(index.count(), 2);
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent_unless_forced() {
        let first = store_with(json!(["flask"]));
        let second = store_with(json!(["numpy", "pandas"]));
        let index = EntityIndex::new(EntitiesConfig::default());

        index.initialize(&first, false).await.unwrap();
        index.initialize(&second, false).await.unwrap();
        assert_eq!(index.count(), 1);

        index.initialize(&second, true).await.unwrap();
        assert_eq!(index.count(), 2);
        assert!(!index.is_known("flask"));
    }

    #[tokio::test]
    async fn test_missing_record_initializes_empty() {
        let store = InMemoryRecordStore::new(Vec::new(), &StoreConfig::default());
        let index = EntityIndex::new(EntitiesConfig::default());
        index.initialize(&store, false).await.unwrap();
        assert_eq!(index.count(), 0);
    }

    #[tokio::test]
    async fn test_failed_load_fails_open() {
        let index = EntityIndex::new(EntitiesConfig::default());
        assert!(index.initialize(&BrokenStore, false).await.is_err());
        assert_eq!(index.count(), -1);
        assert!(!index.is_known("flask"));

        // A later successful load still works.
        index
            .initialize(&store_with(json!(["flask"])), false)
            .await
            .unwrap();
        assert!(index.is_known("flask"));
    }

    #[test]
    fn test_is_known_rejects_empty() {
        let index = EntityIndex::from_names(["flask"]);
        assert!(!index.is_known(""));
        assert!(!index.is_known("   "));
        assert!(index.is_known(" Flask "));
    }

    #[test]
    fn test_most_frequent_mention() {
        let index = EntityIndex::from_names(["fastapi", "pydantic"]);
        assert_eq!(
            index.most_frequent_mention("I like Fastapi, pydantic, you, and fastapi"),
            Some("fastapi".to_string())
        );
        assert_eq!(index.most_frequent_mention(" "), None);
        assert_eq!(index.most_frequent_mention(""), None);
        assert_eq!(index.most_frequent_mention("nothing known here"), None);
    }

    #[test]
    fn test_most_frequent_mention_tie_goes_to_first() {
        let index = EntityIndex::from_names(["flask", "django"]);
        assert_eq!(
            index.most_frequent_mention("django vs flask."),
            Some("django".to_string())
        );
    }

    #[test]
    fn test_mentions_ignore_single_chars() {
        let index = EntityIndex::from_names(["r", "numpy"]);
        assert_eq!(
            index.mentions("r and numpy. numpy"),
            vec![("numpy".to_string(), 2)]
        );
    }
}
