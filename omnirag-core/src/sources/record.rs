//! Exact record lookup by entity name.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{Retrieval, RetrievalRequest, SourceAdapter};
use crate::documents::{DocumentFilter, RecordDoc, RetrievedDocument};
use crate::store::RecordStore;
use crate::types::Strategy;

pub struct RecordLookup {
    store: Arc<dyn RecordStore>,
    filter: DocumentFilter,
}

impl RecordLookup {
    pub fn new(store: Arc<dyn RecordStore>, filter: DocumentFilter) -> Self {
        Self { store, filter }
    }
}

#[async_trait]
impl SourceAdapter for RecordLookup {
    fn strategy(&self) -> Strategy {
        Strategy::Db
    }

    /// Names that match nothing are simply absent from the result.
    async fn retrieve(&self, request: &RetrievalRequest) -> Retrieval {
        let names: Vec<String> = request
            .entity_names
            .iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .take(request.max_docs)
            .collect();
        if names.is_empty() {
            debug!("Record lookup without entity names");
            return Retrieval::found(Vec::new()).with_label("record lookup");
        }

        let label = format!("record lookup: {}", names.join(", "));
        match self.store.lookup_by_name(&names).await {
            Ok(records) => {
                let documents: Vec<RetrievedDocument> = records
                    .into_iter()
                    .take(request.max_docs)
                    .map(|attrs| {
                        RetrievedDocument::Record(RecordDoc {
                            attributes: self.filter.sanitize(&attrs),
                        })
                    })
                    .collect();
                debug!(requested = names.len(), found = documents.len(), "Record lookup done");
                Retrieval::found(documents).with_label(label)
            }
            Err(e) => {
                warn!(error = %e, names = ?names, "Record lookup failed");
                Retrieval::failed(e).with_label(label)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::store::InMemoryRecordStore;
    use serde_json::{Value, json};

    fn lookup() -> RecordLookup {
        let docs = vec![
            json!({ "name": "flask", "embedding": [0.1, 0.2], "dependency_ids": ["pypi_jinja2"] }),
            json!({ "name": "numpy", "embedding": [0.3, 0.4] }),
        ]
        .into_iter()
        .filter_map(|v| match v {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect();
        RecordLookup::new(
            Arc::new(InMemoryRecordStore::new(docs, &StoreConfig::default())),
            DocumentFilter::default(),
        )
    }

    #[tokio::test]
    async fn test_lookup_strips_embedding() {
        let retrieval = lookup()
            .retrieve(&RetrievalRequest::new("lookup flask", 10).with_entities(vec!["flask".into()]))
            .await;
        let docs = retrieval.documents();
        assert_eq!(docs.len(), 1);
        assert!(!docs[0].attributes().contains_key("embedding"));
        assert_eq!(docs[0].attributes()["dependency_ids"], json!(["jinja2"]));
        assert_eq!(retrieval.source_label.as_deref(), Some("record lookup: flask"));
    }

    #[tokio::test]
    async fn test_lookup_missing_is_empty_not_error() {
        let retrieval = lookup()
            .retrieve(&RetrievalRequest::new("lookup django", 10).with_entities(vec!["django".into()]))
            .await;
        assert!(!retrieval.is_failure());
        assert!(retrieval.documents().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_without_names() {
        let retrieval = lookup()
            .retrieve(&RetrievalRequest::new("lookup", 10).with_entities(vec!["  ".into()]))
            .await;
        assert!(!retrieval.is_failure());
        assert!(retrieval.documents().is_empty());
        assert_eq!(lookup().strategy(), Strategy::Db);
    }
}
