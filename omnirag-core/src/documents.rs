//! Retrieved documents and the filter that makes them safe to hand to a prompt.
//!
//! Every adapter produces its own document shape. They share the
//! [`ContextRender`] interface so prompt assembly never inspects keys.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{RetrievalConfig, StoreConfig};
use crate::types::{SearchMode, Strategy};

/// Attribute name to value, in source order.
pub type Attributes = serde_json::Map<String, Value>;

/// Anything that can be rendered as `attribute: value` context lines.
pub trait ContextRender {
    fn context_lines(&self) -> Vec<String>;

    fn render_context(&self) -> String {
        self.context_lines().join("\n")
    }
}

/// A full domain record returned by exact name lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDoc {
    pub attributes: Attributes,
}

/// A relevance-ranked record returned by vector, full-text, or hybrid search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorDoc {
    pub attributes: Attributes,
    /// 1-based position within the adapter call.
    pub rank: usize,
    /// Similarity, full-text, or fused score depending on `mode`.
    pub score: f64,
    pub mode: SearchMode,
}

/// One variable-bound row from a graph query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphRow {
    /// Variable name to bound value (`null` when the row leaves it unbound).
    pub bindings: Attributes,
}

/// A document from any source adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum RetrievedDocument {
    Record(RecordDoc),
    Vector(VectorDoc),
    Graph(GraphRow),
}

impl RetrievedDocument {
    pub fn attributes(&self) -> &Attributes {
        match self {
            RetrievedDocument::Record(doc) => &doc.attributes,
            RetrievedDocument::Vector(doc) => &doc.attributes,
            RetrievedDocument::Graph(row) => &row.bindings,
        }
    }

    fn attributes_mut(&mut self) -> &mut Attributes {
        match self {
            RetrievedDocument::Record(doc) => &mut doc.attributes,
            RetrievedDocument::Vector(doc) => &mut doc.attributes,
            RetrievedDocument::Graph(row) => &mut row.bindings,
        }
    }

    /// The strategy whose adapter produces this variant.
    pub fn strategy(&self) -> Strategy {
        match self {
            RetrievedDocument::Record(_) => Strategy::Db,
            RetrievedDocument::Vector(_) => Strategy::Vector,
            RetrievedDocument::Graph(_) => Strategy::Graph,
        }
    }

    /// Value of the `name` attribute, if it is a string.
    pub fn name(&self) -> Option<&str> {
        self.attributes().get("name").and_then(Value::as_str)
    }

    /// A sanitized copy; the original is left untouched.
    pub fn sanitized(&self, filter: &DocumentFilter) -> RetrievedDocument {
        let mut copy = self.clone();
        let clean = filter.sanitize(copy.attributes());
        *copy.attributes_mut() = clean;
        copy
    }
}

impl ContextRender for Attributes {
    fn context_lines(&self) -> Vec<String> {
        self.iter()
            .map(|(key, value)| format!("{}: {}", key, render_value(value)))
            .collect()
    }
}

impl ContextRender for RecordDoc {
    fn context_lines(&self) -> Vec<String> {
        self.attributes.context_lines()
    }
}

impl ContextRender for VectorDoc {
    fn context_lines(&self) -> Vec<String> {
        self.attributes.context_lines()
    }
}

impl ContextRender for GraphRow {
    fn context_lines(&self) -> Vec<String> {
        self.bindings.context_lines()
    }
}

impl ContextRender for RetrievedDocument {
    fn context_lines(&self) -> Vec<String> {
        match self {
            RetrievedDocument::Record(doc) => doc.context_lines(),
            RetrievedDocument::Vector(doc) => doc.context_lines(),
            RetrievedDocument::Graph(row) => row.context_lines(),
        }
    }
}

/// Render a JSON value as a single prompt-friendly line.
fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(render_value)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

/// Strips embedding-like fields and bounds long text before documents enter a result.
#[derive(Debug, Clone)]
pub struct DocumentFilter {
    embedding_field: String,
    summary_max_chars: usize,
    documentation_max_chars: usize,
}

/// Short, summary-like text fields.
const SUMMARY_FIELDS: [&str; 2] = ["description", "summary"];
/// Long-form documentation-like text fields.
const DOCUMENTATION_FIELDS: [&str; 2] = ["documentation_summary", "documentation"];
/// Attribute whose ids carry a type prefix (`pypi_jinja2`).
const DEPENDENCY_IDS: &str = "dependency_ids";
/// Library type prefixes found on dependency ids.
const TYPE_PREFIXES: [&str; 1] = ["pypi_"];

impl DocumentFilter {
    pub fn new(
        embedding_field: impl Into<String>,
        summary_max_chars: usize,
        documentation_max_chars: usize,
    ) -> Self {
        Self {
            embedding_field: embedding_field.into(),
            summary_max_chars,
            documentation_max_chars,
        }
    }

    pub fn from_config(store: &StoreConfig, retrieval: &RetrievalConfig) -> Self {
        Self::new(
            store.embedding_field.clone(),
            retrieval.summary_max_chars,
            retrieval.documentation_max_chars,
        )
    }

    /// True for the configured embedding field and anything named like one.
    pub fn is_embedding_like(&self, key: &str) -> bool {
        key.eq_ignore_ascii_case(&self.embedding_field)
            || key.to_lowercase().contains("embedding")
    }

    /// Return a cleaned copy of `attrs`.
    pub fn sanitize(&self, attrs: &Attributes) -> Attributes {
        attrs
            .iter()
            .filter(|(key, _)| !self.is_embedding_like(key))
            .map(|(key, value)| (key.clone(), self.clean_field(key, value)))
            .collect()
    }

    fn clean_field(&self, key: &str, value: &Value) -> Value {
        let limit = if SUMMARY_FIELDS.contains(&key) {
            self.summary_max_chars
        } else {
            self.documentation_max_chars
        };
        match value {
            Value::String(s) => Value::String(truncate_chars(&normalize_newlines(s), limit)),
            Value::Array(items) if key == DEPENDENCY_IDS => Value::Array(
                items
                    .iter()
                    .map(|item| match item {
                        Value::String(id) => Value::String(strip_type_prefix(id).to_string()),
                        other => other.clone(),
                    })
                    .collect(),
            ),
            Value::Object(inner) => Value::Object(self.sanitize(inner)),
            other => other.clone(),
        }
    }
}

impl Default for DocumentFilter {
    fn default() -> Self {
        Self::from_config(&StoreConfig::default(), &RetrievalConfig::default())
    }
}

/// Truncate to at most `max` characters, never splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

fn normalize_newlines(s: &str) -> String {
    s.replace("\r\n", " ").replace(['\n', '\r'], " ")
}

/// `pypi_jinja2` -> `jinja2`; ids without a known type prefix are returned unchanged.
fn strip_type_prefix(id: &str) -> &str {
    TYPE_PREFIXES
        .iter()
        .find_map(|prefix| id.strip_prefix(prefix))
        .unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn attrs(value: Value) -> Attributes {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_sanitize_strips_embeddings() {
        let filter = DocumentFilter::default();
        let clean = filter.sanitize(&attrs(json!({
            "name": "flask",
            "embedding": [0.1, 0.2],
            "title_embedding": [0.3],
            "Embedding": [0.4],
        })));
        assert_eq!(clean.keys().collect::<Vec<_>>(), vec!["name"]);
    }

    #[test]
    fn test_sanitized_copies_graph_rows() {
        let filter = DocumentFilter::default();
        let doc = RetrievedDocument::Graph(GraphRow {
            bindings: attrs(json!({
                "description": format!("line one\nline two {}", "x".repeat(600)),
                "nested": { "embedding": [0.1], "kept": "x" },
                "name_embedding": [0.2],
            })),
        });
        let clean = doc.sanitized(&filter);
        let description = clean.attributes()["description"].as_str().unwrap();
        assert_eq!(description.chars().count(), 255);
        assert!(!description.contains('\n'));
        assert_eq!(clean.attributes()["nested"], json!({ "kept": "x" }));
        assert!(!clean.attributes().contains_key("name_embedding"));
        assert!(doc.attributes().contains_key("name_embedding"));
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let filter = DocumentFilter::default();
        let once = filter.sanitize(&attrs(json!({
            "dependency_ids": ["pypi_typing_extensions", "typing_extensions"],
            "summary": "a\r\nb",
        })));
        let twice = filter.sanitize(&once);
        assert_eq!(once, twice);
        assert_eq!(
            twice["dependency_ids"],
            json!(["typing_extensions", "typing_extensions"])
        );
    }

    #[test]
    fn test_sanitize_custom_embedding_field() {
        let filter = DocumentFilter::new("vec", 255, 1024);
        let clean = filter.sanitize(&attrs(json!({ "name": "a", "vec": [1.0] })));
        assert!(!clean.contains_key("vec"));
    }

    #[test]
    fn test_sanitize_truncates_and_normalizes() {
        let filter = DocumentFilter::default();
        let long_summary = format!("line one\nline two {}", "x".repeat(400));
        let long_docs = "d".repeat(2000);
        let clean = filter.sanitize(&attrs(json!({
            "summary": long_summary,
            "documentation_summary": long_docs,
        })));
        let summary = clean["summary"].as_str().unwrap();
        assert_eq!(summary.chars().count(), 255);
        assert!(summary.starts_with("line one line two"));
        assert_eq!(
            clean["documentation_summary"].as_str().unwrap().chars().count(),
            1024
        );
    }

    #[test]
    fn test_sanitize_dependency_ids() {
        let filter = DocumentFilter::default();
        let clean = filter.sanitize(&attrs(json!({
            "dependency_ids": ["pypi_jinja2", "pypi_markupsafe", "click", "python_dotenv"],
        })));
        assert_eq!(
            clean["dependency_ids"],
            json!(["jinja2", "markupsafe", "click", "python_dotenv"])
        );
    }

    #[test]
    fn test_sanitize_nested_objects() {
        let filter = DocumentFilter::default();
        let clean = filter.sanitize(&attrs(json!({
            "meta": { "embedding": [1.0], "kind": "lib" }
        })));
        assert_eq!(clean["meta"], json!({ "kind": "lib" }));
    }

    #[test]
    fn test_truncate_chars_multibyte() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 0), "");
    }

    #[test]
    fn test_context_lines() {
        let doc = RetrievedDocument::Vector(VectorDoc {
            attributes: attrs(json!({
                "name": "flask",
                "kwds": ["web", "wsgi"],
                "release_count": 12,
                "homepage": null,
            })),
            rank: 1,
            score: 0.9,
            mode: SearchMode::Vector,
        });
        assert_eq!(
            doc.context_lines(),
            vec!["name: flask", "kwds: web, wsgi", "release_count: 12", "homepage: "]
        );
        assert_eq!(doc.strategy(), Strategy::Vector);
    }

    #[test]
    fn test_document_serialization_tagged() {
        let row = RetrievedDocument::Graph(GraphRow {
            bindings: attrs(json!({ "lib": "flask" })),
        });
        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(value["source"], "graph");
        assert_eq!(value["bindings"]["lib"], "flask");
    }
}
