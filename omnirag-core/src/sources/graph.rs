//! Graph retrieval: natural language -> generated SPARQL -> remote execution.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Value, json};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{Retrieval, RetrievalRequest, SourceAdapter};
use crate::brain::{CompletionRequest, LlmProvider};
use crate::config::GraphConfig;
use crate::documents::{Attributes, DocumentFilter, GraphRow, RetrievedDocument};
use crate::error::{GraphError, RagError};
use crate::ontology::Ontology;
use crate::prompts::SparqlPromptSource;
use crate::types::Strategy;

/// Keys a model may use for the generated query, in preference order.
const QUERY_KEYS: [&str; 3] = ["sparql", "query", "SPARQL"];

static FENCED_BLOCK: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:[A-Za-z]+)?\s*\n?(.*?)```").ok());

/// Rows returned by one query, with the declared variable names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryBindings {
    pub variables: Vec<String>,
    pub rows: Vec<Attributes>,
}

/// Executes a structured query and returns its bindings.
#[async_trait]
pub trait GraphService: Send + Sync {
    async fn execute(&self, query: &str) -> Result<QueryBindings, GraphError>;
}

/// Parse a graph service response body.
///
/// Every declared variable is present in each row; unbound ones are null.
/// A non-empty `error` string fails the query.
pub fn parse_sparql_response(body: &Value) -> Result<QueryBindings, GraphError> {
    if let Some(message) = body.get("error").and_then(Value::as_str)
        && !message.trim().is_empty()
    {
        return Err(GraphError::QueryFailed {
            message: message.to_string(),
        });
    }
    let results = body
        .get("results")
        .ok_or_else(|| GraphError::MalformedResponse {
            message: "missing 'results'".into(),
        })?;

    let variables: Vec<String> = results
        .pointer("/head/vars")
        .and_then(Value::as_array)
        .map(|vars| {
            vars.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let rows = results
        .pointer("/results/bindings")
        .and_then(Value::as_array)
        .map(|bindings| {
            bindings
                .iter()
                .map(|binding| {
                    variables
                        .iter()
                        .map(|var| {
                            let value = binding
                                .get(var)
                                .and_then(|b| b.get("value"))
                                .cloned()
                                .unwrap_or(Value::Null);
                            (var.clone(), value)
                        })
                        .collect::<Attributes>()
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(QueryBindings { variables, rows })
}

// ---------------------------------------------------------------------------
// HTTP graph service
// ---------------------------------------------------------------------------

/// Graph microservice client: `POST {"sparql": ...}` to the query endpoint.
pub struct HttpGraphService {
    client: reqwest::Client,
    endpoint: String,
    auth: Option<(String, String)>,
}

impl HttpGraphService {
    pub fn new(config: &GraphConfig) -> Result<Self, GraphError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GraphError::Request {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        let auth = match (&config.auth_header, &config.auth_value_env) {
            (Some(header), Some(var)) => match std::env::var(var) {
                Ok(value) => Some((header.clone(), value)),
                Err(_) => {
                    warn!(env_var = %var, "Graph auth header configured but variable unset");
                    None
                }
            },
            _ => None,
        };

        Ok(Self {
            client,
            endpoint: config.query_endpoint(),
            auth,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl GraphService for HttpGraphService {
    async fn execute(&self, query: &str) -> Result<QueryBindings, GraphError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "sparql": query }));
        if let Some((header, value)) = &self.auth {
            request = request.header(header.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|e| GraphError::Request {
            message: if e.is_timeout() {
                format!("timed out calling {}", self.endpoint)
            } else {
                e.to_string()
            },
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GraphError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| GraphError::MalformedResponse {
                message: e.to_string(),
            })?;
        parse_sparql_response(&body)
    }
}

// ---------------------------------------------------------------------------
// Query generation
// ---------------------------------------------------------------------------

/// Turns a natural-language question into SPARQL with the LLM.
pub struct SparqlGenerator {
    llm: Arc<dyn LlmProvider>,
    prompt: SparqlPromptSource,
    temperature: f32,
}

impl SparqlGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>, prompt: SparqlPromptSource) -> Self {
        Self {
            llm,
            prompt,
            temperature: 0.2,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub async fn generate(&self, question: &str, ontology: &Ontology) -> Result<String, RagError> {
        let system_prompt = self.prompt.system_prompt(ontology.text()).await;
        let request = CompletionRequest::new(system_prompt, question)
            .with_temperature(self.temperature)
            .with_json_response();
        let response = self.llm.complete(request).await?;
        extract_query(&response.text).ok_or(RagError::Graph(GraphError::EmptyQuery))
    }
}

/// Pull the query out of a model answer: a JSON object keyed by one of the
/// known names, a fenced block, or the bare text.
pub fn extract_query(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
        return QUERY_KEYS
            .iter()
            .filter_map(|k| map.get(*k).and_then(Value::as_str))
            .map(str::trim)
            .find(|q| !q.is_empty())
            .map(str::to_string);
    }
    let text = FENCED_BLOCK
        .as_ref()
        .and_then(|re| re.captures(trimmed))
        .and_then(|c| c.get(1))
        .map_or(trimmed, |m| m.as_str().trim());
    (!text.is_empty()).then(|| text.to_string())
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

pub struct GraphQuery {
    generator: SparqlGenerator,
    service: Arc<dyn GraphService>,
    ontology: Ontology,
    filter: DocumentFilter,
}

impl GraphQuery {
    pub fn new(generator: SparqlGenerator, service: Arc<dyn GraphService>, ontology: Ontology) -> Self {
        Self {
            generator,
            service,
            ontology,
            filter: DocumentFilter::default(),
        }
    }

    pub fn with_filter(mut self, filter: DocumentFilter) -> Self {
        self.filter = filter;
        self
    }
}

#[async_trait]
impl SourceAdapter for GraphQuery {
    fn strategy(&self) -> Strategy {
        Strategy::Graph
    }

    async fn retrieve(&self, request: &RetrievalRequest) -> Retrieval {
        let query = match self.generator.generate(&request.user_text, &self.ontology).await {
            Ok(q) => q,
            Err(e) => {
                warn!(error = %e, "Query generation failed");
                return Retrieval::failed(e).with_label("graph query");
            }
        };
        debug!(sparql = %query, "Generated graph query");

        match self.service.execute(&query).await {
            Ok(bindings) => {
                let documents: Vec<RetrievedDocument> = bindings
                    .rows
                    .into_iter()
                    .take(request.max_docs)
                    .map(|row| {
                        RetrievedDocument::Graph(GraphRow {
                            bindings: self.filter.sanitize(&row),
                        })
                    })
                    .collect();
                info!(
                    variables = ?bindings.variables,
                    found = documents.len(),
                    "Graph query done"
                );
                Retrieval::found(documents)
                    .with_query(query)
                    .with_label("graph query")
            }
            Err(e) => {
                warn!(error = %e, "Graph service call failed");
                Retrieval::failed(e).with_query(query).with_label("graph query")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    fn jena_body() -> Value {
        json!({
            "sparql": "SELECT ?used_library WHERE { ... }",
            "results": {
                "head": { "vars": ["used_library", "version"] },
                "results": { "bindings": [
                    { "used_library": { "type": "uri", "value": "http://x/caig#werkzeug" },
                      "version": { "type": "literal", "value": "3.0" } },
                    { "used_library": { "type": "uri", "value": "http://x/caig#click" } }
                ] }
            },
            "elapsed": 1,
            "error": ""
        })
    }

    /// Records queries and answers with a fixed outcome.
    struct StubGraph {
        reply: Result<QueryBindings, String>,
        seen: Mutex<Vec<String>>,
    }

    impl StubGraph {
        fn ok(bindings: QueryBindings) -> Self {
            Self {
                reply: Ok(bindings),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                reply: Err(message.to_string()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl GraphService for StubGraph {
        async fn execute(&self, query: &str) -> Result<QueryBindings, GraphError> {
            self.seen.lock().unwrap().push(query.to_string());
            self.reply
                .clone()
                .map_err(|message| GraphError::Request { message })
        }
    }

    fn adapter(llm: Arc<MockLlmProvider>, service: Arc<StubGraph>) -> GraphQuery {
        GraphQuery::new(
            SparqlGenerator::new(llm, SparqlPromptSource::default()),
            service,
            Ontology::from_text("# comment\n:Lib a owl:Class ."),
        )
    }

    #[test]
    fn test_parse_response_rows() {
        let parsed = parse_sparql_response(&jena_body()).unwrap();
        assert_eq!(parsed.variables, vec!["used_library", "version"]);
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows[0]["version"], json!("3.0"));
        assert_eq!(parsed.rows[1]["version"], Value::Null);
    }

    #[test]
    fn test_parse_response_errors() {
        let err = parse_sparql_response(&json!({ "error": "bad syntax", "results": {} }));
        assert!(matches!(err, Err(GraphError::QueryFailed { .. })));
        let err = parse_sparql_response(&json!({ "elapsed": 3 }));
        assert!(matches!(err, Err(GraphError::MalformedResponse { .. })));
        let empty = parse_sparql_response(&json!({ "results": {} })).unwrap();
        assert!(empty.rows.is_empty());
    }

    #[test]
    fn test_extract_query_forms() {
        assert_eq!(
            extract_query(r#"{"sparql": " SELECT ?a WHERE {} "}"#).as_deref(),
            Some("SELECT ?a WHERE {}")
        );
        assert_eq!(
            extract_query(r#"{"sparql": "", "query": "SELECT ?b WHERE {}"}"#).as_deref(),
            Some("SELECT ?b WHERE {}")
        );
        assert_eq!(
            extract_query(r#"{"SPARQL": "ASK {}"}"#).as_deref(),
            Some("ASK {}")
        );
        assert_eq!(
            extract_query("Here:\n```sparql\nSELECT ?c WHERE {}\n```").as_deref(),
            Some("SELECT ?c WHERE {}")
        );
        assert_eq!(extract_query("SELECT ?d WHERE {}").as_deref(), Some("SELECT ?d WHERE {}"));
        assert_eq!(extract_query(r#"{"sparql": ""}"#), None);
        assert_eq!(extract_query("   "), None);
    }

    #[tokio::test]
    async fn test_generator_sends_schema_and_json_mode() {
        let llm = Arc::new(MockLlmProvider::new());
        llm.queue_text(r#"{"sparql": "SELECT ?x WHERE {}"}"#);
        let generator = SparqlGenerator::new(llm.clone(), SparqlPromptSource::default())
            .with_temperature(0.3);
        let query = generator
            .generate("what does flask use", &Ontology::from_text(":Lib a owl:Class ."))
            .await
            .unwrap();
        assert_eq!(query, "SELECT ?x WHERE {}");

        let request = &llm.requests()[0];
        assert!(request.system_prompt.contains(":Lib a owl:Class ."));
        assert!(request.json_response);
        assert_eq!(request.temperature, 0.3);
        assert_eq!(request.user_prompt, "what does flask use");
    }

    #[tokio::test]
    async fn test_retrieve_converts_rows_and_caps() {
        let llm = Arc::new(MockLlmProvider::new());
        llm.queue_text(r#"{"sparql": "SELECT ?used_library WHERE {}"}"#);
        let service = Arc::new(StubGraph::ok(parse_sparql_response(&jena_body()).unwrap()));
        let retrieval = adapter(llm, service.clone())
            .retrieve(&RetrievalRequest::new("what does flask use", 1))
            .await;

        assert_eq!(retrieval.generated_query.as_deref(), Some("SELECT ?used_library WHERE {}"));
        assert_eq!(retrieval.source_label.as_deref(), Some("graph query"));
        let docs = retrieval.documents();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].strategy(), Strategy::Graph);
        assert_eq!(docs[0].attributes()["used_library"], json!("http://x/caig#werkzeug"));
        assert_eq!(service.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_retrieve_sanitizes_row_bindings() {
        let llm = Arc::new(MockLlmProvider::new());
        llm.queue_text(r#"{"sparql": "SELECT ?lib ?summary WHERE {}"}"#);
        let mut row = Attributes::new();
        row.insert("lib".into(), json!("flask"));
        row.insert(
            "summary".into(),
            json!(format!("first\r\nsecond {}", "y".repeat(400))),
        );
        let service = Arc::new(StubGraph::ok(QueryBindings {
            variables: vec!["lib".into(), "summary".into()],
            rows: vec![row],
        }));
        let retrieval = adapter(llm, service)
            .retrieve(&RetrievalRequest::new("what does flask use", 5))
            .await;

        let summary = retrieval.documents()[0].attributes()["summary"]
            .as_str()
            .unwrap()
            .to_string();
        assert_eq!(summary.chars().count(), 255);
        assert!(summary.starts_with("first second"));
    }

    #[tokio::test]
    async fn test_retrieve_service_failure_keeps_query() {
        let llm = Arc::new(MockLlmProvider::new());
        llm.queue_text(r#"{"sparql": "SELECT ?x WHERE {}"}"#);
        let retrieval = adapter(llm, Arc::new(StubGraph::failing("connection refused")))
            .retrieve(&RetrievalRequest::new("q", 5))
            .await;
        assert!(retrieval.is_failure());
        assert!(retrieval.documents().is_empty());
        assert_eq!(retrieval.generated_query.as_deref(), Some("SELECT ?x WHERE {}"));
    }

    #[tokio::test]
    async fn test_retrieve_generation_failure_skips_service() {
        let llm = Arc::new(MockLlmProvider::new());
        llm.queue_text(r#"{"sparql": ""}"#);
        let service = Arc::new(StubGraph::ok(QueryBindings::default()));
        let retrieval = adapter(llm, service.clone())
            .retrieve(&RetrievalRequest::new("q", 5))
            .await;
        assert!(matches!(
            retrieval.outcome,
            Err(RagError::Graph(GraphError::EmptyQuery))
        ));
        assert!(service.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_http_service_endpoint() {
        let service = HttpGraphService::new(&GraphConfig::default()).unwrap();
        assert_eq!(service.endpoint(), "http://127.0.0.1:8001/sparql_query");
    }
}
