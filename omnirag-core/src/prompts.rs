//! Prompt text for strategy classification and graph query generation.

use std::path::PathBuf;
use tracing::{debug, warn};

/// System prompt for the LLM phase of strategy classification.
pub const STRATEGY_SYSTEM_PROMPT: &str = r#"You decide which data source should supply context for answering the question in the user prompt. There are exactly three sources and they hold the same information in different shapes:

db: a record database. Use it when the user wants one specific item or record looked up by name or identifier. Examples:
- "look up record X"
- "find library X"
- "what is the status of request X"
- "when was ticket X last updated"

vector: a similarity index over descriptions. Use it for open-ended, how-to, or "something like" questions. Examples:
- "how to change my password"
- "libraries for parsing dates"
- "expense report procedure"

graph: a knowledge graph of entities and their relationships. Use it for relationship or fact traversal over a set of items, even if only one item is returned. Examples:
- "what are the dependencies of library X"
- "who do I report to"
- "which libraries depend on X"
- "what types of reports exist"

Choose db when the user wants specific item(s) by identity and graph when they want items connected by some criterion.
Answer with exactly one word: db, vector, or graph."#;

/// Built-in system prompt for structured query generation. `{schema}` is
/// replaced with the minimised ontology.
pub const SPARQL_PROMPT_TEMPLATE: &str = r#"You generate queries against a knowledge graph built with standard RDF technologies.
The following ontology describes the classes and relationships in the graph:
{schema}
Using concise SPARQL 1.1 syntax and no datatype suffixes such as ^^xsd:string, return a JSON object of the form {"sparql": "<query>"} whose query returns the entities and relationships relevant to the user prompt."#;

/// Substitute the schema into a template.
///
/// Templates use `{schema}`; files written for positional formatting may use
/// a bare `{}` instead, which is replaced once.
pub fn render_sparql_prompt(template: &str, schema: &str) -> String {
    if template.contains("{schema}") {
        template.replace("{schema}", schema)
    } else if template.contains("{}") {
        template.replacen("{}", schema, 1)
    } else {
        format!("{}\n{}", template, schema)
    }
}

/// Source of the structured-query generation prompt.
///
/// When a template file is configured it is re-read on every call, so the
/// prompt can be tuned while the process runs.
#[derive(Debug, Clone, Default)]
pub struct SparqlPromptSource {
    template_path: Option<PathBuf>,
}

impl SparqlPromptSource {
    pub fn new(template_path: Option<PathBuf>) -> Self {
        Self { template_path }
    }

    /// The current template: the file's contents, or the built-in one.
    pub async fn template(&self) -> String {
        let Some(path) = &self.template_path else {
            return SPARQL_PROMPT_TEMPLATE.to_string();
        };
        match tokio::fs::read_to_string(path).await {
            Ok(text) if !text.trim().is_empty() => {
                debug!(path = %path.display(), len = text.len(), "Loaded query prompt template");
                text
            }
            Ok(_) => {
                warn!(path = %path.display(), "Query prompt template is empty; using built-in");
                SPARQL_PROMPT_TEMPLATE.to_string()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot read query prompt template; using built-in");
                SPARQL_PROMPT_TEMPLATE.to_string()
            }
        }
    }

    pub async fn system_prompt(&self, schema: &str) -> String {
        render_sparql_prompt(&self.template().await, schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_prompt_lists_labels() {
        for label in ["db:", "vector:", "graph:"] {
            assert!(STRATEGY_SYSTEM_PROMPT.contains(label));
        }
    }

    #[test]
    fn test_render_named_placeholder() {
        let out = render_sparql_prompt(SPARQL_PROMPT_TEMPLATE, ":Library a owl:Class .");
        assert!(out.contains(":Library a owl:Class ."));
        assert!(!out.contains("{schema}"));
        // The JSON example braces survive.
        assert!(out.contains(r#"{"sparql": "<query>"}"#));
    }

    #[test]
    fn test_render_positional_placeholder() {
        assert_eq!(render_sparql_prompt("schema: {} end", "S"), "schema: S end");
        assert_eq!(render_sparql_prompt("no slot", "S"), "no slot\nS");
    }

    #[tokio::test]
    async fn test_template_file_is_reread() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.txt");
        std::fs::write(&path, "v1 {schema}").unwrap();
        let source = SparqlPromptSource::new(Some(path.clone()));
        assert_eq!(source.system_prompt("X").await, "v1 X");

        std::fs::write(&path, "v2 {schema}").unwrap();
        assert_eq!(source.system_prompt("X").await, "v2 X");
    }

    #[tokio::test]
    async fn test_missing_template_falls_back() {
        let source = SparqlPromptSource::new(Some(PathBuf::from("/nonexistent/prompt.txt")));
        assert_eq!(source.template().await, SPARQL_PROMPT_TEMPLATE);
        assert_eq!(SparqlPromptSource::default().template().await, SPARQL_PROMPT_TEMPLATE);
    }
}
