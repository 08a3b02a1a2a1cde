//! Configuration system for OmniRAG.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> explicit file -> environment. Configuration is loaded
//! from `~/.config/omnirag/config.toml` and/or `.omnirag/config.toml` in the
//! workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for the retrieval core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RagConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub entities: EntitiesConfig,
}

impl RagConfig {
    /// Validate every section and return all warnings, each prefixed with its section.
    pub fn validate(&self) -> Vec<String> {
        let sections = [
            ("llm", self.llm.validate()),
            ("embedding", self.embedding.validate()),
            ("store", self.store.validate()),
            ("graph", self.graph.validate()),
            ("retrieval", self.retrieval.validate()),
        ];
        sections
            .into_iter()
            .flat_map(|(name, warnings)| {
                warnings
                    .into_iter()
                    .map(move |w| format!("[{}] {}", name, w))
            })
            .collect()
    }
}

/// LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name: "openai", "azure", "ollama", "mock".
    pub provider: String,
    /// Model identifier (for Azure this is the deployment name).
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Optional base URL override for the API endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// API version query parameter used by Azure OpenAI deployments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    /// Maximum tokens to generate in a response.
    pub max_tokens: usize,
    /// Temperature used when classifying the retrieval strategy.
    pub classification_temperature: f32,
    /// Temperature used when generating structured graph queries.
    pub query_temperature: f32,
    /// Network timeout for a single completion call.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: None,
            api_version: None,
            max_tokens: 1024,
            classification_temperature: 0.0,
            query_temperature: 0.2,
            timeout_secs: 30,
        }
    }
}

impl LlmConfig {
    /// Validate this LLM config and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        match self.provider.as_str() {
            "openai" | "ollama" | "mock" => {}
            "azure" => {
                if self.base_url.is_none() {
                    warnings.push("azure provider requires base_url (the resource endpoint)".into());
                }
                if self.api_version.is_none() {
                    warnings.push("azure provider without api_version; a default will be used".into());
                }
            }
            other => warnings.push(format!("unknown provider '{}'", other)),
        }
        if !(0.0..=2.0).contains(&self.classification_temperature) {
            warnings.push(format!(
                "classification_temperature {} is outside 0.0..=2.0",
                self.classification_temperature
            ));
        }
        if self.classification_temperature > 0.5 {
            warnings.push(
                "classification_temperature above 0.5 makes strategy selection nondeterministic"
                    .into(),
            );
        }
        if self.timeout_secs == 0 {
            warnings.push("timeout_secs is 0; every completion call will time out".into());
        }
        warnings
    }
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider name: "local", "openai", "azure".
    pub provider: String,
    /// Model identifier (deployment name for Azure).
    pub model: String,
    /// Dimensionality of produced vectors.
    pub dimensions: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub api_key_env: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "local".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimensions: 128,
            base_url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            api_version: None,
            timeout_secs: 30,
        }
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.dimensions == 0 {
            warnings.push("dimensions is 0; vector search cannot rank anything".into());
        }
        if !matches!(self.provider.as_str(), "local" | "openai" | "azure") {
            warnings.push(format!("unknown provider '{}'", self.provider));
        }
        warnings
    }
}

/// Record store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON snapshot backing the in-memory record store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documents_path: Option<PathBuf>,
    /// Attribute holding each record's embedding vector.
    pub embedding_field: String,
    /// Attribute holding each record's entity name.
    pub name_field: String,
    /// Ranked full-text fields, tried in order (primary, then alternate).
    pub fulltext_fields: Vec<String>,
    /// Fields searched by the substring-containment last resort.
    pub contains_fields: Vec<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            documents_path: None,
            embedding_field: "embedding".to_string(),
            name_field: "name".to_string(),
            fulltext_fields: vec!["description".to_string(), "summary".to_string()],
            contains_fields: vec![
                "description".to_string(),
                "summary".to_string(),
                "name".to_string(),
            ],
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.fulltext_fields.is_empty() {
            warnings.push("fulltext_fields is empty; full-text search goes straight to substring matching".into());
        }
        if self.contains_fields.is_empty() {
            warnings.push("contains_fields is empty; the substring fallback can never match".into());
        }
        if let Some(ref path) = self.documents_path
            && !path.exists()
        {
            warnings.push(format!("documents_path {} does not exist", path.display()));
        }
        warnings
    }
}

/// Remote graph service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Base URL of the graph service, without port.
    pub service_url: String,
    pub service_port: u16,
    /// Name of the shared-secret header sent with each query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_header: Option<String>,
    /// Environment variable holding the shared-secret header value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_value_env: Option<String>,
    pub timeout_secs: u64,
    /// Ontology schema seeding structured-query generation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ontology_path: Option<PathBuf>,
    /// Optional prompt template override, re-read on every generation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sparql_prompt_path: Option<PathBuf>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            service_url: "http://127.0.0.1".to_string(),
            service_port: 8001,
            auth_header: None,
            auth_value_env: None,
            timeout_secs: 30,
            ontology_path: None,
            sparql_prompt_path: None,
        }
    }
}

impl GraphConfig {
    /// Full query endpoint: `{service_url}:{service_port}/sparql_query`.
    pub fn query_endpoint(&self) -> String {
        format!(
            "{}:{}/sparql_query",
            self.service_url.trim_end_matches('/'),
            self.service_port
        )
    }

    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if !self.service_url.starts_with("http://") && !self.service_url.starts_with("https://") {
            warnings.push(format!(
                "service_url '{}' has no http(s) scheme",
                self.service_url
            ));
        }
        if self.auth_header.is_some() != self.auth_value_env.is_some() {
            warnings.push("auth_header and auth_value_env must be set together".into());
        }
        match &self.ontology_path {
            None => warnings
                .push("no ontology_path; graph queries are generated without a schema".into()),
            Some(path) if !path.exists() => {
                warnings.push(format!("ontology_path {} does not exist", path.display()))
            }
            Some(_) => {}
        }
        warnings
    }
}

/// Retrieval policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_max_docs: usize,
    /// First-token verbs that mark a short utterance as a record lookup.
    pub lookup_verbs: Vec<String>,
    /// Utterances must have strictly fewer tokens than this to take the rule path.
    pub rule_max_tokens: usize,
    /// Reciprocal rank fusion constant.
    pub rrf_k: u32,
    /// Delegate hybrid ranking to the store instead of fusing locally.
    pub store_side_rrf: bool,
    pub summary_max_chars: usize,
    pub documentation_max_chars: usize,
    /// Outer bound on a single adapter call, on top of network timeouts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter_timeout_secs: Option<u64>,
}

/// The fixed lookup verbs recognised by the rule phase.
pub const DEFAULT_LOOKUP_VERBS: [&str; 7] =
    ["lookup", "find", "fetch", "search", "get", "retrieve", "show"];

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_max_docs: 10,
            lookup_verbs: DEFAULT_LOOKUP_VERBS.iter().map(|v| v.to_string()).collect(),
            rule_max_tokens: 4,
            rrf_k: 60,
            store_side_rrf: false,
            summary_max_chars: 255,
            documentation_max_chars: 1024,
            adapter_timeout_secs: None,
        }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.default_max_docs == 0 {
            warnings.push("default_max_docs is 0; queries return no documents".into());
        }
        if self.rule_max_tokens < 2 {
            warnings.push(format!(
                "rule_max_tokens is {}; the rule phase can never match a verb plus a name",
                self.rule_max_tokens
            ));
        }
        if self.lookup_verbs.is_empty() {
            warnings.push("lookup_verbs is empty; every query goes to the LLM classifier".into());
        }
        if self.rrf_k == 0 {
            warnings.push("rrf_k is 0; top ranks dominate fusion completely".into());
        }
        if self.adapter_timeout_secs == Some(0) {
            warnings.push("adapter_timeout_secs is 0; every adapter call will time out".into());
        }
        warnings
    }
}

/// Entity configuration record location and shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EntitiesConfig {
    /// Id (and partition key) of the entity configuration record.
    pub document_id: String,
    /// Attribute listing the known entities.
    pub group_attr: String,
    /// Placeholder keys inside the group that are not entities.
    pub ignored_groups: Vec<String>,
}

impl Default for EntitiesConfig {
    fn default() -> Self {
        Self {
            document_id: "entities".to_string(),
            group_attr: "libraries".to_string(),
            ignored_groups: vec!["pypi".to_string()],
        }
    }
}

/// Load configuration by merging defaults, config files, and environment variables.
///
/// Later layers win: user config, workspace `.omnirag/config.toml`, the explicit
/// `config_file`, then `OMNIRAG_`-prefixed variables (`OMNIRAG_LLM__MODEL`).
pub fn load_config(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
) -> Result<RagConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(RagConfig::default()));

    if let Some(config_dir) = directories::ProjectDirs::from("dev", "omnirag", "omnirag") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".omnirag").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = config_file {
        if !path.exists() {
            return Err(Box::new(figment::Error::from(format!(
                "configuration file not found: {}",
                path.display()
            ))));
        }
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("OMNIRAG_").split("__"));

    figment.extract().map_err(Box::new)
}

/// Check whether any user-level or workspace-level config file exists.
pub fn config_exists(workspace: Option<&Path>) -> bool {
    if let Some(config_dir) = directories::ProjectDirs::from("dev", "omnirag", "omnirag")
        && config_dir.config_dir().join("config.toml").exists()
    {
        return true;
    }
    workspace.is_some_and(|ws| ws.join(".omnirag").join("config.toml").exists())
}
