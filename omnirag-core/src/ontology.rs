//! Ontology schema text used to seed structured-query generation.

use std::path::Path;
use tracing::{info, warn};

use crate::error::{ConfigError, RagError};

/// Ontology text, minimised once at load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ontology {
    text: String,
}

impl Ontology {
    pub fn from_text(raw: &str) -> Self {
        Self {
            text: minimize(raw),
        }
    }

    /// Read and minimise an ontology file.
    pub async fn load(path: &Path) -> Result<Self, RagError> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RagError::Config(ConfigError::FileNotFound {
                    path: path.to_path_buf(),
                })
            } else {
                RagError::Io(e)
            }
        })?;
        let ontology = Self::from_text(&raw);
        info!(
            path = %path.display(),
            raw_len = raw.len(),
            len = ontology.text.len(),
            "Ontology loaded"
        );
        Ok(ontology)
    }

    /// Load when a path is configured; a missing or unreadable file yields an empty schema.
    pub async fn load_optional(path: Option<&Path>) -> Self {
        match path {
            Some(p) => Self::load(p).await.unwrap_or_else(|e| {
                warn!(error = %e, "Ontology unavailable; generating queries without a schema");
                Self::default()
            }),
            None => Self::default(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Drop blank lines and whole-line comments, and trim indentation.
///
/// Handles both XML comments (`<!-- ... -->`, possibly spanning lines) and
/// Turtle `#` comments.
pub fn minimize(raw: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut in_xml_comment = false;
    for line in raw.lines() {
        let line = line.trim();
        if in_xml_comment {
            if line.contains("-->") {
                in_xml_comment = false;
            }
            continue;
        }
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.starts_with("<!--") {
            if !line.contains("-->") {
                in_xml_comment = true;
            }
            continue;
        }
        out.push(line);
    }
    out.join("\n")
}
