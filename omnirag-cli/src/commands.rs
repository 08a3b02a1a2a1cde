//! CLI subcommand handlers. Each returns the text to print.

use anyhow::Context;
use std::path::Path;
use tracing::info;

use omnirag_core::config::{RagConfig, config_exists, load_config};
use omnirag_core::fusion::FusionResult;

use crate::bootstrap;
use crate::{Commands, ConfigAction, OutputFormat};

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<String> {
    match command {
        Commands::Config { action } => handle_config(action, workspace, config_file),
        Commands::Classify { text } => {
            let config = load(workspace, config_file)?;
            let engine = bootstrap::build_engine(&config).await?;
            let decision = engine.classifier().determine(&text).await;
            Ok(serde_json::to_string_pretty(&decision)?)
        }
        Commands::Query {
            text,
            max_docs,
            strategy,
            format,
        } => {
            let config = load(workspace, config_file)?;
            let engine = bootstrap::build_engine(&config).await?;
            let max_docs = max_docs.unwrap_or(config.retrieval.default_max_docs);
            let result = engine.get_rag_data(&text, max_docs, strategy.as_deref()).await;
            render_result(&result, format)
        }
        Commands::Entities { check, mention } => {
            let config = load(workspace, config_file)?;
            let store = bootstrap::open_store(&config).await?;
            let entities = bootstrap::load_entities(&config, &store).await;

            let mut lines = vec![format!("Known entities: {}", entities.count())];
            if let Some(name) = check {
                lines.push(format!(
                    "{}: {}",
                    name,
                    if entities.is_known(&name) { "known" } else { "unknown" }
                ));
            }
            if let Some(text) = mention {
                let mentions = entities.mentions(&text);
                if mentions.is_empty() {
                    lines.push("No known entities mentioned".to_string());
                }
                for (name, count) in mentions {
                    lines.push(format!("  {} x{}", name, count));
                }
                if let Some(top) = entities.most_frequent_mention(&text) {
                    lines.push(format!("Most frequent: {}", top));
                }
            }
            Ok(lines.join("\n"))
        }
    }
}

fn load(workspace: &Path, config_file: Option<&Path>) -> anyhow::Result<RagConfig> {
    if config_file.is_none() && !config_exists(Some(workspace)) {
        info!("No configuration file found; using defaults and OMNIRAG_ environment variables");
    }
    load_config(Some(workspace), config_file)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))
}

fn handle_config(
    action: ConfigAction,
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<String> {
    match action {
        ConfigAction::Init => {
            let config_dir = workspace.join(".omnirag");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                return Ok(format!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                ));
            }

            let toml_str = toml::to_string_pretty(&RagConfig::default())?;
            std::fs::write(&config_path, &toml_str)
                .with_context(|| format!("Failed to write {}", config_path.display()))?;
            Ok(format!(
                "Created default configuration at: {}",
                config_path.display()
            ))
        }
        ConfigAction::Show => {
            let config = load(workspace, config_file)?;
            Ok(toml::to_string_pretty(&config)?)
        }
        ConfigAction::Validate => {
            let config = load(workspace, config_file)?;
            let warnings = config.validate();
            if warnings.is_empty() {
                Ok("Configuration OK".to_string())
            } else {
                let mut lines = vec![format!("{} warning(s):", warnings.len())];
                lines.extend(warnings.into_iter().map(|w| format!("  - {}", w)));
                Ok(lines.join("\n"))
            }
        }
    }
}

/// Format a retrieval result for the terminal.
pub fn render_result(result: &FusionResult, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(result)?),
        OutputFormat::Prompt => Ok(result.as_system_prompt_text()),
        OutputFormat::Summary => Ok(summary(result)),
    }
}

fn summary(result: &FusionResult) -> String {
    let mut lines = vec![
        format!("Query:      {}", result.user_text),
        format!("Strategies: {}", result.strategy_label()),
    ];
    if let Some(decision) = &result.decision {
        lines.push(format!(
            "Decided by: {}{}",
            decision.decision_method,
            decision
                .matched_entity
                .as_ref()
                .map(|e| format!(" (entity: {})", e))
                .unwrap_or_default()
        ));
    } else if result.strategy_overridden {
        lines.push("Decided by: override".to_string());
    }
    if let Some(entity) = &result.context_label {
        lines.push(format!("Context:    {}", entity));
    }
    if let Some(source) = &result.source_label {
        lines.push(format!("Source:     {}", source));
    }
    if let Some(query) = &result.generated_query {
        lines.push(format!("Query text: {}", query.replace('\n', " ")));
    }
    lines.push(format!(
        "Documents:  {} of max {} ({} ms)",
        result.doc_count, result.max_doc_count, result.elapsed_ms
    ));
    for (idx, doc) in result.documents.iter().enumerate() {
        let title = doc
            .name()
            .map(str::to_string)
            .or_else(|| doc.attributes().values().next().map(|v| v.to_string()))
            .unwrap_or_default();
        lines.push(format!("  {}. [{}] {}", idx + 1, doc.strategy(), title));
    }
    for failure in &result.adapter_failures {
        lines.push(format!("Failed:     {} ({})", failure.strategy, failure.error));
    }
    lines.join("\n")
}
