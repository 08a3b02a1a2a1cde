//! Wire the retrieval engine from configuration.

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use omnirag_core::config::RagConfig;
use omnirag_core::documents::DocumentFilter;
use omnirag_core::embeddings::{LocalEmbedder, create_embedder};
use omnirag_core::entities::EntityIndex;
use omnirag_core::fusion::ResultFusionEngine;
use omnirag_core::ontology::Ontology;
use omnirag_core::prompts::SparqlPromptSource;
use omnirag_core::providers::create_provider;
use omnirag_core::sources::vector::VectorSearchSettings;
use omnirag_core::sources::{GraphQuery, HttpGraphService, RecordLookup, SparqlGenerator, VectorSearch};
use omnirag_core::store::{InMemoryRecordStore, RecordStore};
use omnirag_core::strategy::StrategyClassifier;

/// Open the record store described by `config.store`.
///
/// Records without an embedding get one from the local embedder when that is
/// the configured provider, so vector search works on plain snapshots.
pub async fn open_store(config: &RagConfig) -> anyhow::Result<InMemoryRecordStore> {
    let store = match &config.store.documents_path {
        Some(path) => InMemoryRecordStore::load_json_file(path, &config.store)
            .await
            .with_context(|| format!("Failed to open record snapshot {}", path.display()))?,
        None => {
            warn!("No store.documents_path configured; using an empty record store");
            InMemoryRecordStore::new(Vec::new(), &config.store)
        }
    };
    if config.embedding.provider == "local" {
        let embedder = LocalEmbedder::new(config.embedding.dimensions);
        return Ok(store.with_local_embeddings(&embedder, &config.store.embedding_field));
    }
    Ok(store)
}

/// Load the entity index; a failed load leaves it empty and is only logged.
pub async fn load_entities(config: &RagConfig, store: &dyn RecordStore) -> Arc<EntityIndex> {
    let entities = Arc::new(EntityIndex::new(config.entities.clone()));
    if let Err(e) = entities.initialize(store, false).await {
        warn!(error = %e, "Entity index unavailable; rule-based lookups disabled");
    }
    entities
}

/// Build the full engine.
pub async fn build_engine(config: &RagConfig) -> anyhow::Result<ResultFusionEngine> {
    let llm = create_provider(&config.llm).context("Failed to create LLM provider")?;
    let embedder = create_embedder(&config.embedding).context("Failed to create embedder")?;

    let store: Arc<dyn RecordStore> = Arc::new(open_store(config).await?);
    let entities = load_entities(config, store.as_ref()).await;

    let filter = DocumentFilter::from_config(&config.store, &config.retrieval);
    let classifier = StrategyClassifier::new(llm.clone(), entities, &config.retrieval)
        .with_temperature(config.llm.classification_temperature);

    let ontology = Ontology::load_optional(config.graph.ontology_path.as_deref()).await;
    let generator = SparqlGenerator::new(
        llm,
        SparqlPromptSource::new(config.graph.sparql_prompt_path.clone()),
    )
    .with_temperature(config.llm.query_temperature);
    let graph_service =
        HttpGraphService::new(&config.graph).context("Failed to create graph service client")?;

    info!(
        model = %config.llm.model,
        embedder = %embedder.provider_name(),
        graph = %graph_service.endpoint(),
        "Retrieval engine ready"
    );

    let engine = ResultFusionEngine::new(
        classifier,
        Arc::new(RecordLookup::new(store.clone(), filter.clone())),
        Arc::new(VectorSearch::new(
            store,
            embedder,
            VectorSearchSettings::from_config(&config.store, &config.retrieval),
            filter.clone(),
        )),
        Arc::new(
            GraphQuery::new(generator, Arc::new(graph_service), ontology)
                .with_filter(filter.clone()),
        ),
    )
    .with_filter(filter)
    .with_adapter_timeout(config.retrieval.adapter_timeout_secs.map(Duration::from_secs));

    Ok(engine)
}
