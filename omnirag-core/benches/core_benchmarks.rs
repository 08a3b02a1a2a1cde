use criterion::{Criterion, black_box, criterion_group, criterion_main};
use omnirag_core::config::RetrievalConfig;
use omnirag_core::documents::{Attributes, DocumentFilter};
use omnirag_core::embeddings::LocalEmbedder;
use omnirag_core::rrf::{DEFAULT_RRF_K, reciprocal_rank_fusion};
use omnirag_core::store::ScoredRecord;
use omnirag_core::{EntityIndex, MockLlmProvider, StrategyClassifier, normalize_strategy};
use serde_json::{Value, json};
use std::sync::Arc;

fn record(i: usize) -> Attributes {
    match json!({ "id": i.to_string(), "name": format!("lib{}", i) }) {
        Value::Object(map) => map,
        _ => Attributes::new(),
    }
}

fn bench_classification(c: &mut Criterion) {
    let names: Vec<String> = (0..5000).map(|i| format!("lib{}", i)).collect();
    let classifier = StrategyClassifier::new(
        Arc::new(MockLlmProvider::new()),
        Arc::new(EntityIndex::from_names(names)),
        &RetrievalConfig::default(),
    );

    c.bench_function("rule_match_known_entity", |b| {
        b.iter(|| classifier.classify_by_rule(black_box("lookup lib4242")))
    });

    c.bench_function("rule_reject_long_query", |b| {
        b.iter(|| {
            classifier.classify_by_rule(black_box(
                "what are the most popular web frameworks for python",
            ))
        })
    });

    let text = "compare lib1, lib2 and lib3. also lib1 versus lib10 ".repeat(20);
    c.bench_function("most_frequent_mention", |b| {
        b.iter(|| classifier.entities().most_frequent_mention(black_box(&text)))
    });
}

fn bench_normalize(c: &mut Criterion) {
    c.bench_function("normalize_exact", |b| b.iter(|| normalize_strategy(black_box(" Graph "))));
    c.bench_function("normalize_json", |b| {
        b.iter(|| normalize_strategy(black_box(r#"{"data_source": "database"}"#)))
    });
    c.bench_function("normalize_freeform", |b| {
        b.iter(|| {
            normalize_strategy(black_box(
                "I would use the relationship store since this asks about dependencies",
            ))
        })
    });
}

fn bench_rrf(c: &mut Criterion) {
    let vector: Vec<ScoredRecord> = (0..100)
        .map(|i| ScoredRecord {
            attributes: record(i),
            score: 1.0 / (i + 1) as f64,
        })
        .collect();
    let text: Vec<ScoredRecord> = (50..150)
        .rev()
        .map(|i| ScoredRecord {
            attributes: record(i),
            score: i as f64,
        })
        .collect();
    let lists = vec![vector, text];

    c.bench_function("rrf_two_lists_100", |b| {
        b.iter(|| reciprocal_rank_fusion(black_box(&lists), DEFAULT_RRF_K, 10))
    });
}

fn bench_documents(c: &mut Criterion) {
    let embedder = LocalEmbedder::new(1536);
    let filter = DocumentFilter::default();
    let embedding: Vec<Value> = embedder
        .embed_text("a lightweight web framework")
        .into_iter()
        .map(|x| json!(x))
        .collect();
    let doc = match json!({
        "name": "flask",
        "description": "word ".repeat(200),
        "documentation": "line\n".repeat(500),
        "dependency_ids": ["pypi_jinja2", "pypi_werkzeug", "pypi_click"],
        "embedding": embedding,
    }) {
        Value::Object(map) => map,
        _ => Attributes::new(),
    };

    c.bench_function("sanitize_record", |b| b.iter(|| filter.sanitize(black_box(&doc))));
    c.bench_function("local_embed_text", |b| {
        b.iter(|| embedder.embed_text(black_box("fast async web framework for building apis")))
    });
}

criterion_group!(
    benches,
    bench_classification,
    bench_normalize,
    bench_rrf,
    bench_documents,
);
criterion_main!(benches);
