use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use poflow_core::{DocumentStore, ExtractionSource, SemanticService};
use poflow_extraction::{AnthropicService, ExtractionCoordinator, PatternExtractor, SemanticExtractor};
use poflow_intent::{ClassifierConfig, IntentClassifier};
use poflow_reconcile::{AmendmentEngine, ChangeLogProducer, EmailPipeline, Reconciler};
use poflow_store::{InMemoryStore, Neo4jDocumentStore, StoreCustomerDirectory};

mod handlers;
mod routes;
mod state;

use state::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("poflow=info".parse().unwrap()))
        .init();

    let config = poflow_core::AppConfig::from_env();
    let host = config.server_host.clone();
    let port = config.server_port;
    let retry = config.retry_policy();

    let neo4j = Neo4jDocumentStore::new(&config).await;
    let store_connected = neo4j.is_connected();
    let store: Arc<dyn DocumentStore> = if store_connected {
        if let Err(e) = neo4j.ensure_schema().await {
            tracing::warn!(error = %e, "Failed to create Neo4j indexes");
        }
        Arc::new(neo4j)
    } else {
        tracing::warn!("Using the in-process document store; nothing survives a restart");
        Arc::new(InMemoryStore::new())
    };

    let anthropic = AnthropicService::new(&config).expect("Failed to build semantic service client");
    let semantic_configured = anthropic.is_configured();
    if !semantic_configured {
        tracing::warn!("ANTHROPIC_API_KEY not set; semantic fallbacks are disabled");
    }
    let semantic: Arc<dyn SemanticService> = Arc::new(anthropic);

    let mut classifier = IntentClassifier::new(ClassifierConfig::load(store.as_ref()).await);
    let mut change_logs = ChangeLogProducer::new(store.clone());
    let mut amendments = AmendmentEngine::new(store.clone());
    if semantic_configured {
        classifier = classifier.with_semantic(semantic.clone(), retry.clone());
        change_logs = change_logs.with_semantic(semantic.clone(), retry.clone());
        amendments = amendments.with_semantic(semantic.clone(), retry.clone());
    }

    let pattern: Arc<dyn ExtractionSource> = Arc::new(PatternExtractor::default());
    let semantic_source: Arc<dyn ExtractionSource> = Arc::new(SemanticExtractor::new(semantic, retry));
    let customers = Arc::new(StoreCustomerDirectory::new(store.clone()));

    let pipeline = EmailPipeline::new(
        Arc::new(classifier),
        ExtractionCoordinator::new(pattern, semantic_source),
        Reconciler::new(store.clone(), customers),
        change_logs,
        amendments,
    );

    let state = AppState {
        config,
        store,
        store_connected,
        semantic_configured,
        pipeline: Arc::new(pipeline),
    };

    let app = routes::create_router()
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("{host}:{port}");
    tracing::info!("poflow server listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
