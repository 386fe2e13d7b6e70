//! HTTP server implementation using Axum.

use axum::{
    Router,
    routing::{get, post},
};
use indexchat_agent::Agent;
use indexchat_core::config::IndexChatConfig;
use indexchat_knowledge::FanOutRetriever;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state for the gateway server. Read-only after startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<IndexChatConfig>,
    pub start_time: std::time::Instant,
    pub agent: Arc<Agent>,
    pub retriever: Arc<FanOutRetriever>,
}

impl AppState {
    /// Build the retriever, providers and agent from configuration.
    pub fn from_config(config: IndexChatConfig) -> indexchat_core::Result<Self> {
        let embedders = indexchat_providers::create_embedders(&config)?;
        let retriever = Arc::new(FanOutRetriever::from_config(&config, embedders));
        let agent = Arc::new(Agent::from_config(&config, retriever.clone())?);
        Ok(Self {
            config: Arc::new(config),
            start_time: std::time::Instant::now(),
            agent,
            retriever,
        })
    }

    fn store_exists(&self) -> bool {
        self.retriever.store().exists()
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(super::routes::health_check))
        .route("/api/v1/info", get(super::routes::system_info))
        .route("/api/chat", post(super::routes::chat))
        .route("/api/search", post(super::routes::search))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        .with_state(Arc::new(state))
}

/// Start the HTTP server and serve until the process is stopped.
pub async fn start(config: IndexChatConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let state = AppState::from_config(config)?;

    tracing::info!(
        "Chat model: {} / {} ({} tool(s)); modalities: {:?}",
        state.agent.provider_name(),
        state.agent.model_name(),
        state.agent.tool_count(),
        state.retriever.modalities()
    );
    if !state.store_exists() {
        tracing::warn!(
            "No chunk store at {} yet; answers will have no sources until ingestion runs",
            state.config.index.db_path().display()
        );
    }

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Gateway server listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
