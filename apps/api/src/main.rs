mod ai;
mod config;
mod db;
mod errors;
mod interview;
mod llm_client;
mod models;
mod report;
mod routes;
mod state;
mod store;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use crate::ai::AiService;
use crate::config::{Config, StoreBackend};
use crate::db::create_pool;
use crate::interview::{InterviewOrchestrator, QueryProjections};
use crate::report::{ReportPipeline, ReportQueue};
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::{InMemorySessionStore, PgSessionStore, SessionStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Interview API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize the session store
    let store: Arc<dyn SessionStore> = match &config.store {
        StoreBackend::Postgres { database_url } => {
            Arc::new(PgSessionStore::new(create_pool(database_url).await?))
        }
        StoreBackend::Memory => {
            warn!("SESSION_STORE=memory: sessions will not survive a restart");
            Arc::new(InMemorySessionStore::new())
        }
    };

    // Initialize the AI provider selected by AI_PROVIDER
    let backend = llm_client::build_backend(&config).context("Failed to build AI client")?;
    let ai = Arc::new(AiService::new(backend));
    info!(
        "AI provider initialized ({:?}, model: {})",
        config.ai_provider, config.ai_model
    );

    // Report generation runs on a bounded worker pool, off the request path
    let pipeline = Arc::new(ReportPipeline::new(store.clone(), ai.clone()));
    let worker_config = &config.report_worker;
    let queue = ReportQueue::start(pipeline, worker_config.workers, worker_config.queue_capacity);
    if worker_config.sweep_enabled {
        queue.spawn_sweep(store.clone(), worker_config.sweep_interval);
    } else {
        info!("Report sweep disabled (ENABLE_REPORT_WORKER=false)");
    }

    // Build app state
    let state = AppState {
        orchestrator: Arc::new(InterviewOrchestrator::new(
            store.clone(),
            ai,
            Arc::new(queue),
        )),
        projections: Arc::new(QueryProjections::new(store)),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
