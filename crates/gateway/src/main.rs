//! SurveyForge API Gateway
//!
//! The entry point for all external API requests.
//! Handles:
//! - Keyword extraction and paper search
//! - Survey job submission, progress, cancellation, download
//! - Histories
//! - Observability (logging, metrics, tracing)

mod handlers;

use axum::{
    routing::{delete, get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use surveyforge_common::{
    config::AppConfig,
    db::DbPool,
    llm::create_chat_client,
    metrics,
    queue::{SurveyQueue, TierConfig},
    retrieval::create_retriever,
    Repository,
};
use surveyforge_survey::SurveyService;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, Level};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub service: SurveyService,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(true)
        .json()
        .init();

    info!(
        "Starting SurveyForge API Gateway v{}",
        surveyforge_common::VERSION
    );

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        tracing::error!(error = %e, "Failed to load configuration");
        e
    })?;
    let config = Arc::new(config);

    // Initialize metrics
    if config.observability.metrics_port > 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
    }
    metrics::register_metrics();

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;
    let repo = Repository::new(db);

    // Initialize chat and retrieval clients
    let chat = create_chat_client(
        &config.llm.provider,
        config.llm.api_key.clone(),
        Some(config.llm.model.clone()),
        config.llm.api_base.clone(),
        config.llm.timeout_secs,
        config.llm.max_retries,
    )?;
    let retriever = create_retriever(
        &config.retrieval.provider,
        config.retrieval.base_url.clone(),
        config.retrieval.timeout_secs,
    )?;

    // Initialize the survey task queue
    let queue = Arc::new(
        SurveyQueue::new(TierConfig {
            tier_urls: config.queue.survey_queue_urls.clone(),
            visibility_timeout: config.queue.visibility_timeout_secs as i32,
            wait_time_seconds: config.queue.poll_timeout_secs as i32,
            max_messages: config.queue.batch_size as i32,
        })
        .await?,
    );

    // Create app state
    let state = AppState {
        config: config.clone(),
        service: SurveyService::new(repo, queue, chat, retriever),
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // API routes
    let api_routes = Router::new()
        // Health endpoints (no auth)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        // Keyword and search endpoints
        .route("/keywords/extract", post(handlers::search::extract_keywords))
        .route("/search", post(handlers::search::search))
        .route(
            "/search/with-keywords",
            post(handlers::search::search_with_keywords),
        )
        // Survey endpoints
        .route("/surveys", post(handlers::surveys::create_survey))
        .route("/surveys/{id}", get(handlers::surveys::get_survey))
        .route("/surveys/{id}", delete(handlers::surveys::delete_survey))
        .route(
            "/surveys/{id}/progress",
            get(handlers::surveys::get_progress),
        )
        .route("/surveys/{id}/cancel", post(handlers::surveys::cancel_survey))
        .route(
            "/surveys/{id}/document",
            post(handlers::surveys::download_survey),
        )
        // History endpoints
        .route("/history/searches", get(handlers::search::search_history))
        .route("/history/surveys", get(handlers::surveys::survey_history));

    // Compose the app
    Router::new()
        .nest("/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
