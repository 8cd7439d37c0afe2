//! SurveyForge Worker
//!
//! Processes survey generation tasks from the SQS tier queues:
//! 1. Receives a survey task (priority tiers drained in order)
//! 2. Reassembles paper full text from the retrieval engine
//! 3. Generates per-paper briefs with progress updates
//! 4. Synthesizes the citation-indexed survey
//! 5. Persists the completed survey

mod processor;

use crate::processor::SurveyProcessor;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use surveyforge_common::{
    config::AppConfig,
    db::DbPool,
    llm::create_chat_client,
    metrics::register_metrics,
    queue::{SurveyQueue, SurveyTaskMessage, TierConfig},
    Repository, VERSION,
};
use surveyforge_common::retrieval::create_retriever;
use tracing::{error, info, warn, Level};

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

    info!("Starting SurveyForge Worker v{}", VERSION);

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        tracing::error!(error = %e, "Failed to load configuration");
        e
    })?;
    let config = Arc::new(config);

    // Metrics exporter
    if config.observability.metrics_port > 0 {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        register_metrics();
        info!(port = config.observability.metrics_port, "Metrics exporter listening");
    }

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;
    let repo = Repository::new(db);

    // Initialize chat client
    let chat = create_chat_client(
        &config.llm.provider,
        config.llm.api_key.clone(),
        Some(config.llm.model.clone()),
        config.llm.api_base.clone(),
        config.llm.timeout_secs,
        config.llm.max_retries,
    )?;
    info!(model = %chat.model_name(), "Chat client initialized");

    // Initialize retrieval client
    let retriever = create_retriever(
        &config.retrieval.provider,
        config.retrieval.base_url.clone(),
        config.retrieval.timeout_secs,
    )?;

    // Initialize processor
    let processor = SurveyProcessor::new(repo, chat, retriever);

    // Initialize the tier queues
    if config.queue.survey_queue_urls.is_empty() {
        warn!("No survey queue URLs configured, waiting for shutdown signal...");
        tokio::signal::ctrl_c().await?;
        info!("Survey worker shutting down");
        return Ok(());
    }
    let queue = SurveyQueue::new(TierConfig {
        tier_urls: config.queue.survey_queue_urls.clone(),
        visibility_timeout: config.queue.visibility_timeout_secs as i32,
        wait_time_seconds: config.queue.poll_timeout_secs as i32,
        max_messages: config.queue.batch_size as i32,
    })
    .await?;
    info!(
        tiers = queue.tier_count(),
        "Survey worker ready, starting queue polling..."
    );

    // Circuit breaker state
    let mut consecutive_failures = 0;
    const MAX_FAILURES: u32 = 5;
    const CIRCUIT_BREAK_DURATION: std::time::Duration = std::time::Duration::from_secs(30);

    // Start polling loop
    loop {
        // Circuit breaker check
        if consecutive_failures >= MAX_FAILURES {
            warn!(
                failures = consecutive_failures,
                "Circuit breaker open, pausing..."
            );
            tokio::time::sleep(CIRCUIT_BREAK_DURATION).await;
            consecutive_failures = 0;
            info!("Circuit breaker reset, resuming...");
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            result = queue.receive() => {
                match result {
                    Ok(Some((tier, messages))) => {
                        for message in messages {
                            let task: SurveyTaskMessage = match SurveyQueue::parse_message(&message) {
                                Ok(task) => task,
                                Err(e) => {
                                    // Drop poison messages instead of looping on them
                                    error!(tier, error = %e, "Unparseable task message, deleting");
                                    if let Some(handle) = message.receipt_handle() {
                                        if let Err(e) = queue.delete(tier, handle).await {
                                            error!(error = %e, "Failed to delete message");
                                        }
                                    }
                                    continue;
                                }
                            };

                            info!(
                                job_id = %task.job_id,
                                tier,
                                papers = task.papers.len(),
                                "Received survey task"
                            );

                            match processor.process(&task).await {
                                Ok(outcome) => {
                                    consecutive_failures = 0;
                                    info!(job_id = %task.job_id, ?outcome, "Survey task resolved");
                                    if let Some(handle) = message.receipt_handle() {
                                        if let Err(e) = queue.delete(tier, handle).await {
                                            error!(error = %e, "Failed to delete message");
                                        }
                                    }
                                }
                                Err(e) => {
                                    consecutive_failures += 1;
                                    error!(
                                        job_id = %task.job_id,
                                        error = %e,
                                        failures = consecutive_failures,
                                        "Failed to process survey task"
                                    );
                                    // Message stays in flight for redelivery
                                }
                            }
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        consecutive_failures += 1;
                        error!(error = %e, "Failed to receive messages from queue");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    }
                }
            }
        }
    }

    info!("Survey worker shutting down");
    Ok(())
}
