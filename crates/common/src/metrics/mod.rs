//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with standardized naming conventions
//! for the search and survey pipeline.

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use std::time::Instant;

/// Metrics prefix for all SurveyForge metrics
pub const METRICS_PREFIX: &str = "surveyforge";

/// Histogram buckets for request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.00,
];

/// Buckets for pipeline stages dominated by LLM calls
pub const PIPELINE_BUCKETS: &[f64] = &[
    0.500, 1.000, 2.500, 5.000, 10.00, 30.00, 60.00, 120.0, 300.0, 600.0,
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Search metrics
    describe_counter!(
        format!("{}_searches_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of paper searches"
    );

    describe_histogram!(
        format!("{}_search_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Paper search latency in seconds"
    );

    describe_gauge!(
        format!("{}_search_results_count", METRICS_PREFIX),
        Unit::Count,
        "Number of papers returned from the last search"
    );

    // Keyword extraction metrics
    describe_counter!(
        format!("{}_keyword_fallbacks_total", METRICS_PREFIX),
        Unit::Count,
        "Total keyword extractions that fell back to query tokens"
    );

    // Survey metrics
    describe_counter!(
        format!("{}_surveys_submitted_total", METRICS_PREFIX),
        Unit::Count,
        "Total survey jobs submitted"
    );

    describe_counter!(
        format!("{}_surveys_finished_total", METRICS_PREFIX),
        Unit::Count,
        "Total survey jobs finished, labelled by outcome"
    );

    describe_histogram!(
        format!("{}_survey_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end survey generation latency in seconds"
    );

    // Completion metrics
    describe_counter!(
        format!("{}_completion_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total chat completion API requests"
    );

    describe_counter!(
        format!("{}_completion_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total chat completion API errors"
    );

    // Queue metrics
    describe_counter!(
        format!("{}_queue_messages_processed_total", METRICS_PREFIX),
        Unit::Count,
        "Total queue messages processed"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Helper to record search metrics
pub fn record_search(duration_secs: f64, result_count: usize) {
    counter!(format!("{}_searches_total", METRICS_PREFIX)).increment(1);

    histogram!(format!("{}_search_duration_seconds", METRICS_PREFIX)).record(duration_secs);

    gauge!(format!("{}_search_results_count", METRICS_PREFIX)).set(result_count as f64);
}

/// Record a keyword extraction that had to fall back to query tokens
pub fn record_keyword_fallback() {
    counter!(format!("{}_keyword_fallbacks_total", METRICS_PREFIX)).increment(1);
}

/// Record a survey submission
pub fn record_survey_submitted() {
    counter!(format!("{}_surveys_submitted_total", METRICS_PREFIX)).increment(1);
}

/// Record a finished survey job and its outcome
pub fn record_survey_finished(outcome: &str, duration_secs: f64) {
    counter!(
        format!("{}_surveys_finished_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    if outcome == "completed" {
        histogram!(format!("{}_survey_duration_seconds", METRICS_PREFIX)).record(duration_secs);
    }
}

/// Record a chat completion request and whether it errored
pub fn record_completion(success: bool) {
    counter!(format!("{}_completion_requests_total", METRICS_PREFIX)).increment(1);
    if !success {
        counter!(format!("{}_completion_errors_total", METRICS_PREFIX)).increment(1);
    }
}

/// Record a processed queue message
pub fn record_queue_message(result: &str) {
    counter!(
        format!("{}_queue_messages_processed_total", METRICS_PREFIX),
        "result" => result.to_string()
    )
    .increment(1);
}
