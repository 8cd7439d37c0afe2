//! SurveyForge Common Library
//!
//! Shared code for the SurveyForge services including:
//! - Database models and repository patterns
//! - Survey task queue (SQS) abstraction
//! - Chat-completion client abstraction
//! - Retrieval-engine client abstraction
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod llm;
pub mod metrics;
pub mod queue;
pub mod retrieval;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::Repository;
pub use errors::{AppError, Result};
pub use llm::ChatClient;
pub use retrieval::Retriever;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default number of keywords extracted from a research question
pub const DEFAULT_KEYWORD_COUNT: usize = 5;

/// Default survey title used when the client supplies none
pub const DEFAULT_SURVEY_TITLE: &str = "Literature Survey";
