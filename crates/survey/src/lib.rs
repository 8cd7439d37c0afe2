//! SurveyForge Survey Pipeline
//!
//! The stages that turn a research question into a citation-indexed
//! literature survey:
//! - Keyword extraction from the question
//! - Paper search over accessible knowledge bases
//! - Per-paper content briefs
//! - Survey synthesis with inline citation tokens
//! - Document rendering with a resolved reference list
//!
//! Stage orchestration lives in [`service`] (submission side) and in
//! the worker binary (processing side).

pub mod docgen;
pub mod keywords;
pub mod search;
pub mod service;
pub mod summary;
pub mod synthesis;

pub use keywords::{extract_keywords, KeywordBundle};
pub use search::search_papers;
pub use service::SurveyService;
