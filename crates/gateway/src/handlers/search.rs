//! Keyword extraction and paper search handlers

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use surveyforge_common::{
    auth::AuthContext,
    db::models::Paper,
    errors::{AppError, Result},
    DEFAULT_KEYWORD_COUNT,
};
use surveyforge_survey::keywords::KeywordBundle;
use surveyforge_survey::service::SearchHistoryEntry;

/// Keyword extraction request
#[derive(Debug, Deserialize, Validate)]
pub struct ExtractKeywordsRequest {
    #[validate(length(min = 1, max = 2000))]
    pub question: String,

    #[serde(default = "default_keyword_count")]
    pub keyword_count: usize,

    #[serde(default)]
    pub query_count: Option<usize>,
}

fn default_keyword_count() -> usize {
    DEFAULT_KEYWORD_COUNT
}

#[derive(Serialize)]
pub struct ExtractKeywordsResponse {
    pub keywords: KeywordBundle,
}

/// Search request
#[derive(Debug, Deserialize, Validate)]
pub struct SearchRequest {
    #[validate(length(min = 1, max = 2000))]
    pub query: String,

    #[serde(default = "default_keyword_count")]
    pub keyword_count: usize,

    #[serde(default)]
    pub query_count: Option<usize>,
}

/// Search with a user-confirmed query
#[derive(Debug, Deserialize, Validate)]
pub struct SearchWithKeywordsRequest {
    pub search_record_id: Uuid,

    #[validate(length(min = 1, max = 4000))]
    pub search_query: String,
}

/// Search response
#[derive(Serialize)]
pub struct SearchResponse {
    pub search_record_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<KeywordBundle>,
    pub total_results: usize,
    pub papers: Vec<Paper>,
    pub processing_time_ms: u64,
}

/// History query parameters
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    #[serde(default)]
    pub keyword: Option<String>,
}

fn default_page() -> u64 {
    1
}
fn default_page_size() -> u64 {
    10
}

#[derive(Serialize)]
pub struct SearchHistoryResponse {
    pub total: u64,
    pub records: Vec<SearchHistoryEntry>,
}

/// Extract keywords without creating a search record
pub async fn extract_keywords(
    State(state): State<AppState>,
    _auth: AuthContext,
    Json(request): Json<ExtractKeywordsRequest>,
) -> Result<Json<ExtractKeywordsResponse>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let keywords = state
        .service
        .extract_keywords(&request.question, request.keyword_count, request.query_count)
        .await;

    Ok(Json(ExtractKeywordsResponse { keywords }))
}

/// Run the full search pipeline
pub async fn search(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    let start = Instant::now();

    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let outcome = state
        .service
        .search(
            auth.tenant_id,
            auth.user_id,
            &request.query,
            request.keyword_count,
            request.query_count,
        )
        .await?;

    let processing_time_ms = start.elapsed().as_millis() as u64;

    tracing::info!(
        query = %request.query,
        results = outcome.papers.len(),
        latency_ms = processing_time_ms,
        tenant_id = %auth.tenant_id,
        "Search completed"
    );

    Ok(Json(SearchResponse {
        search_record_id: outcome.search_record_id,
        keywords: Some(outcome.keywords),
        total_results: outcome.papers.len(),
        papers: outcome.papers,
        processing_time_ms,
    }))
}

/// Re-run retrieval with a user-confirmed query
pub async fn search_with_keywords(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<SearchWithKeywordsRequest>,
) -> Result<Json<SearchResponse>> {
    let start = Instant::now();

    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let papers = state
        .service
        .search_with_keywords(
            auth.tenant_id,
            auth.user_id,
            request.search_record_id,
            &request.search_query,
        )
        .await?;

    let processing_time_ms = start.elapsed().as_millis() as u64;

    Ok(Json(SearchResponse {
        search_record_id: request.search_record_id,
        keywords: None,
        total_results: papers.len(),
        papers,
        processing_time_ms,
    }))
}

/// Search history with linked survey status
pub async fn search_history(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<SearchHistoryResponse>> {
    let (records, total) = state
        .service
        .search_history(
            auth.tenant_id,
            auth.user_id,
            query.page,
            query.page_size,
            query.keyword.as_deref(),
        )
        .await?;

    Ok(Json(SearchHistoryResponse { total, records }))
}
