//! Survey job handlers

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::handlers::search::HistoryQuery;
use crate::AppState;
use surveyforge_common::{
    auth::AuthContext,
    db::models::SurveyJob,
    errors::{AppError, Result},
};
use surveyforge_survey::service::SurveyProgress;

/// Survey submission request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateSurveyRequest {
    pub search_record_id: Uuid,

    #[validate(length(max = 255))]
    #[serde(default)]
    pub title: Option<String>,

    /// Priority tier, 0 is highest
    #[serde(default)]
    pub priority: usize,
}

/// Survey job view
#[derive(Serialize)]
pub struct SurveyResponse {
    pub id: Uuid,
    pub search_record_id: Uuid,
    pub title: String,
    pub status: String,
    pub progress: f32,
    pub progress_msg: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub content: String,
    pub created_at: chrono::DateTime<chrono::FixedOffset>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<chrono::DateTime<chrono::FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_duration_ms: Option<i64>,
}

impl From<SurveyJob> for SurveyResponse {
    fn from(job: SurveyJob) -> Self {
        Self {
            id: job.id,
            search_record_id: job.search_record_id,
            title: job.title,
            status: job.status,
            progress: job.progress,
            progress_msg: job.progress_msg,
            content: job.content,
            created_at: job.created_at,
            completed_at: job.completed_at,
            process_duration_ms: job.process_duration_ms,
        }
    }
}

/// Survey history entry, without the content body
#[derive(Serialize)]
pub struct SurveyHistoryItem {
    pub id: Uuid,
    pub search_record_id: Uuid,
    pub title: String,
    pub status: String,
    pub created_at: chrono::DateTime<chrono::FixedOffset>,
}

#[derive(Serialize)]
pub struct SurveyHistoryResponse {
    pub total: u64,
    pub records: Vec<SurveyHistoryItem>,
}

/// Document download request
#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_format() -> String {
    "markdown".to_string()
}

/// Submit a survey job over a search record's selected papers
pub async fn create_survey(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<CreateSurveyRequest>,
) -> Result<(StatusCode, Json<SurveyResponse>)> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let job = state
        .service
        .submit_survey(
            auth.tenant_id,
            auth.user_id,
            request.search_record_id,
            request.title,
            request.priority,
        )
        .await?;

    Ok((StatusCode::ACCEPTED, Json(job.into())))
}

/// Fetch a survey job
pub async fn get_survey(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<SurveyResponse>> {
    let job = state
        .service
        .get_survey(id, auth.tenant_id, auth.user_id)
        .await?;
    Ok(Json(job.into()))
}

/// Fetch survey progress
pub async fn get_progress(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<SurveyProgress>> {
    let progress = state
        .service
        .get_progress(id, auth.tenant_id, auth.user_id)
        .await?;
    Ok(Json(progress))
}

/// Cancel a pending or processing survey
pub async fn cancel_survey(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    state
        .service
        .cancel_survey(id, auth.tenant_id, auth.user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Delete a survey job
pub async fn delete_survey(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    state
        .service
        .delete_survey(id, auth.tenant_id, auth.user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Render and download a completed survey document
pub async fn download_survey(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(request): Json<DownloadRequest>,
) -> Result<impl IntoResponse> {
    let (filename, bytes) = state
        .service
        .download_survey(id, auth.tenant_id, auth.user_id, &request.format)
        .await?;

    // Header values must stay ASCII
    let safe_name: String = filename
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
        .collect();

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/markdown; charset=utf-8"),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", safe_name)).map_err(
            |e| AppError::Internal {
                message: format!("Invalid download filename: {}", e),
            },
        )?,
    );

    Ok((headers, bytes))
}

/// Survey history
pub async fn survey_history(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<SurveyHistoryResponse>> {
    let (jobs, total) = state
        .service
        .survey_history(
            auth.tenant_id,
            auth.user_id,
            query.page,
            query.page_size,
            query.keyword.as_deref(),
        )
        .await?;

    let records = jobs
        .into_iter()
        .map(|job| SurveyHistoryItem {
            id: job.id,
            search_record_id: job.search_record_id,
            title: job.title,
            status: job.status,
            created_at: job.created_at,
        })
        .collect();

    Ok(Json(SurveyHistoryResponse { total, records }))
}
