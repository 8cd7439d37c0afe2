//! Survey service
//!
//! The submission-side orchestration: search records, survey job
//! creation and enqueueing, owner-scoped reads, cancellation,
//! deletion, document downloads, and histories. The processing side
//! lives in the worker binary.

use crate::docgen::render_survey;
use crate::keywords::{extract_keywords, KeywordBundle};
use crate::search::{search_papers, search_papers_with_keywords, SearchOutcome};
use std::sync::Arc;
use surveyforge_common::db::models::{Paper, SearchRecord, SurveyJob, SurveyStatus};
use surveyforge_common::llm::ChatClient;
use surveyforge_common::metrics::record_survey_submitted;
use surveyforge_common::queue::{SurveyQueue, SurveyTaskMessage};
use surveyforge_common::retrieval::Retriever;
use surveyforge_common::{AppError, Repository, Result, DEFAULT_SURVEY_TITLE};
use tracing::{error, info};
use uuid::Uuid;

/// One search-history entry, with the linked survey when one exists
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchHistoryEntry {
    pub id: Uuid,
    pub query: String,
    pub result_count: i32,
    pub created_at: chrono::DateTime<chrono::FixedOffset>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub survey_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub survey_status: Option<String>,
}

/// Progress snapshot of a survey job
#[derive(Debug, Clone, serde::Serialize)]
pub struct SurveyProgress {
    pub id: Uuid,
    pub status: String,
    pub progress: f32,
    pub progress_msg: String,
}

/// Submission-side survey operations
#[derive(Clone)]
pub struct SurveyService {
    repo: Repository,
    queue: Arc<SurveyQueue>,
    chat: Arc<dyn ChatClient>,
    retriever: Arc<dyn Retriever>,
}

impl SurveyService {
    pub fn new(
        repo: Repository,
        queue: Arc<SurveyQueue>,
        chat: Arc<dyn ChatClient>,
        retriever: Arc<dyn Retriever>,
    ) -> Self {
        Self {
            repo,
            queue,
            chat,
            retriever,
        }
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    /// Extract keywords without touching any record
    pub async fn extract_keywords(
        &self,
        question: &str,
        keyword_count: usize,
        query_count: Option<usize>,
    ) -> KeywordBundle {
        extract_keywords(&self.chat, question, keyword_count, query_count).await
    }

    /// Create a search record and run the full search pipeline
    pub async fn search(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        query: &str,
        keyword_count: usize,
        query_count: Option<usize>,
    ) -> Result<SearchOutcome> {
        let record = self
            .repo
            .create_search_record(tenant_id, user_id, query.to_string())
            .await?;

        search_papers(
            &self.repo,
            &self.chat,
            &self.retriever,
            record.id,
            query,
            tenant_id,
            keyword_count,
            query_count,
        )
        .await
    }

    /// Re-run retrieval on an existing record with a user-confirmed
    /// query, skipping keyword extraction
    pub async fn search_with_keywords(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        search_record_id: Uuid,
        search_query: &str,
    ) -> Result<Vec<Paper>> {
        self.find_search_record(search_record_id, tenant_id, user_id)
            .await?;

        search_papers_with_keywords(
            &self.repo,
            &self.retriever,
            search_record_id,
            search_query,
            tenant_id,
        )
        .await
    }

    async fn find_search_record(
        &self,
        id: Uuid,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<SearchRecord> {
        self.repo
            .find_search_record_owned(id, tenant_id, user_id)
            .await?
            .ok_or_else(|| AppError::SearchRecordNotFound { id: id.to_string() })
    }

    async fn find_survey(&self, id: Uuid, tenant_id: Uuid, user_id: Uuid) -> Result<SurveyJob> {
        self.repo
            .find_survey_owned(id, tenant_id, user_id)
            .await?
            .ok_or_else(|| AppError::SurveyNotFound { id: id.to_string() })
    }

    /// Submit a survey job over the selected papers of a search
    /// record. The paper list is frozen into the job row and the queue
    /// message; an enqueue failure fails the row so no pending job is
    /// ever orphaned.
    pub async fn submit_survey(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        search_record_id: Uuid,
        title: Option<String>,
        priority: usize,
    ) -> Result<SurveyJob> {
        let record = self
            .find_search_record(search_record_id, tenant_id, user_id)
            .await?;

        let papers: Vec<Paper> = record
            .papers()?
            .into_iter()
            .filter(|p| p.selected.unwrap_or(true))
            .collect();
        if papers.is_empty() {
            return Err(AppError::Validation {
                message: "No selected papers to survey".to_string(),
                field: Some("search_record_id".to_string()),
            });
        }

        let title = title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SURVEY_TITLE.to_string());

        let job = self
            .repo
            .create_survey_job(tenant_id, user_id, search_record_id, title, &papers)
            .await?;

        let message = SurveyTaskMessage {
            job_id: job.id,
            tenant_id,
            user_id,
            title: job.title.clone(),
            papers,
            priority,
            created_at: chrono::Utc::now(),
        };

        if let Err(e) = self.queue.send(&message, priority).await {
            error!(job_id = %job.id, error = %e, "Survey enqueue failed, failing job");
            self.repo
                .fail_survey(job.id, "Failed to enqueue survey task".to_string())
                .await?;
            return Err(e);
        }

        record_survey_submitted();
        info!(job_id = %job.id, papers = message.papers.len(), priority, "Survey job submitted");

        Ok(job)
    }

    /// Fetch a survey job, owner-scoped
    pub async fn get_survey(&self, id: Uuid, tenant_id: Uuid, user_id: Uuid) -> Result<SurveyJob> {
        self.find_survey(id, tenant_id, user_id).await
    }

    /// Fetch progress of a survey job, owner-scoped
    pub async fn get_progress(
        &self,
        id: Uuid,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<SurveyProgress> {
        let job = self.find_survey(id, tenant_id, user_id).await?;
        Ok(SurveyProgress {
            id: job.id,
            status: job.status,
            progress: job.progress,
            progress_msg: job.progress_msg,
        })
    }

    /// Cancel a pending or processing survey job
    pub async fn cancel_survey(&self, id: Uuid, tenant_id: Uuid, user_id: Uuid) -> Result<()> {
        let job = self.find_survey(id, tenant_id, user_id).await?;
        if !job.survey_status().can_cancel() {
            return Err(AppError::InvalidJobState {
                id: id.to_string(),
                status: job.status,
                message: "Only pending or processing surveys can be cancelled".to_string(),
            });
        }

        // The guarded update loses to a worker that finished first
        if !self.repo.cancel_survey(id).await? {
            let current = self.find_survey(id, tenant_id, user_id).await?;
            return Err(AppError::InvalidJobState {
                id: id.to_string(),
                status: current.status,
                message: "Survey reached a terminal state before cancellation".to_string(),
            });
        }

        info!(job_id = %id, "Survey job cancelled");
        Ok(())
    }

    /// Delete a survey job. Refused while processing.
    pub async fn delete_survey(&self, id: Uuid, tenant_id: Uuid, user_id: Uuid) -> Result<()> {
        let job = self.find_survey(id, tenant_id, user_id).await?;
        if !job.survey_status().can_delete() {
            return Err(AppError::InvalidJobState {
                id: id.to_string(),
                status: job.status,
                message: "Cancel the survey before deleting it".to_string(),
            });
        }

        self.repo.delete_survey(id).await?;
        info!(job_id = %id, "Survey job deleted");
        Ok(())
    }

    /// Render a completed survey for download and record the download
    pub async fn download_survey(
        &self,
        id: Uuid,
        tenant_id: Uuid,
        user_id: Uuid,
        format: &str,
    ) -> Result<(String, Vec<u8>)> {
        let job = self.find_survey(id, tenant_id, user_id).await?;
        if job.survey_status() != SurveyStatus::Completed {
            return Err(AppError::InvalidJobState {
                id: id.to_string(),
                status: job.status,
                message: "Only completed surveys can be downloaded".to_string(),
            });
        }

        let papers = job.paper_list()?;
        let bytes = render_survey(&job.content, &job.title, &papers);

        self.repo
            .create_download_record(tenant_id, user_id, id, format.to_string())
            .await?;

        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        let filename = format!("{}_{}.md", job.title, timestamp);

        Ok((filename, bytes))
    }

    /// Search history with linked survey status per record
    pub async fn search_history(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        page: u64,
        page_size: u64,
        keyword: Option<&str>,
    ) -> Result<(Vec<SearchHistoryEntry>, u64)> {
        let (records, total) = self
            .repo
            .list_search_records(tenant_id, user_id, page, page_size, keyword)
            .await?;

        let mut entries = Vec::with_capacity(records.len());
        for record in records {
            let survey = self.repo.find_survey_by_search_record(record.id).await?;
            entries.push(SearchHistoryEntry {
                id: record.id,
                query: record.query,
                result_count: record.result_count,
                created_at: record.created_at,
                survey_id: survey.as_ref().map(|s| s.id),
                survey_status: survey.map(|s| s.status),
            });
        }

        Ok((entries, total))
    }

    /// Survey history, newest first
    pub async fn survey_history(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        page: u64,
        page_size: u64,
        keyword: Option<&str>,
    ) -> Result<(Vec<SurveyJob>, u64)> {
        self.repo
            .list_surveys(tenant_id, user_id, page, page_size, keyword)
            .await
    }
}
