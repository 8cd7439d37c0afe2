//! Repository pattern for database operations
//!
//! Provides a clean interface for all data access operations. Survey
//! job transitions are expressed as guarded UPDATEs so that a worker
//! can never move a row out of a terminal state: every transition
//! filters on the expected current status and reports via its return
//! value whether it won the write.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::Result;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Knowledge Base Operations
    // ========================================================================

    /// Resolve the knowledge bases a tenant may search: the union of
    /// its own bases and every base marked public. May be empty, which
    /// is a valid terminal state for search ("nothing to retrieve").
    pub async fn accessible_knowledge_bases(&self, tenant_id: Uuid) -> Result<Vec<KnowledgeBase>> {
        KnowledgeBaseEntity::find()
            .filter(
                Condition::any()
                    .add(KnowledgeBaseColumn::TenantId.eq(tenant_id))
                    .add(KnowledgeBaseColumn::Permission.eq("public")),
            )
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Document Operations
    // ========================================================================

    /// Find document metadata by ID
    pub async fn find_document_by_id(&self, id: Uuid) -> Result<Option<Document>> {
        DocumentEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Search Record Operations
    // ========================================================================

    /// Create a search record with empty results
    pub async fn create_search_record(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        query: String,
    ) -> Result<SearchRecord> {
        let now = chrono::Utc::now();

        let record = SearchRecordActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id),
            user_id: Set(user_id),
            query: Set(query),
            keywords: Set(None),
            search_results: Set("[]".to_string()),
            result_count: Set(0),
            created_at: Set(now.into()),
        };

        record.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// Find a search record scoped to its owner. A wrong tenant/user
    /// pair reads as not found.
    pub async fn find_search_record_owned(
        &self,
        id: Uuid,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<SearchRecord>> {
        SearchRecordEntity::find_by_id(id)
            .filter(SearchRecordColumn::TenantId.eq(tenant_id))
            .filter(SearchRecordColumn::UserId.eq(user_id))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Record the extracted keyword bundle (first of the two mutations)
    pub async fn update_search_keywords(&self, id: Uuid, keywords_json: String) -> Result<()> {
        SearchRecordEntity::update_many()
            .col_expr(SearchRecordColumn::Keywords, Expr::value(Some(keywords_json)))
            .filter(SearchRecordColumn::Id.eq(id))
            .exec(self.write_conn())
            .await?;
        Ok(())
    }

    /// Record the ranked paper list (second of the two mutations).
    /// Serializes internally so result_count always equals papers.len().
    pub async fn update_search_results(&self, id: Uuid, papers: &[Paper]) -> Result<()> {
        let results_json = serde_json::to_string(papers)?;

        SearchRecordEntity::update_many()
            .col_expr(SearchRecordColumn::SearchResults, Expr::value(results_json))
            .col_expr(
                SearchRecordColumn::ResultCount,
                Expr::value(papers.len() as i32),
            )
            .filter(SearchRecordColumn::Id.eq(id))
            .exec(self.write_conn())
            .await?;
        Ok(())
    }

    /// List a user's search records, newest first, optionally filtered
    /// by a query substring
    pub async fn list_search_records(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        page: u64,
        page_size: u64,
        keyword: Option<&str>,
    ) -> Result<(Vec<SearchRecord>, u64)> {
        let mut query = SearchRecordEntity::find()
            .filter(SearchRecordColumn::TenantId.eq(tenant_id))
            .filter(SearchRecordColumn::UserId.eq(user_id));

        if let Some(kw) = keyword.filter(|kw| !kw.is_empty()) {
            query = query.filter(SearchRecordColumn::Query.contains(kw));
        }

        let paginator = query
            .order_by_desc(SearchRecordColumn::CreatedAt)
            .paginate(self.read_conn(), page_size);

        let total = paginator.num_items().await?;
        let records = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((records, total))
    }

    // ========================================================================
    // Survey Job Operations
    // ========================================================================

    /// Create a survey job row in pending state with the paper list
    /// frozen at submission time
    pub async fn create_survey_job(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        search_record_id: Uuid,
        title: String,
        papers: &[Paper],
    ) -> Result<SurveyJob> {
        let now = chrono::Utc::now();
        let papers_json = serde_json::to_string(papers)?;

        let job = SurveyJobActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id),
            user_id: Set(user_id),
            search_record_id: Set(search_record_id),
            title: Set(title),
            papers: Set(papers_json),
            content: Set(String::new()),
            status: Set(SurveyStatus::Pending.into()),
            progress: Set(0.0),
            progress_msg: Set("Waiting to be processed".to_string()),
            created_at: Set(now.into()),
            submitted_at: Set(Some(now.into())),
            completed_at: Set(None),
            process_duration_ms: Set(None),
        };

        job.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// Find a survey job by ID (any owner; worker-side lookup)
    pub async fn find_survey_by_id(&self, id: Uuid) -> Result<Option<SurveyJob>> {
        SurveyJobEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Find a survey job scoped to its owner. A wrong tenant/user pair
    /// reads as not found.
    pub async fn find_survey_owned(
        &self,
        id: Uuid,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<SurveyJob>> {
        SurveyJobEntity::find_by_id(id)
            .filter(SurveyJobColumn::TenantId.eq(tenant_id))
            .filter(SurveyJobColumn::UserId.eq(user_id))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Find the survey job submitted from a given search record
    pub async fn find_survey_by_search_record(
        &self,
        search_record_id: Uuid,
    ) -> Result<Option<SurveyJob>> {
        SurveyJobEntity::find()
            .filter(SurveyJobColumn::SearchRecordId.eq(search_record_id))
            .order_by_desc(SurveyJobColumn::CreatedAt)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// pending -> processing. Returns false if the job was no longer
    /// pending (already picked up, or cancelled before pickup).
    pub async fn begin_processing(&self, job_id: Uuid) -> Result<bool> {
        let result = SurveyJobEntity::update_many()
            .col_expr(
                SurveyJobColumn::Status,
                Expr::value(String::from(SurveyStatus::Processing)),
            )
            .col_expr(
                SurveyJobColumn::ProgressMsg,
                Expr::value("Processing started".to_string()),
            )
            .filter(SurveyJobColumn::Id.eq(job_id))
            .filter(SurveyJobColumn::Status.eq(String::from(SurveyStatus::Pending)))
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Advance progress while processing. Returns false when the row is
    /// no longer in processing (cancelled mid-flight), in which case
    /// the caller must stop without further writes.
    pub async fn update_survey_progress(
        &self,
        job_id: Uuid,
        progress: f32,
        progress_msg: String,
    ) -> Result<bool> {
        let result = SurveyJobEntity::update_many()
            .col_expr(SurveyJobColumn::Progress, Expr::value(progress))
            .col_expr(SurveyJobColumn::ProgressMsg, Expr::value(progress_msg))
            .filter(SurveyJobColumn::Id.eq(job_id))
            .filter(SurveyJobColumn::Status.eq(String::from(SurveyStatus::Processing)))
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// processing -> completed, persisting the synthesized content and
    /// the total processing duration. Guarded against cancellation.
    pub async fn complete_survey(
        &self,
        job_id: Uuid,
        content: String,
        duration_ms: i64,
    ) -> Result<bool> {
        let now = chrono::Utc::now();

        let result = SurveyJobEntity::update_many()
            .col_expr(
                SurveyJobColumn::Status,
                Expr::value(String::from(SurveyStatus::Completed)),
            )
            .col_expr(SurveyJobColumn::Content, Expr::value(content))
            .col_expr(SurveyJobColumn::Progress, Expr::value(1.0_f32))
            .col_expr(
                SurveyJobColumn::ProgressMsg,
                Expr::value("Survey completed".to_string()),
            )
            .col_expr(
                SurveyJobColumn::CompletedAt,
                Expr::value(Some(sea_orm::prelude::DateTimeWithTimeZone::from(now))),
            )
            .col_expr(
                SurveyJobColumn::ProcessDurationMs,
                Expr::value(Some(duration_ms)),
            )
            .filter(SurveyJobColumn::Id.eq(job_id))
            .filter(SurveyJobColumn::Status.eq(String::from(SurveyStatus::Processing)))
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Transition to failed. Content is left untouched (empty), so a
    /// failed job never exposes partial synthesis output. No effect on
    /// rows already terminal.
    pub async fn fail_survey(&self, job_id: Uuid, message: String) -> Result<bool> {
        let now = chrono::Utc::now();

        let result = SurveyJobEntity::update_many()
            .col_expr(
                SurveyJobColumn::Status,
                Expr::value(String::from(SurveyStatus::Failed)),
            )
            .col_expr(SurveyJobColumn::ProgressMsg, Expr::value(message))
            .col_expr(
                SurveyJobColumn::CompletedAt,
                Expr::value(Some(sea_orm::prelude::DateTimeWithTimeZone::from(now))),
            )
            .filter(SurveyJobColumn::Id.eq(job_id))
            .filter(
                SurveyJobColumn::Status.is_in([
                    String::from(SurveyStatus::Pending),
                    String::from(SurveyStatus::Processing),
                ]),
            )
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Cancel a pending or processing job: status=cancelled plus the
    /// -1 progress sentinel. Returns false when the job was already
    /// terminal.
    pub async fn cancel_survey(&self, job_id: Uuid) -> Result<bool> {
        let result = SurveyJobEntity::update_many()
            .col_expr(
                SurveyJobColumn::Status,
                Expr::value(String::from(SurveyStatus::Cancelled)),
            )
            .col_expr(SurveyJobColumn::Progress, Expr::value(CANCELLED_PROGRESS))
            .col_expr(
                SurveyJobColumn::ProgressMsg,
                Expr::value("Survey cancelled".to_string()),
            )
            .filter(SurveyJobColumn::Id.eq(job_id))
            .filter(
                SurveyJobColumn::Status.is_in([
                    String::from(SurveyStatus::Pending),
                    String::from(SurveyStatus::Processing),
                ]),
            )
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Delete a survey job row
    pub async fn delete_survey(&self, job_id: Uuid) -> Result<bool> {
        let result = SurveyJobEntity::delete_by_id(job_id)
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// List a user's survey jobs, newest first, optionally filtered by
    /// a title substring
    pub async fn list_surveys(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        page: u64,
        page_size: u64,
        keyword: Option<&str>,
    ) -> Result<(Vec<SurveyJob>, u64)> {
        let mut query = SurveyJobEntity::find()
            .filter(SurveyJobColumn::TenantId.eq(tenant_id))
            .filter(SurveyJobColumn::UserId.eq(user_id));

        if let Some(kw) = keyword.filter(|kw| !kw.is_empty()) {
            query = query.filter(SurveyJobColumn::Title.contains(kw));
        }

        let paginator = query
            .order_by_desc(SurveyJobColumn::CreatedAt)
            .paginate(self.read_conn(), page_size);

        let total = paginator.num_items().await?;
        let jobs = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((jobs, total))
    }

    // ========================================================================
    // Download Record Operations
    // ========================================================================

    /// Append a download audit row
    pub async fn create_download_record(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        survey_job_id: Uuid,
        format: String,
    ) -> Result<DownloadRecord> {
        let now = chrono::Utc::now();

        let record = DownloadRecordActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id),
            user_id: Set(user_id),
            survey_job_id: Set(survey_job_id),
            format: Set(format),
            created_at: Set(now.into()),
        };

        record.insert(self.write_conn()).await.map_err(Into::into)
    }
}
