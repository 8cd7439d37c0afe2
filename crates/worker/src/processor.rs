//! Survey job processing
//!
//! Runs the generation pipeline for one queued task: full-content
//! retrieval, per-paper briefs with progress updates, synthesis, and
//! the final completed write. Cancellation is polled at every stage
//! boundary; once the persisted status leaves processing no further
//! write lands.

use std::sync::Arc;
use std::time::Instant;
use surveyforge_common::db::models::{Paper, SurveyStatus};
use surveyforge_common::llm::ChatClient;
use surveyforge_common::metrics::{record_queue_message, record_survey_finished};
use surveyforge_common::queue::SurveyTaskMessage;
use surveyforge_common::retrieval::Retriever;
use surveyforge_common::{AppError, Repository, Result};
use surveyforge_survey::summary::{fetch_full_content, generate_brief, PaperBrief};
use surveyforge_survey::synthesis::synthesize;
use tracing::{info, warn};
use uuid::Uuid;

/// Progress after `completed` of `total` briefs
pub fn progress_fraction(completed: usize, total: usize) -> f32 {
    if total == 0 {
        return 0.0;
    }
    completed as f32 / total as f32
}

/// What became of a received task
#[derive(Debug, PartialEq, Eq)]
pub enum ProcessOutcome {
    Completed,
    Cancelled,
    Failed,
    /// Row missing or already terminal, nothing to do
    Discarded,
}

/// Survey task processor
pub struct SurveyProcessor {
    repo: Repository,
    chat: Arc<dyn ChatClient>,
    retriever: Arc<dyn Retriever>,
}

impl SurveyProcessor {
    pub fn new(repo: Repository, chat: Arc<dyn ChatClient>, retriever: Arc<dyn Retriever>) -> Self {
        Self {
            repo,
            chat,
            retriever,
        }
    }

    /// Process one task. Pipeline errors fail the job row and resolve
    /// the message; only infrastructure errors (the database being
    /// unreachable) propagate so the message is redelivered.
    pub async fn process(&self, task: &SurveyTaskMessage) -> Result<ProcessOutcome> {
        let Some(job) = self.repo.find_survey_by_id(task.job_id).await? else {
            warn!(job_id = %task.job_id, "Survey row missing, discarding task");
            record_queue_message("discarded");
            return Ok(ProcessOutcome::Discarded);
        };

        if job.survey_status().is_terminal() {
            info!(job_id = %task.job_id, status = %job.status, "Survey already terminal, discarding task");
            record_queue_message("discarded");
            return Ok(ProcessOutcome::Discarded);
        }

        if !self.repo.begin_processing(task.job_id).await? {
            // Lost the pickup race or cancelled before pickup
            info!(job_id = %task.job_id, "Survey not pending anymore, discarding task");
            record_queue_message("discarded");
            return Ok(ProcessOutcome::Discarded);
        }

        let started = Instant::now();
        match self.run_pipeline(task).await {
            Ok(Some(content)) => {
                let duration_ms = started.elapsed().as_millis() as i64;
                if self
                    .repo
                    .complete_survey(task.job_id, content, duration_ms)
                    .await?
                {
                    info!(job_id = %task.job_id, duration_ms, "Survey completed");
                    record_survey_finished("completed", duration_ms as f64 / 1000.0);
                    record_queue_message("completed");
                    Ok(ProcessOutcome::Completed)
                } else {
                    info!(job_id = %task.job_id, "Survey cancelled during synthesis");
                    record_survey_finished("cancelled", 0.0);
                    record_queue_message("cancelled");
                    Ok(ProcessOutcome::Cancelled)
                }
            }
            Ok(None) => {
                info!(job_id = %task.job_id, "Survey cancelled mid-pipeline");
                record_survey_finished("cancelled", 0.0);
                record_queue_message("cancelled");
                Ok(ProcessOutcome::Cancelled)
            }
            Err(e) => match e {
                AppError::Database(_) | AppError::DatabaseConnection { .. } => Err(e),
                e => {
                    warn!(job_id = %task.job_id, error = %e, "Survey pipeline failed");
                    self.repo.fail_survey(task.job_id, e.to_string()).await?;
                    record_survey_finished("failed", 0.0);
                    record_queue_message("failed");
                    Ok(ProcessOutcome::Failed)
                }
            },
        }
    }

    /// Run the pipeline. `Ok(None)` means cancellation was observed
    /// and processing stopped without further writes.
    async fn run_pipeline(&self, task: &SurveyTaskMessage) -> Result<Option<String>> {
        if self.is_cancelled(task.job_id).await? {
            return Ok(None);
        }

        // Reassemble full text for papers that arrived without it
        let mut papers: Vec<Paper> = Vec::with_capacity(task.papers.len());
        for paper in &task.papers {
            let mut paper = paper.clone();
            if paper.full_content.as_deref().unwrap_or("").is_empty() {
                paper.full_content = fetch_full_content(&self.retriever, &paper).await;
            }
            papers.push(paper);
        }

        let total = papers.len();
        let mut briefs: Vec<PaperBrief> = Vec::with_capacity(total);
        for (i, paper) in papers.iter().enumerate() {
            if self.is_cancelled(task.job_id).await? {
                return Ok(None);
            }

            info!(job_id = %task.job_id, paper = i + 1, total, title = %paper.title, "Generating brief");
            briefs.push(generate_brief(&self.chat, paper).await);

            let msg = format!("Summarized {}/{}: {}", i + 1, total, paper.title);
            if !self
                .repo
                .update_survey_progress(task.job_id, progress_fraction(i + 1, total), msg)
                .await?
            {
                // Status left processing underneath us
                return Ok(None);
            }
        }

        if self.is_cancelled(task.job_id).await? {
            return Ok(None);
        }

        let content = synthesize(&self.chat, &briefs).await?;
        Ok(Some(content))
    }

    async fn is_cancelled(&self, job_id: Uuid) -> Result<bool> {
        let status = self
            .repo
            .find_survey_by_id(job_id)
            .await?
            .map(|job| job.survey_status());
        Ok(!matches!(status, Some(SurveyStatus::Processing)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_fraction() {
        assert_eq!(progress_fraction(0, 4), 0.0);
        assert_eq!(progress_fraction(1, 4), 0.25);
        assert_eq!(progress_fraction(4, 4), 1.0);
    }

    #[test]
    fn test_progress_fraction_empty_total() {
        assert_eq!(progress_fraction(0, 0), 0.0);
    }

    #[test]
    fn test_progress_is_monotone() {
        let total = 7;
        let mut last = 0.0;
        for completed in 1..=total {
            let p = progress_fraction(completed, total);
            assert!(p > last);
            last = p;
        }
        assert_eq!(last, 1.0);
    }
}
