//! Survey job entity and its lifecycle state machine
//!
//! A survey job moves along a single forward path with two possible
//! interruptions:
//!
//! ```text
//! pending --pickup--> processing --success--> completed   [terminal]
//! pending/processing --cancel--> cancelled                [terminal]
//! processing --unhandled error--> failed                  [terminal]
//! ```
//!
//! Failed jobs are never retried automatically; clients resubmit.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::search_record::Paper;

/// Progress value written when a job is cancelled
pub const CANCELLED_PROGRESS: f32 = -1.0;

/// Survey job status enum
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurveyStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl SurveyStatus {
    /// Terminal states admit no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SurveyStatus::Completed | SurveyStatus::Failed | SurveyStatus::Cancelled
        )
    }

    /// Cancellation is only honored before the job reaches a terminal state
    pub fn can_cancel(&self) -> bool {
        matches!(self, SurveyStatus::Pending | SurveyStatus::Processing)
    }

    /// Deleting the row is refused while a worker may still write to it
    pub fn can_delete(&self) -> bool {
        !matches!(self, SurveyStatus::Processing)
    }
}

impl From<String> for SurveyStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pending" => SurveyStatus::Pending,
            "processing" => SurveyStatus::Processing,
            "completed" => SurveyStatus::Completed,
            "failed" => SurveyStatus::Failed,
            "cancelled" => SurveyStatus::Cancelled,
            _ => SurveyStatus::Pending,
        }
    }
}

impl From<SurveyStatus> for String {
    fn from(status: SurveyStatus) -> Self {
        match status {
            SurveyStatus::Pending => "pending".to_string(),
            SurveyStatus::Processing => "processing".to_string(),
            SurveyStatus::Completed => "completed".to_string(),
            SurveyStatus::Failed => "failed".to_string(),
            SurveyStatus::Cancelled => "cancelled".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "survey_jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub tenant_id: Uuid,

    pub user_id: Uuid,

    pub search_record_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    /// Paper list frozen at submission, serialized `Vec<Paper>`.
    /// The set analyzed must match the set cited, so this is never
    /// rewritten after submission.
    #[sea_orm(column_type = "Text")]
    pub papers: String,

    /// Synthesized survey content, empty until completed
    #[sea_orm(column_type = "Text")]
    pub content: String,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    /// 0.0..=1.0 while running; -1.0 once cancelled
    #[sea_orm(column_type = "Float")]
    pub progress: f32,

    #[sea_orm(column_type = "Text")]
    pub progress_msg: String,

    pub created_at: DateTimeWithTimeZone,

    pub submitted_at: Option<DateTimeWithTimeZone>,

    pub completed_at: Option<DateTimeWithTimeZone>,

    /// Total worker-side processing time
    pub process_duration_ms: Option<i64>,
}

impl Model {
    /// Get the job status as an enum
    pub fn survey_status(&self) -> SurveyStatus {
        SurveyStatus::from(self.status.clone())
    }

    /// Deserialize the frozen paper list
    pub fn paper_list(&self) -> serde_json::Result<Vec<Paper>> {
        serde_json::from_str(&self.papers)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::tenant::Entity",
        from = "Column::TenantId",
        to = "super::tenant::Column::Id"
    )]
    Tenant,

    #[sea_orm(
        belongs_to = "super::search_record::Entity",
        from = "Column::SearchRecordId",
        to = "super::search_record::Column::Id"
    )]
    SearchRecord,
}

impl Related<super::tenant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tenant.def()
    }
}

impl Related<super::search_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SearchRecord.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!SurveyStatus::Pending.is_terminal());
        assert!(!SurveyStatus::Processing.is_terminal());
        assert!(SurveyStatus::Completed.is_terminal());
        assert!(SurveyStatus::Failed.is_terminal());
        assert!(SurveyStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_cancel_only_before_terminal() {
        assert!(SurveyStatus::Pending.can_cancel());
        assert!(SurveyStatus::Processing.can_cancel());
        assert!(!SurveyStatus::Completed.can_cancel());
        assert!(!SurveyStatus::Failed.can_cancel());
        assert!(!SurveyStatus::Cancelled.can_cancel());
    }

    #[test]
    fn test_delete_refused_while_processing() {
        assert!(SurveyStatus::Pending.can_delete());
        assert!(!SurveyStatus::Processing.can_delete());
        assert!(SurveyStatus::Cancelled.can_delete());
    }

    #[test]
    fn test_status_string_roundtrip() {
        for status in [
            SurveyStatus::Pending,
            SurveyStatus::Processing,
            SurveyStatus::Completed,
            SurveyStatus::Failed,
            SurveyStatus::Cancelled,
        ] {
            let s: String = status.into();
            assert_eq!(SurveyStatus::from(s), status);
        }
    }

    #[test]
    fn test_unknown_status_defaults_to_pending() {
        assert_eq!(SurveyStatus::from("bogus".to_string()), SurveyStatus::Pending);
    }
}
