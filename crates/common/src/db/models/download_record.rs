//! Download record entity
//!
//! Write-only audit trail of survey document downloads; never read by
//! the pipeline.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "download_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub tenant_id: Uuid,

    pub user_id: Uuid,

    pub survey_job_id: Uuid,

    /// Requested output format, e.g. "docx"
    #[sea_orm(column_type = "Text")]
    pub format: String,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::survey_job::Entity",
        from = "Column::SurveyJobId",
        to = "super::survey_job::Column::Id"
    )]
    SurveyJob,
}

impl Related<super::survey_job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SurveyJob.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
