//! SeaORM entity models
//!
//! Database entities for the survey pipeline

mod document;
mod download_record;
mod knowledge_base;
mod search_record;
mod survey_job;
mod tenant;

pub use tenant::{
    ActiveModel as TenantActiveModel, Column as TenantColumn, Entity as TenantEntity,
    Model as Tenant,
};

pub use knowledge_base::{
    ActiveModel as KnowledgeBaseActiveModel, Column as KnowledgeBaseColumn,
    Entity as KnowledgeBaseEntity, KbPermission, Model as KnowledgeBase,
};

pub use document::{
    ActiveModel as DocumentActiveModel, Column as DocumentColumn, Entity as DocumentEntity,
    Model as Document,
};

pub use search_record::{
    ActiveModel as SearchRecordActiveModel, Column as SearchRecordColumn,
    Entity as SearchRecordEntity, Model as SearchRecord, Paper,
};

pub use survey_job::{
    ActiveModel as SurveyJobActiveModel, Column as SurveyJobColumn, Entity as SurveyJobEntity,
    Model as SurveyJob, SurveyStatus, CANCELLED_PROGRESS,
};

pub use download_record::{
    ActiveModel as DownloadRecordActiveModel, Column as DownloadRecordColumn,
    Entity as DownloadRecordEntity, Model as DownloadRecord,
};
