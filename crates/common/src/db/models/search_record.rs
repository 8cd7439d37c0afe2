//! Search record entity and the `Paper` value type
//!
//! One search record per query execution. The retrieval stage mutates
//! the row exactly twice: once after keyword extraction and once after
//! retrieval. `result_count` always equals the length of the stored
//! paper list.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One candidate paper produced by retrieval.
///
/// Not persisted on its own: paper lists are serialized as JSON into
/// `search_records.search_results` and frozen into
/// `survey_jobs.papers` at submission time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    /// Stable identifier, the originating document id
    pub uid: Uuid,

    pub title: String,

    /// Abstract or leading snippet of the best-matching chunk
    #[serde(rename = "abstract")]
    pub abstract_text: String,

    /// Human-readable source label
    pub source: String,

    /// Retrieval similarity in [0.0, 1.0]
    pub similarity: f32,

    /// Originating document
    pub doc_id: Uuid,

    /// Originating knowledge base
    pub kb_id: Uuid,

    /// Full document content, reassembled lazily by the worker
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_content: Option<String>,

    /// Client-side selection flag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "search_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub tenant_id: Uuid,

    pub user_id: Uuid,

    /// Original query text as typed by the user
    #[sea_orm(column_type = "Text")]
    pub query: String,

    /// Extracted keyword bundle as JSON, null until extraction completes
    #[sea_orm(column_type = "Text", nullable)]
    pub keywords: Option<String>,

    /// Ranked paper list, serialized `Vec<Paper>`
    #[sea_orm(column_type = "Text")]
    pub search_results: String,

    pub result_count: i32,

    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    /// Deserialize the stored paper list
    pub fn papers(&self) -> serde_json::Result<Vec<Paper>> {
        serde_json::from_str(&self.search_results)
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

    #[sea_orm(has_many = "super::survey_job::Entity")]
    SurveyJobs,
}

impl Related<super::tenant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tenant.def()
    }
}

impl Related<super::survey_job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SurveyJobs.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paper_roundtrip_skips_empty_optionals() {
        let paper = Paper {
            uid: Uuid::new_v4(),
            title: "Attention Is All You Need".to_string(),
            abstract_text: "We propose the Transformer".to_string(),
            source: "kb".to_string(),
            similarity: 0.91,
            doc_id: Uuid::new_v4(),
            kb_id: Uuid::new_v4(),
            full_content: None,
            selected: Some(true),
        };

        let json = serde_json::to_string(&paper).unwrap();
        assert!(!json.contains("full_content"));
        assert!(json.contains("\"abstract\""));

        let parsed: Paper = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, paper);
    }
}
