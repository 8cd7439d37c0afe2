//! Knowledge base entity
//!
//! A knowledge base is a searchable collection of documents. The
//! retrieval scope for a tenant is the union of its own bases and
//! every base marked public.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Knowledge base visibility
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KbPermission {
    Private,
    Public,
}

impl From<String> for KbPermission {
    fn from(s: String) -> Self {
        match s.as_str() {
            "public" => KbPermission::Public,
            _ => KbPermission::Private,
        }
    }
}

impl From<KbPermission> for String {
    fn from(p: KbPermission) -> Self {
        match p {
            KbPermission::Private => "private".to_string(),
            KbPermission::Public => "public".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "knowledge_bases")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub tenant_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub name: String,

    #[sea_orm(column_type = "Text")]
    pub permission: String,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Get the permission as an enum
    pub fn kb_permission(&self) -> KbPermission {
        KbPermission::from(self.permission.clone())
    }

    pub fn is_public(&self) -> bool {
        self.kb_permission() == KbPermission::Public
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

    #[sea_orm(has_many = "super::document::Entity")]
    Documents,
}

impl Related<super::tenant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tenant.def()
    }
}

impl Related<super::document::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Documents.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
