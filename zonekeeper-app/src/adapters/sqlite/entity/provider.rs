use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "providers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub provider_type: String,
    /// Sealed credential blob, never plaintext unless written by a legacy install
    pub credentials_enc: String,
    pub rate_limit: i64,
    pub concurrency: i64,
    pub timeout_secs: i64,
    pub is_default: bool,
    pub status: String,
    pub health_status: String,
    pub last_checked_at: Option<String>,
    pub last_latency_ms: Option<i64>,
    pub last_error: Option<String>,
    pub remark: Option<String>,
    pub deleted_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
