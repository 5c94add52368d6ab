use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "change_logs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub tenant_id: String,
    pub resource_type: String,
    pub resource_id: String,
    pub action: String,
    /// JSON snapshot
    pub before: Option<String>,
    pub after: Option<String>,
    pub status: String,
    pub description: Option<String>,
    pub actor_id: String,
    pub client_ip: String,
    pub created_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
