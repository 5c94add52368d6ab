//! `SeaORM` entity for the `certificates` table.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "certificates")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub tenant_id: String,
    pub zone_id: Option<String>,
    pub provider_id: Option<String>,
    pub common_name: String,
    /// JSON array
    pub subject_alt_names: String,
    pub ca_type: String,
    pub status: String,
    pub key_type: String,
    pub challenge_type: String,
    pub email: Option<String>,
    pub certificate_enc: Option<String>,
    pub private_key_enc: Option<String>,
    pub chain_enc: Option<String>,
    pub csr_pem: Option<String>,
    pub serial_number: Option<String>,
    pub fingerprint: Option<String>,
    pub issued_at: Option<String>,
    pub expires_at: Option<String>,
    pub auto_renew: bool,
    pub renew_days: i64,
    pub last_renew_at: Option<String>,
    pub renewed_from: Option<String>,
    pub error_message: Option<String>,
    pub remark: Option<String>,
    pub created_by: String,
    pub updated_by: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
