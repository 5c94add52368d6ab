//! `SeaORM` entities, one per table.

pub mod certificate;
pub mod certificate_deployment;
pub mod change_log;
pub mod provider;
pub mod record;
pub mod zone;
