//! SQLite-based unified store using `SeaORM`.
//!
//! A single `SqliteStore` implements every zonekeeper repository trait
//! against one local `SQLite` database file.
//!
//! Mutations that carry an audit entry run in one transaction; the audit row
//! is written inside a nested savepoint so a failed audit insert rolls back
//! only itself and the business write still commits.

mod certificate_repo;
mod change_log_repo;
pub(crate) mod entity;
mod migration;
mod provider_repo;
mod record_repo;
mod zone_repo;

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use sea_orm::{Database, DatabaseConnection, DatabaseTransaction, DbErr, SqlErr, TransactionTrait};
use sea_orm_migration::MigratorTrait;

use zonekeeper_core::error::{CoreError, CoreResult};
use zonekeeper_core::types::PageRequest;

use migration::Migrator;

/// SQLite-based store shared by the daemon and its background jobs.
pub struct SqliteStore {
    /// Shared `SeaORM` database connection.
    pub(crate) db: DatabaseConnection,
}

impl SqliteStore {
    /// Open (or create) the database at `db_path` and bring the schema up to date.
    ///
    /// # Errors
    /// Returns `CoreError::StorageError` if directory creation, database
    /// connection, or schema migration fails.
    pub async fn new(db_path: &Path) -> CoreResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CoreError::StorageError(format!("Failed to create directory: {e}")))?;
        }

        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        let db = Database::connect(&db_url)
            .await
            .map_err(|e| CoreError::StorageError(format!("Failed to connect to SQLite: {e}")))?;

        let store = Self { db };

        Migrator::up(&store.db, None)
            .await
            .map_err(|e| CoreError::StorageError(format!("Failed to run migrations: {e}")))?;

        log::info!("SQLite store ready at {}", db_path.display());
        Ok(store)
    }

    pub(crate) async fn begin(&self) -> CoreResult<DatabaseTransaction> {
        self.db.begin().await.map_err(db_err("Failed to begin transaction"))
    }
}

pub(crate) async fn commit(txn: DatabaseTransaction) -> CoreResult<()> {
    txn.commit().await.map_err(db_err("Failed to commit transaction"))
}

// ============ 转换辅助 ============

pub(crate) fn db_err(context: &'static str) -> impl FnOnce(DbErr) -> CoreError {
    move |e| CoreError::StorageError(format!("{context}: {e}"))
}

/// Unique-constraint violations become `Conflict`, everything else a storage error.
pub(crate) fn write_err(
    context: &'static str,
    conflict: impl FnOnce() -> String,
) -> impl FnOnce(DbErr) -> CoreError {
    move |e| match e.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => CoreError::Conflict(conflict()),
        _ => CoreError::StorageError(format!("{context}: {e}")),
    }
}

/// Fixed-width UTC timestamps, so text comparison in SQL orders correctly.
pub(crate) fn fmt_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn fmt_opt_ts(dt: Option<DateTime<Utc>>) -> Option<String> {
    dt.map(fmt_ts)
}

pub(crate) fn parse_ts(s: &str, field: &str) -> CoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CoreError::SerializationError(format!("Invalid {field}: {e}")))
}

pub(crate) fn parse_opt_ts(s: Option<String>, field: &str) -> CoreResult<Option<DateTime<Utc>>> {
    s.map(|s| parse_ts(&s, field)).transpose()
}

pub(crate) fn parse_enum<T: FromStr<Err = String>>(s: &str, field: &str) -> CoreResult<T> {
    s.parse()
        .map_err(|e| CoreError::SerializationError(format!("Invalid {field}: {e}")))
}

pub(crate) fn narrow<S, T>(value: S, field: &str) -> CoreResult<T>
where
    S: Copy + std::fmt::Display,
    T: TryFrom<S>,
{
    T::try_from(value)
        .map_err(|_| CoreError::SerializationError(format!("{field} out of range: {value}")))
}

/// `(offset, limit)` for a normalized page request.
pub(crate) fn page_window(page: PageRequest) -> (u64, u64) {
    let page = page.normalized();
    (page.offset(), page.page_size)
}
