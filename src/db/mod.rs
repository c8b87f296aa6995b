//! SQLite persistence.
//!
//! [`Database`] owns the pool; each table group is reached through a
//! short-lived repository borrowing it:
//! - [`AdminRepository`]: operator credentials and levels
//! - [`ClientRepository`]: registered client accounts
//! - [`LogRepository`]: audit and command logs
//! - [`ModuleRepository`]: the module registry and per-module settings
//! - [`ChannelRepository`]: channel-to-module assignments

mod admins;
mod channels;
mod clients;
mod logs;
mod modules;

pub use admins::{AdminRecord, AdminRepository};
pub use channels::ChannelRepository;
pub use clients::{ClientAccount, ClientRepository};
pub use logs::{AuditEntry, LogRepository};
pub use modules::ModuleRepository;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Path that selects a private in-memory database.
pub const IN_MEMORY: &str = ":memory:";

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Distinguishes in-memory databases opened by the same process.
static NEXT_MEMORY_DB: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("database failed its integrity check: {0}")]
    Corrupt(String),
    #[error("admin not found: {0}")]
    AdminNotFound(String),
    #[error("admin already exists: {0}")]
    AdminExists(String),
    #[error("account not found: {0}")]
    AccountNotFound(String),
    #[error("account already exists: {0}")]
    AccountExists(String),
    #[error("invalid password")]
    InvalidPassword,
    #[error("password hashing failed: {0}")]
    Hash(String),
}

impl From<argon2::password_hash::Error> for DbError {
    fn from(err: argon2::password_hash::Error) -> Self {
        DbError::Hash(err.to_string())
    }
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open `path` (or a fresh in-memory database for [`IN_MEMORY`]),
    /// apply migrations and check integrity.
    pub async fn new(path: &str) -> Result<Self, DbError> {
        let in_memory = path == IN_MEMORY;
        let (options, max_connections) = if in_memory {
            // A shared-cache name keeps the database alive across pool
            // connections; the counter keeps parallel tests apart.
            let name = format!(
                "file:slsvcd-{}-{}?mode=memory&cache=shared",
                std::process::id(),
                NEXT_MEMORY_DB.fetch_add(1, Ordering::Relaxed)
            );
            (SqliteConnectOptions::new().filename(name).shared_cache(true), 1)
        } else {
            ensure_parent_dir(path);
            let options = SqliteConnectOptions::new()
                .filename(path)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal);
            (options, 5)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .idle_timeout(Some(IDLE_TIMEOUT))
            .connect_with(options.create_if_missing(true).foreign_keys(true))
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        check_integrity(&pool).await?;
        info!(path = %path, "database ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn admins(&self) -> AdminRepository<'_> {
        AdminRepository::new(&self.pool)
    }

    pub fn clients(&self) -> ClientRepository<'_> {
        ClientRepository::new(&self.pool)
    }

    pub fn logs(&self) -> LogRepository<'_> {
        LogRepository::new(&self.pool)
    }

    pub fn modules(&self) -> ModuleRepository<'_> {
        ModuleRepository::new(&self.pool)
    }

    pub fn channels(&self) -> ChannelRepository<'_> {
        ChannelRepository::new(&self.pool)
    }
}

fn ensure_parent_dir(path: &str) {
    let Some(parent) = Path::new(path).parent() else {
        return;
    };
    if parent.as_os_str().is_empty() {
        return;
    }
    if let Err(e) = std::fs::create_dir_all(parent) {
        warn!(dir = %parent.display(), error = %e, "cannot create database directory");
    }
}

async fn check_integrity(pool: &SqlitePool) -> Result<(), DbError> {
    let verdict: String = sqlx::query_scalar("PRAGMA quick_check")
        .fetch_one(pool)
        .await?;
    if verdict == "ok" {
        Ok(())
    } else {
        error!(verdict = %verdict, "database integrity check failed");
        Err(DbError::Corrupt(verdict))
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_databases_are_isolated() {
        let a = Database::new(":memory:").await.unwrap();
        let b = Database::new(":memory:").await.unwrap();
        a.admins().create("root", "pw", 5, None).await.unwrap();
        assert_eq!(a.admins().count().await.unwrap(), 1);
        assert_eq!(b.admins().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("svc.db");
        let path = path.to_str().unwrap();
        {
            let db = Database::new(path).await.unwrap();
            db.modules().mark_loaded("jail", "root", true).await.unwrap();
            db.pool().close().await;
        }
        let db = Database::new(path).await.unwrap();
        assert_eq!(db.modules().defaults().await.unwrap(), vec!["jail"]);
    }
}
