//! Channel-to-module assignments.
//!
//! Core assignments (the `join` command) use the module name `core`.

use super::DbError;
use sqlx::SqlitePool;

pub struct ChannelRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ChannelRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Assign a channel. Returns false if it was already assigned.
    pub async fn assign(&self, channel: &str, module: &str, by: &str) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO channels (channel, module, assigned_by, assigned_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(channel)
        .bind(module)
        .bind(by)
        .bind(chrono::Utc::now().timestamp())
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn unassign(&self, channel: &str, module: &str) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM channels WHERE channel = ? AND module = ?")
            .bind(channel)
            .bind(module)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn for_module(&self, module: &str) -> Result<Vec<String>, DbError> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT channel FROM channels WHERE module = ? ORDER BY channel",
        )
        .bind(module)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Every assigned channel, each once.
    pub async fn all(&self) -> Result<Vec<String>, DbError> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT channel FROM channels ORDER BY channel",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;

    #[tokio::test]
    async fn assign_is_idempotent_per_module() {
        let db = Database::new(":memory:").await.unwrap();
        assert!(db.channels().assign("#ops", "core", "root").await.unwrap());
        assert!(!db.channels().assign("#OPS", "core", "root").await.unwrap());
        assert!(db.channels().assign("#ops", "jail", "root").await.unwrap());
        assert_eq!(db.channels().all().await.unwrap(), vec!["#ops"]);
        assert_eq!(db.channels().for_module("jail").await.unwrap(), vec!["#ops"]);
        assert!(db.channels().unassign("#ops", "core").await.unwrap());
        assert!(!db.channels().unassign("#ops", "core").await.unwrap());
    }
}
