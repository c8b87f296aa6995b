//! Module registry and per-module configuration.
//!
//! Module configuration is synced against the fields a module declares
//! every time it loads: new fields are persisted with their defaults,
//! fields the module no longer declares are pruned, and the stored values
//! are handed back so operator edits survive reloads.

use super::DbError;
use sqlx::SqlitePool;
use std::collections::BTreeMap;

pub struct ModuleRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ModuleRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a module as loaded.
    pub async fn mark_loaded(&self, name: &str, loaded_by: &str, is_default: bool) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO modules (name, loaded_by, is_default, loaded, updated_at)
            VALUES (?, ?, ?, 1, ?)
            ON CONFLICT(name) DO UPDATE SET
                loaded_by = excluded.loaded_by,
                is_default = excluded.is_default,
                loaded = 1,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(name)
        .bind(loaded_by)
        .bind(is_default)
        .bind(chrono::Utc::now().timestamp())
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Record a module as unloaded. An unloaded module is no longer a
    /// default.
    pub async fn mark_unloaded(&self, name: &str) -> Result<(), DbError> {
        sqlx::query("UPDATE modules SET loaded = 0, is_default = 0, updated_at = ? WHERE name = ?")
            .bind(chrono::Utc::now().timestamp())
            .bind(name)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Modules auto-loaded at end of burst.
    pub async fn defaults(&self) -> Result<Vec<String>, DbError> {
        let names = sqlx::query_scalar::<_, String>(
            "SELECT name FROM modules WHERE is_default = 1 ORDER BY updated_at ASC, name ASC",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(names)
    }

    /// Sync stored configuration against `declared` `(key, default)` pairs
    /// and return the effective values.
    pub async fn sync_config(
        &self,
        module: &str,
        declared: &[(&str, String)],
    ) -> Result<BTreeMap<String, String>, DbError> {
        let mut tx = self.pool.begin().await?;

        for (key, default) in declared {
            sqlx::query("INSERT OR IGNORE INTO module_config (module, key, value) VALUES (?, ?, ?)")
                .bind(module)
                .bind(key)
                .bind(default)
                .execute(&mut *tx)
                .await?;
        }

        let stored = sqlx::query_as::<_, (String, String)>(
            "SELECT key, value FROM module_config WHERE module = ?",
        )
        .bind(module)
        .fetch_all(&mut *tx)
        .await?;

        let mut values = BTreeMap::new();
        for (key, value) in stored {
            if declared.iter().any(|(k, _)| *k == key) {
                values.insert(key, value);
            } else {
                sqlx::query("DELETE FROM module_config WHERE module = ? AND key = ?")
                    .bind(module)
                    .bind(&key)
                    .execute(&mut *tx)
                    .await?;
                tracing::debug!(module = %module, key = %key, "pruned stale module config");
            }
        }

        tx.commit().await?;
        Ok(values)
    }

    /// Update one configuration value. Returns false for an undeclared key.
    pub async fn set_config(&self, module: &str, key: &str, value: &str) -> Result<bool, DbError> {
        let result = sqlx::query("UPDATE module_config SET value = ? WHERE module = ? AND key = ?")
            .bind(value)
            .bind(module)
            .bind(key)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;

    #[tokio::test]
    async fn defaults_follow_load_state() {
        let db = Database::new(":memory:").await.unwrap();
        db.modules().mark_loaded("clone", "root", false).await.unwrap();
        db.modules().mark_loaded("jail", "root", true).await.unwrap();
        assert_eq!(db.modules().defaults().await.unwrap(), vec!["jail"]);
        db.modules().mark_unloaded("jail").await.unwrap();
        assert!(db.modules().defaults().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn config_sync_inserts_prunes_and_pulls() {
        let db = Database::new(":memory:").await.unwrap();
        let v1 = [("threshold", "20".to_string()), ("legacy", "x".to_string())];
        let values = db.modules().sync_config("jail", &v1).await.unwrap();
        assert_eq!(values.get("threshold").map(String::as_str), Some("20"));

        assert!(db.modules().set_config("jail", "threshold", "5").await.unwrap());
        assert!(!db.modules().set_config("jail", "nope", "1").await.unwrap());

        let v2 = [("threshold", "20".to_string()), ("timeout_secs", "600".to_string())];
        let values = db.modules().sync_config("jail", &v2).await.unwrap();
        assert_eq!(values.get("threshold").map(String::as_str), Some("5"));
        assert_eq!(values.get("timeout_secs").map(String::as_str), Some("600"));
        assert!(!values.contains_key("legacy"));
    }
}
