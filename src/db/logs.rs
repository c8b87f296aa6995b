//! Audit and command logs.

use super::DbError;
use sqlx::SqlitePool;

/// One audit row.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub created_at: i64,
    pub actor: String,
    pub action: String,
    pub detail: Option<String>,
}

pub struct LogRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> LogRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn audit(&self, actor: &str, action: &str, detail: Option<&str>) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO audit_log (created_at, actor, action, detail) VALUES (?, ?, ?, ?)",
        )
        .bind(chrono::Utc::now().timestamp())
        .bind(actor)
        .bind(action)
        .bind(detail)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Record an executed chat command. Callers mask secrets in `args`.
    pub async fn command(
        &self,
        uid: &str,
        nick: &str,
        level: u8,
        command: &str,
        args: &str,
        target: &str,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO command_log (created_at, uid, nick, level, command, args, target)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(chrono::Utc::now().timestamp())
        .bind(uid)
        .bind(nick)
        .bind(i64::from(level))
        .bind(command)
        .bind(args)
        .bind(target)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Newest audit entries first.
    pub async fn recent_audit(&self, limit: i64) -> Result<Vec<AuditEntry>, DbError> {
        let rows = sqlx::query_as::<_, (i64, String, String, Option<String>)>(
            "SELECT created_at, actor, action, detail FROM audit_log ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(created_at, actor, action, detail)| AuditEntry {
                created_at,
                actor,
                action,
                detail,
            })
            .collect())
    }

    /// Commands logged, as `(nick, command, args)`, newest first.
    pub async fn recent_commands(&self, limit: i64) -> Result<Vec<(String, String, String)>, DbError> {
        let rows = sqlx::query_as::<_, (String, String, Option<String>)>(
            "SELECT nick, command, args FROM command_log ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(n, c, a)| (n, c, a.unwrap_or_default()))
            .collect())
    }
}
