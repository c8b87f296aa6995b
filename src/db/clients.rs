//! Registered client accounts.

use super::{DbError, is_unique_violation};
use crate::security::{dummy_verify, hash_password, normalize_fingerprint, verify_password};
use sqlx::SqlitePool;

/// A registered account.
#[derive(Debug, Clone)]
pub struct ClientAccount {
    pub id: i64,
    pub account: String,
    pub email: Option<String>,
    pub fingerprint: Option<String>,
    pub registered_at: i64,
    pub last_seen_at: i64,
}

type ClientRow = (i64, String, Option<String>, Option<String>, i64, i64);

fn from_row(row: ClientRow) -> ClientAccount {
    let (id, account, email, fingerprint, registered_at, last_seen_at) = row;
    ClientAccount {
        id,
        account,
        email,
        fingerprint,
        registered_at,
        last_seen_at,
    }
}

pub struct ClientRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ClientRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn register(
        &self,
        account: &str,
        password: &str,
        email: Option<&str>,
    ) -> Result<ClientAccount, DbError> {
        let password_hash = hash_password(password)?;
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO clients (account, password_hash, email, registered_at, last_seen_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(account)
        .bind(&password_hash)
        .bind(email)
        .bind(now)
        .bind(now)
        .execute(self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                return DbError::AccountExists(account.to_string());
            }
            DbError::from(e)
        })?;

        Ok(ClientAccount {
            id: result.last_insert_rowid(),
            account: account.to_string(),
            email: email.map(String::from),
            fingerprint: None,
            registered_at: now,
            last_seen_at: now,
        })
    }

    /// Verify a password and bump `last_seen_at`.
    pub async fn identify(&self, account: &str, password: &str) -> Result<ClientAccount, DbError> {
        let row = sqlx::query_as::<_, (i64, String)>(
            "SELECT id, password_hash FROM clients WHERE account = ? COLLATE NOCASE",
        )
        .bind(account)
        .fetch_optional(self.pool)
        .await?;

        let Some((id, hash)) = row else {
            dummy_verify(password);
            return Err(DbError::AccountNotFound(account.to_string()));
        };
        if !verify_password(password, &hash) {
            return Err(DbError::InvalidPassword);
        }

        sqlx::query("UPDATE clients SET last_seen_at = ? WHERE id = ?")
            .bind(chrono::Utc::now().timestamp())
            .bind(id)
            .execute(self.pool)
            .await?;

        self.find_by_name(account)
            .await?
            .ok_or_else(|| DbError::AccountNotFound(account.to_string()))
    }

    pub async fn find_by_name(&self, account: &str) -> Result<Option<ClientAccount>, DbError> {
        let row = sqlx::query_as::<_, ClientRow>(
            r#"
            SELECT id, account, email, fingerprint, registered_at, last_seen_at
            FROM clients
            WHERE account = ? COLLATE NOCASE
            "#,
        )
        .bind(account)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(from_row))
    }

    pub async fn find_by_fingerprint(&self, fp: &str) -> Result<Option<ClientAccount>, DbError> {
        let fp = normalize_fingerprint(fp);
        if fp.is_empty() {
            return Ok(None);
        }
        let row = sqlx::query_as::<_, ClientRow>(
            r#"
            SELECT id, account, email, fingerprint, registered_at, last_seen_at
            FROM clients
            WHERE fingerprint = ?
            "#,
        )
        .bind(&fp)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(from_row))
    }

    pub async fn set_fingerprint(&self, account: &str, fp: Option<&str>) -> Result<(), DbError> {
        let result =
            sqlx::query("UPDATE clients SET fingerprint = ? WHERE account = ? COLLATE NOCASE")
                .bind(fp.map(normalize_fingerprint))
                .bind(account)
                .execute(self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::AccountNotFound(account.to_string()));
        }
        Ok(())
    }

    pub async fn delete(&self, account: &str) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM clients WHERE account = ? COLLATE NOCASE")
            .bind(account)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count(&self) -> Result<i64, DbError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM clients")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }
}
