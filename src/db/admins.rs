//! Administrator credential store.
//!
//! Backs password auth, SASL PLAIN/EXTERNAL and the access commands. Names
//! compare case-insensitively.

use super::{DbError, is_unique_violation};
use crate::security::{dummy_verify, hash_password, normalize_fingerprint, verify_password};
use sqlx::SqlitePool;

/// A stored administrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminRecord {
    pub id: i64,
    pub name: String,
    pub level: u8,
    pub fingerprint: Option<String>,
    pub host: Option<String>,
    pub vhost: Option<String>,
    pub language: String,
    pub created_by: Option<String>,
    pub created_at: i64,
}

type AdminRow = (
    i64,
    String,
    i64,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
    Option<String>,
    i64,
);

const COLUMNS: &str =
    "id, name, level, fingerprint, host, vhost, language, created_by, created_at";

fn from_row(row: AdminRow) -> AdminRecord {
    let (id, name, level, fingerprint, host, vhost, language, created_by, created_at) = row;
    AdminRecord {
        id,
        name,
        level: level.clamp(0, 5) as u8,
        fingerprint,
        host,
        vhost,
        language,
        created_by,
        created_at,
    }
}

/// Repository for administrator operations.
pub struct AdminRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AdminRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create an administrator with an Argon2 password hash.
    pub async fn create(
        &self,
        name: &str,
        password: &str,
        level: u8,
        created_by: Option<&str>,
    ) -> Result<AdminRecord, DbError> {
        let password_hash = hash_password(password)?;
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO admins (name, password_hash, level, created_by, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(name)
        .bind(&password_hash)
        .bind(i64::from(level))
        .bind(created_by)
        .bind(now)
        .execute(self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                return DbError::AdminExists(name.to_string());
            }
            DbError::from(e)
        })?;

        Ok(AdminRecord {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            level,
            fingerprint: None,
            host: None,
            vhost: None,
            language: "en".to_string(),
            created_by: created_by.map(String::from),
            created_at: now,
        })
    }

    /// Check a password. Unknown names still pay for a hash verification.
    pub async fn verify(&self, name: &str, password: &str) -> Result<AdminRecord, DbError> {
        let row = sqlx::query_as::<_, (String,)>(
            "SELECT password_hash FROM admins WHERE name = ? COLLATE NOCASE",
        )
        .bind(name)
        .fetch_optional(self.pool)
        .await?;

        let Some((hash,)) = row else {
            dummy_verify(password);
            return Err(DbError::AdminNotFound(name.to_string()));
        };

        if !verify_password(password, &hash) {
            return Err(DbError::InvalidPassword);
        }

        sqlx::query("UPDATE admins SET last_auth_at = ? WHERE name = ? COLLATE NOCASE")
            .bind(chrono::Utc::now().timestamp())
            .bind(name)
            .execute(self.pool)
            .await?;

        self.find_by_name(name)
            .await?
            .ok_or_else(|| DbError::AdminNotFound(name.to_string()))
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<AdminRecord>, DbError> {
        let row = sqlx::query_as::<_, AdminRow>(&format!(
            "SELECT {COLUMNS} FROM admins WHERE name = ? COLLATE NOCASE"
        ))
        .bind(name)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(from_row))
    }

    /// Look up by certificate fingerprint (any hex form).
    pub async fn find_by_fingerprint(&self, fp: &str) -> Result<Option<AdminRecord>, DbError> {
        let fp = normalize_fingerprint(fp);
        if fp.is_empty() {
            return Ok(None);
        }
        let row = sqlx::query_as::<_, AdminRow>(&format!(
            "SELECT {COLUMNS} FROM admins WHERE fingerprint = ?"
        ))
        .bind(&fp)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(from_row))
    }

    pub async fn set_level(&self, name: &str, level: u8) -> Result<(), DbError> {
        self.update(name, "level", i64::from(level).to_string()).await
    }

    pub async fn set_password(&self, name: &str, password: &str) -> Result<(), DbError> {
        let hash = hash_password(password)?;
        self.update(name, "password_hash", hash).await
    }

    /// Bind or clear the certificate fingerprint.
    pub async fn set_fingerprint(&self, name: &str, fp: Option<&str>) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE admins SET fingerprint = ? WHERE name = ? COLLATE NOCASE")
            .bind(fp.map(normalize_fingerprint))
            .bind(name)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::AdminNotFound(name.to_string()));
        }
        Ok(())
    }

    /// Record the host the admin last authenticated from.
    pub async fn set_host(&self, name: &str, host: &str, vhost: &str) -> Result<(), DbError> {
        sqlx::query("UPDATE admins SET host = ?, vhost = ? WHERE name = ? COLLATE NOCASE")
            .bind(host)
            .bind(vhost)
            .bind(name)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Delete an admin. Returns whether a row existed.
    pub async fn delete(&self, name: &str) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM admins WHERE name = ? COLLATE NOCASE")
            .bind(name)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// All admins, highest level first.
    pub async fn list(&self) -> Result<Vec<AdminRecord>, DbError> {
        let rows = sqlx::query_as::<_, AdminRow>(&format!(
            "SELECT {COLUMNS} FROM admins ORDER BY level DESC, name ASC"
        ))
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(from_row).collect())
    }

    pub async fn count(&self) -> Result<i64, DbError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM admins")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }

    // `column` is always one of the literals above, never user input.
    async fn update(&self, name: &str, column: &str, value: String) -> Result<(), DbError> {
        let result = sqlx::query(&format!(
            "UPDATE admins SET {column} = ? WHERE name = ? COLLATE NOCASE"
        ))
        .bind(value)
        .bind(name)
        .execute(self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::AdminNotFound(name.to_string()));
        }
        Ok(())
    }
}
