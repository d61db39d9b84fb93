//! Database module

mod schema;

pub mod attacks;
pub mod audit;

pub use attacks::{AttackRecord, HourlyBucket, NewAttack, ThreatTotals};
pub use audit::{AuditLogEntry, AuditQuery, AuditStats, AuditStatus, NewAuditEntry};

use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite, SqlitePool};

use crate::config::DatabaseConfig;
use crate::error::AppError;

/// A user as known to the system of record. Roles live here, not in the
/// hosted identity provider, and are re-read on every privileged call.
#[derive(Debug, Clone, serde::Serialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub role: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Project {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub url: Option<String>,
    pub featured: bool,
}

#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub async fn new(config: &DatabaseConfig) -> Result<Self, AppError> {
        let pool = SqlitePool::connect(&format!("sqlite:{}?mode=rwc", config.url)).await?;
        Ok(Self { pool })
    }

    /// In-memory database for tests. Pinned to a single connection: every
    /// pooled connection to `:memory:` would otherwise get its own empty
    /// database.
    pub async fn in_memory() -> Result<Self, AppError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    pub(crate) fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<(), AppError> {
        // WAL mode for concurrent readers while the ingress path writes
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&self.pool)
            .await?;
        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&self.pool)
            .await?;

        sqlx::query(schema::CREATE_ATTACKS_TABLE)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_AUDIT_LOGS_TABLE)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_USERS_TABLE)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_PROJECTS_TABLE)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_INDEX_ATTACKS_TS)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_INDEX_ATTACKS_IP)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_INDEX_AUDIT_CREATED)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_INDEX_AUDIT_ACTION)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_INDEX_AUDIT_USER)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // === users (system of record for authorization) ===

    pub async fn find_user_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        let row: Option<(String, String, Option<String>, String)> = sqlx::query_as(
            "SELECT id, email, name, role FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, email, name, role)| User { id, email, name, role }))
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let row: Option<(String, String, Option<String>, String)> = sqlx::query_as(
            "SELECT id, email, name, role FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, email, name, role)| User { id, email, name, role }))
    }

    pub async fn upsert_user(&self, id: &str, email: &str, role: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, role, created_at) VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET email = excluded.email, role = excluded.role
            "#,
        )
        .bind(id)
        .bind(email)
        .bind(role)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Returns the previous role, or None if no such user exists.
    pub async fn update_user_role(
        &self,
        email: &str,
        role: &str,
    ) -> Result<Option<String>, AppError> {
        let Some(user) = self.find_user_by_email(email).await? else {
            return Ok(None);
        };
        sqlx::query("UPDATE users SET role = ? WHERE email = ?")
            .bind(role)
            .bind(email)
            .execute(&self.pool)
            .await?;
        Ok(Some(user.role))
    }

    // === projects (representative CRUD resource behind audited actions) ===

    pub async fn insert_project(
        &self,
        title: &str,
        description: &str,
        url: Option<&str>,
        featured: bool,
    ) -> Result<i64, AppError> {
        let now = Utc::now().timestamp_millis();
        let result = sqlx::query(
            r#"
            INSERT INTO projects (title, description, url, featured, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(title)
        .bind(description)
        .bind(url)
        .bind(featured as i32)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_project(&self, id: i64) -> Result<Option<Project>, AppError> {
        let row: Option<(i64, String, String, Option<String>, i32)> = sqlx::query_as(
            "SELECT id, title, description, url, featured FROM projects WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, title, description, url, featured)| Project {
            id,
            title,
            description,
            url,
            featured: featured != 0,
        }))
    }

    /// Returns false if no such project exists.
    pub async fn update_project(
        &self,
        id: i64,
        title: &str,
        description: &str,
        url: Option<&str>,
        featured: bool,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE projects SET title = ?, description = ?, url = ?, featured = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(title)
        .bind(description)
        .bind(url)
        .bind(featured as i32)
        .bind(Utc::now().timestamp_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_project(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
