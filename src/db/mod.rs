//! # Database — SQLite Session Store
//!
//! Single-file relational store owning every persistent entity of the
//! pipeline, accessed through `sqlx::SqlitePool`.
//!
//! ## Schema
//!
//! - `accounts`: username, password, captured storage state, ban status
//! - `search_tasks`: one row per pipeline run with target/found counts
//! - `domain_results`: candidates discovered by a task and their final status
//!
//! ## Module Structure
//!
//! - [`accounts`] — account seeding, session upload, status transitions
//! - [`jobs`] — search task lifecycle (pending → running → completed/failed)
//! - [`results`] — candidate inserts, status updates, history queries
//!
//! Every method runs one short statement (or one transaction) against the
//! pool; nothing holds a connection across pipeline stages.

mod accounts;
mod jobs;
mod results;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::DomainStatus;
use crate::session::{is_blank_blob, SessionError, StorageState};

const MIGRATIONS: &[&str] = &[include_str!("../../migrations/001_create_tables.sql")];

// ── Account types ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Banned,
    NeedsRelogin,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Banned => "banned",
            AccountStatus::NeedsRelogin => "needs_relogin",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Account {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub email: String,
    pub status: AccountStatus,
    /// Verbatim storage-state JSON, `{}` when no session was captured.
    #[serde(skip_serializing)]
    pub storage_state: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_used: Option<chrono::DateTime<chrono::Utc>>,
}

impl Account {
    /// Account that exists only for one scraper run (explicit credentials).
    pub fn ephemeral(username: &str, password: &str) -> Self {
        Account {
            id: 0,
            username: username.to_string(),
            password: Some(password.to_string()),
            email: String::new(),
            status: AccountStatus::Active,
            storage_state: "{}".to_string(),
            created_at: chrono::Utc::now(),
            last_used: None,
        }
    }

    /// Ephemeral accounts have no row to write back to.
    pub fn is_persisted(&self) -> bool {
        self.id > 0
    }

    pub fn has_session(&self) -> bool {
        !is_blank_blob(&self.storage_state)
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }

    pub fn session_state(&self) -> Result<StorageState, SessionError> {
        StorageState::parse(&self.storage_state)
    }
}

// ── Search task types ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SearchTask {
    pub id: i64,
    pub target_count: i64,
    pub found_count: i64,
    pub status: JobStatus,
    pub error: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

// ── Result types ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DomainResult {
    pub id: i64,
    pub task_id: i64,
    pub name: String,
    pub bl: i64,
    pub age_years: i64,
    pub status: DomainStatus,
    pub source_page: i64,
    pub found_at: chrono::DateTime<chrono::Utc>,
}

// ── Database struct and connection ──────────────────────────────

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if missing) the SQLite file named by `database_url` and
    /// apply the schema.
    ///
    /// `sqlite::memory:` databases get a single pinned connection, since every
    /// new in-memory connection would otherwise see an empty database.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let opts = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        let in_memory = database_url.contains(":memory:");
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 4 })
            .min_connections(if in_memory { 1 } else { 0 })
            .idle_timeout(if in_memory { None } else { Some(Duration::from_secs(600)) })
            .max_lifetime(if in_memory { None } else { Some(Duration::from_secs(1800)) })
            .connect_with(opts)
            .await?;
        let db = Database { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Apply every schema file in order. Statements are idempotent.
    pub async fn migrate(&self) -> Result<()> {
        for sql in MIGRATIONS {
            sqlx::raw_sql(sql).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Execute `SELECT 1`; used by the `/readyz` probe.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}
