//! Domain result operations.
//!
//! Rows are inserted `pending` in discovery order and moved to exactly one
//! terminal status by the verifier. Nothing here deletes rows.

use super::{Database, DomainResult};
use crate::domain::{Candidate, DomainStatus};
use crate::filters;
use anyhow::{bail, Result};

const RESULT_COLUMNS: &str = "id, task_id, name, bl, age_years, status, source_page, found_at";

impl Database {
    /// Persist a freshly scraped candidate as `pending`. The name must pass
    /// format validation.
    pub async fn insert_result(&self, task_id: i64, candidate: &Candidate) -> Result<i64> {
        if !filters::is_valid_format(&candidate.name) {
            bail!("refusing to store malformed domain name {:?}", candidate.name);
        }
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO domain_results (task_id, name, bl, age_years, status, source_page, found_at)
             VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?6)
             RETURNING id",
        )
        .bind(task_id)
        .bind(&candidate.name)
        // SQLite integers are signed; clamp rather than wrap.
        .bind(i64::try_from(candidate.bl).unwrap_or(i64::MAX))
        .bind(i64::from(candidate.age_years))
        .bind(i64::from(candidate.source_page))
        .bind(chrono::Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Move a pending row to its terminal status. Returns false when the row
    /// was already terminal.
    pub async fn update_result_status(&self, result_id: i64, status: DomainStatus) -> Result<bool> {
        let result =
            sqlx::query("UPDATE domain_results SET status = ?1 WHERE id = ?2 AND status = 'pending'")
                .bind(status)
                .bind(result_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Results across all tasks, most recent first.
    pub async fn recent_results(&self, limit: i64) -> Result<Vec<DomainResult>> {
        let rows = sqlx::query_as::<_, DomainResult>(&format!(
            "SELECT {RESULT_COLUMNS} FROM domain_results ORDER BY found_at DESC, id DESC LIMIT ?1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Results of one task in discovery order.
    pub async fn results_for_task(&self, task_id: i64) -> Result<Vec<DomainResult>> {
        let rows = sqlx::query_as::<_, DomainResult>(&format!(
            "SELECT {RESULT_COLUMNS} FROM domain_results WHERE task_id = ?1 ORDER BY id"
        ))
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn count_available(&self, task_id: i64) -> Result<i64> {
        let n: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM domain_results WHERE task_id = ?1 AND status = 'available'",
        )
        .bind(task_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(n)
    }
}
