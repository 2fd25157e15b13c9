//! Search task operations.
//!
//! ## Lifecycle
//!
//! 1. `create_task` — inserted `pending` when the operator's request is accepted
//! 2. `mark_task_running` — once a browser session is up
//! 3. `increment_found` — after each verified-available result is written
//! 4. `complete_task` / `fail_task` — terminal, applied at most once
//!
//! `complete_task` recomputes `found_count` from the results table inside the
//! same statement, so the stored total always equals the available rows.

use super::{Database, JobStatus, SearchTask};
use anyhow::Result;

const TASK_COLUMNS: &str =
    "id, target_count, found_count, status, error, created_at, finished_at";

impl Database {
    pub async fn create_task(&self, target_count: i64) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO search_tasks (target_count, found_count, status, created_at)
             VALUES (?1, 0, 'pending', ?2)
             RETURNING id",
        )
        .bind(target_count)
        .bind(chrono::Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn mark_task_running(&self, task_id: i64) -> Result<()> {
        sqlx::query("UPDATE search_tasks SET status = 'running' WHERE id = ?1 AND status = 'pending'")
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Bump `found_count` by one. Callers must have written the available
    /// result row first so the count never runs ahead of the rows.
    pub async fn increment_found(&self, task_id: i64) -> Result<()> {
        sqlx::query("UPDATE search_tasks SET found_count = found_count + 1 WHERE id = ?1")
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Finalize a task as completed with `found_count` = available results.
    ///
    /// Returns `None` when the task was already terminal (or unknown).
    pub async fn complete_task(&self, task_id: i64) -> Result<Option<i64>> {
        let found: Option<i64> = sqlx::query_scalar(
            "UPDATE search_tasks
                SET status = 'completed',
                    found_count = (SELECT COUNT(*) FROM domain_results
                                   WHERE task_id = ?1 AND status = 'available'),
                    finished_at = ?2
              WHERE id = ?1 AND status IN ('pending', 'running')
              RETURNING found_count",
        )
        .bind(task_id)
        .bind(chrono::Utc::now())
        .fetch_optional(&self.pool)
        .await?;
        Ok(found)
    }

    /// Finalize a task as failed. Returns false when it was already terminal.
    pub async fn fail_task(&self, task_id: i64, error: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE search_tasks
                SET status = 'failed', error = ?1, finished_at = ?2
              WHERE id = ?3 AND status IN ('pending', 'running')",
        )
        .bind(error)
        .bind(chrono::Utc::now())
        .bind(task_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_task(&self, task_id: i64) -> Result<Option<SearchTask>> {
        let row = sqlx::query_as::<_, SearchTask>(&format!(
            "SELECT {TASK_COLUMNS} FROM search_tasks WHERE id = ?1"
        ))
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Most recent tasks first.
    pub async fn recent_tasks(&self, limit: i64) -> Result<Vec<SearchTask>> {
        let rows = sqlx::query_as::<_, SearchTask>(&format!(
            "SELECT {TASK_COLUMNS} FROM search_tasks ORDER BY created_at DESC, id DESC LIMIT ?1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn latest_task(&self) -> Result<Option<SearchTask>> {
        Ok(self.recent_tasks(1).await?.into_iter().next())
    }

    pub async fn count_tasks_with_status(&self, status: JobStatus) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM search_tasks WHERE status = ?1")
            .bind(status)
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}
