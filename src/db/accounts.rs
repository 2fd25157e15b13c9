//! Account operations.
//!
//! Status only moves away from `active` through detection logic
//! (`set_account_status`); it returns to `active` only through an explicit
//! session upload or `reset_account`.

use super::{Account, AccountStatus, Database};
use anyhow::Result;

const ACCOUNT_COLUMNS: &str =
    "id, username, password, email, status, storage_state, created_at, last_used";

impl Database {
    /// Seed a new account. Fails if the username already exists.
    pub async fn create_account(
        &self,
        username: &str,
        password: Option<&str>,
        email: &str,
    ) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO accounts (username, password, email, status, storage_state, created_at)
             VALUES (?1, ?2, ?3, 'active', '{}', ?4)
             RETURNING id",
        )
        .bind(username)
        .bind(password)
        .bind(email)
        .bind(chrono::Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn get_account(&self, id: i64) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_account_by_username(&self, username: &str) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE username = ?1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// All accounts, oldest first.
    pub async fn list_accounts(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Store an uploaded session, creating the account if it does not exist,
    /// and reset its status to `active`. The blob is stored verbatim.
    pub async fn upsert_session(&self, username: &str, storage_state: &str) -> Result<Account> {
        let row = sqlx::query_as::<_, Account>(&format!(
            "INSERT INTO accounts (username, password, email, status, storage_state, created_at)
             VALUES (?1, '', '', 'active', ?2, ?3)
             ON CONFLICT(username) DO UPDATE
                SET storage_state = excluded.storage_state,
                    status = 'active'
             RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(username)
        .bind(storage_state)
        .bind(chrono::Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    /// Persist a session captured from a live browser and stamp `last_used`.
    pub async fn save_session(&self, account_id: i64, storage_state: &str) -> Result<()> {
        sqlx::query("UPDATE accounts SET storage_state = ?1, last_used = ?2 WHERE id = ?3")
            .bind(storage_state)
            .bind(chrono::Utc::now())
            .bind(account_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_account_status(&self, account_id: i64, status: AccountStatus) -> Result<()> {
        sqlx::query("UPDATE accounts SET status = ?1 WHERE id = ?2")
            .bind(status)
            .bind(account_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Manual reset after a ban or expiry. Returns false for unknown usernames.
    pub async fn reset_account(&self, username: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE accounts SET status = 'active' WHERE username = ?1")
            .bind(username)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// The active account used longest ago (never-used accounts first).
    pub async fn least_recently_used_account(&self) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts
             WHERE status = 'active'
             ORDER BY last_used IS NOT NULL, last_used ASC, id ASC
             LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn db() -> Database {
        Database::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn create_and_fetch_account() {
        let db = db().await;
        let id = db
            .create_account("manager_1", Some("pw"), "m1@example.com")
            .await
            .unwrap();
        let acc = db.get_account(id).await.unwrap().unwrap();
        assert_eq!(acc.username, "manager_1");
        assert_eq!(acc.status, AccountStatus::Active);
        assert_eq!(acc.storage_state, "{}");
        assert!(!acc.has_session());
        assert!(acc.last_used.is_none());
    }

    #[tokio::test]
    async fn username_is_unique() {
        let db = db().await;
        db.create_account("manager_1", None, "").await.unwrap();
        assert!(db.create_account("manager_1", None, "").await.is_err());
    }

    #[tokio::test]
    async fn session_blob_round_trips_byte_identical() {
        let db = db().await;
        let blob = r#"{ "cookies": [ {"name":"a","value":"ü  b"} ],   "origins":[] }"#;
        db.upsert_session("manager_1", blob).await.unwrap();
        let acc = db.get_account_by_username("manager_1").await.unwrap().unwrap();
        assert_eq!(acc.storage_state, blob);
    }

    #[tokio::test]
    async fn upload_resets_status_to_active() {
        let db = db().await;
        let acc = db.upsert_session("manager_1", "{}").await.unwrap();
        db.set_account_status(acc.id, AccountStatus::Banned)
            .await
            .unwrap();
        let again = db
            .upsert_session("manager_1", r#"{"cookies":[]}"#)
            .await
            .unwrap();
        assert_eq!(again.id, acc.id);
        assert_eq!(again.status, AccountStatus::Active);
        assert_eq!(again.storage_state, r#"{"cookies":[]}"#);
    }

    #[tokio::test]
    async fn save_session_stamps_last_used() {
        let db = db().await;
        let id = db.create_account("manager_1", None, "").await.unwrap();
        db.save_session(id, r#"{"cookies":[]}"#).await.unwrap();
        let acc = db.get_account(id).await.unwrap().unwrap();
        assert!(acc.last_used.is_some());
        assert_eq!(acc.storage_state, r#"{"cookies":[]}"#);
    }

    #[tokio::test]
    async fn reset_account_reactivates() {
        let db = db().await;
        let id = db.create_account("manager_1", None, "").await.unwrap();
        db.set_account_status(id, AccountStatus::NeedsRelogin)
            .await
            .unwrap();
        assert!(db.reset_account("manager_1").await.unwrap());
        assert!(!db.reset_account("nobody").await.unwrap());
        let acc = db.get_account(id).await.unwrap().unwrap();
        assert_eq!(acc.status, AccountStatus::Active);
    }

    #[tokio::test]
    async fn least_recently_used_prefers_never_used_and_skips_banned() {
        let db = db().await;
        let a = db.create_account("a", None, "").await.unwrap();
        let b = db.create_account("b", None, "").await.unwrap();
        let c = db.create_account("c", None, "").await.unwrap();
        db.save_session(a, "{}").await.unwrap();
        db.set_account_status(b, AccountStatus::Banned).await.unwrap();
        let picked = db.least_recently_used_account().await.unwrap().unwrap();
        assert_eq!(picked.id, c);
        db.save_session(c, "{}").await.unwrap();
        let picked = db.least_recently_used_account().await.unwrap().unwrap();
        assert_eq!(picked.id, a);
    }
}
