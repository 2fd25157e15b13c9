//! Database integration tests against file-backed SQLite.
//!
//! Unit tests inside `src/db/` run on `sqlite::memory:`; these cover what only
//! a real file shows: reopening, concurrent writers through the pool, and
//! schema migration being idempotent.
//!
//! Run with: `cargo test --test db_integration`

mod common;

use common::*;
use dropscout::db::{AccountStatus, Database, JobStatus};
use dropscout::domain::{Candidate, DomainStatus};

#[tokio::test]
async fn data_survives_reopen_and_remigration() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("domains.db").display());

    let blob = r#"{"cookies":[{"name":"ed_session","value":"ключ ✓"}],"origins":[]}"#;
    let task_id = {
        let db = Database::connect(&url).await.unwrap();
        db.upsert_session("scout", blob).await.unwrap();
        let task = db.create_task(4).await.unwrap();
        db.insert_result(task, &Candidate::new("quietlibrary.com", 900, 22, 2))
            .await
            .unwrap();
        db.pool().close().await;
        task
    };

    let db = Database::connect(&url).await.unwrap();
    db.migrate().await.unwrap();
    let account = db.get_account_by_username("scout").await.unwrap().unwrap();
    assert_eq!(account.storage_state, blob);
    let rows = db.results_for_task(task_id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, DomainStatus::Pending);
}

#[tokio::test]
async fn concurrent_verification_updates_keep_counts_consistent() {
    let (db, _dir) = temp_db().await;
    let task = db.create_task(20).await.unwrap();
    db.mark_task_running(task).await.unwrap();

    let mut ids = Vec::new();
    for i in 0..20 {
        let c = Candidate::new(format!("site{}.com", i), 100 - i, 10, 2);
        ids.push(db.insert_result(task, &c).await.unwrap());
    }

    let handles: Vec<_> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| {
            let db = db.clone();
            let id = *id;
            tokio::spawn(async move {
                let status = if i % 2 == 0 {
                    DomainStatus::Available
                } else {
                    DomainStatus::Taken
                };
                db.update_result_status(id, status).await.unwrap();
                if status == DomainStatus::Available {
                    db.increment_found(task).await.unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.await.unwrap();
    }

    assert_eq!(db.complete_task(task).await.unwrap(), Some(10));
    let row = db.get_task(task).await.unwrap().unwrap();
    assert_eq!(row.status, JobStatus::Completed);
    assert_eq!(row.found_count, db.count_available(task).await.unwrap());
}

#[tokio::test]
async fn account_pool_rotates_by_last_use() {
    let (db, _dir) = temp_db().await;
    let first = seed_account(&db, "first").await;
    let second = seed_account(&db, "second").await;
    let banned = seed_account(&db, "third").await;
    db.set_account_status(banned.id, AccountStatus::Banned)
        .await
        .unwrap();

    let pick = db.least_recently_used_account().await.unwrap().unwrap();
    assert_eq!(pick.id, first.id);
    db.save_session(first.id, SESSION_BLOB).await.unwrap();

    let pick = db.least_recently_used_account().await.unwrap().unwrap();
    assert_eq!(pick.id, second.id);
    db.save_session(second.id, SESSION_BLOB).await.unwrap();

    let pick = db.least_recently_used_account().await.unwrap().unwrap();
    assert_eq!(pick.id, first.id);

    assert!(db.reset_account("third").await.unwrap());
    assert!(!db.reset_account("nobody").await.unwrap());
}
