//! [tests/mirror/core/claimer_contention_backoff.rs]
//! Certifies `Claimer::claim_with_retry`'s two non-contention paths end
//! to end against a real store, and that the contention predicate it
//! retries on (`DbError::is_contention`) classifies SQLite's typed
//! result codes rather than any string match.

use std::sync::Arc;

use altmount_core::Claimer;
use altmount_db::{DbError, QueueRepository, StoreConfig, StorePool};
use altmount_models::queue::NewQueueEntry;

async fn open_store(dir: &tempfile::TempDir) -> Arc<StorePool> {
    let config = StoreConfig {
        database_path: dir.path().join("altmount.db").to_string_lossy().to_string(),
        worker_count: 2,
    };
    Arc::new(StorePool::connect(&config).await.expect("store should open"))
}

#[tokio::test]
async fn claim_with_retry_returns_the_row_when_one_is_available() {
    let dir = tempfile::tempdir().expect("tempdir");
    let queue = QueueRepository::new(open_store(&dir).await);
    queue
        .enqueue(NewQueueEntry::from_scanner("/watch/ready.nzb", 5))
        .await
        .expect("enqueue should succeed");

    let claimer = Claimer::new(queue);
    let claimed = claimer
        .claim_with_retry()
        .await
        .expect("claim_with_retry should succeed with no contention");
    assert_eq!(claimed.expect("a row").submission_path, "/watch/ready.nzb");
}

#[tokio::test]
async fn claim_with_retry_returns_ok_none_on_an_empty_queue() {
    let dir = tempfile::tempdir().expect("tempdir");
    let queue = QueueRepository::new(open_store(&dir).await);
    let claimer = Claimer::new(queue);

    let claimed = claimer.claim_with_retry().await.expect("empty queue must not error");
    assert!(claimed.is_none());
}

#[test]
fn is_contention_matches_busy_and_locked_codes_only() {
    assert!(DbError::Query(libsql::Error::SqliteFailure(5, "database is locked".to_string())).is_contention());
    assert!(DbError::Query(libsql::Error::SqliteFailure(6, "database table is locked".to_string())).is_contention());
    assert!(!DbError::Query(libsql::Error::SqliteFailure(1, "syntax error".to_string())).is_contention());
    assert!(!DbError::Query(libsql::Error::SqliteFailure(19, "constraint failed".to_string())).is_contention());
}

#[test]
fn is_contention_matches_busy_and_locked_codes_on_begin_or_commit_failure_too() {
    assert!(DbError::Transaction(libsql::Error::SqliteFailure(5, "database is locked".to_string())).is_contention());
    assert!(DbError::Transaction(libsql::Error::SqliteFailure(6, "database table is locked".to_string())).is_contention());
    assert!(!DbError::Transaction(libsql::Error::SqliteFailure(1, "syntax error".to_string())).is_contention());
}

#[test]
fn is_contention_is_false_for_every_non_query_non_transaction_variant() {
    assert!(!DbError::Connection("unreachable".to_string()).is_contention());
    assert!(!DbError::EntryNotFound.is_contention());
}
