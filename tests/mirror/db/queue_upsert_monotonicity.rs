//! [tests/mirror/db/queue_upsert_monotonicity.rs]
//! Certifies `enqueue`'s UPSERT contract on `submission_path`: priority
//! only ever ratchets down for a non-terminal row, and a terminal row is
//! reset so the work runs again.

use std::sync::Arc;

use altmount_db::{QueueRepository, StoreConfig, StorePool};
use altmount_models::queue::{NewQueueEntry, QueueStatus};

async fn open_store(dir: &tempfile::TempDir) -> Arc<StorePool> {
    let config = StoreConfig {
        database_path: dir.path().join("altmount.db").to_string_lossy().to_string(),
        worker_count: 2,
    };
    Arc::new(StorePool::connect(&config).await.expect("store should open"))
}

#[tokio::test]
async fn repeat_enqueue_of_pending_row_only_lowers_priority() {
    let dir = tempfile::tempdir().expect("tempdir");
    let queue = QueueRepository::new(open_store(&dir).await);

    queue
        .enqueue(NewQueueEntry::from_scanner("/watch/repeat.nzb", 9))
        .await
        .expect("first enqueue should succeed");

    // A worse (higher) priority on the repeat scan must not raise it.
    let id = queue
        .enqueue(NewQueueEntry::from_scanner("/watch/repeat.nzb", 20))
        .await
        .expect("repeat enqueue should succeed");

    let rows = queue
        .list(Default::default(), "created_at", altmount_db::SortDirection::Ascending, altmount_db::Page { limit: 10, offset: 0 })
        .await
        .expect("list should succeed");
    let row = rows.into_iter().find(|r| r.id == id).expect("row should exist");
    assert_eq!(row.priority, 9, "priority must not be raised by a repeat scan");

    // A better (lower) priority on the repeat scan must win.
    queue
        .enqueue(NewQueueEntry::from_scanner("/watch/repeat.nzb", 1))
        .await
        .expect("repeat enqueue should succeed");

    let rows = queue
        .list(Default::default(), "created_at", altmount_db::SortDirection::Ascending, altmount_db::Page { limit: 10, offset: 0 })
        .await
        .expect("list should succeed");
    let row = rows.into_iter().find(|r| r.id == id).expect("row should exist");
    assert_eq!(row.priority, 1, "a strictly more urgent repeat scan should lower priority");
}

#[tokio::test]
async fn repeat_enqueue_of_terminal_row_resets_it_to_pending() {
    let dir = tempfile::tempdir().expect("tempdir");
    let queue = QueueRepository::new(open_store(&dir).await);

    let id = queue
        .enqueue(NewQueueEntry::from_scanner("/watch/done.nzb", 5))
        .await
        .expect("enqueue should succeed");

    queue
        .update_status(id, QueueStatus::Failed, Some("boom"))
        .await
        .expect("status update should succeed");

    queue
        .enqueue(NewQueueEntry::from_scanner("/watch/done.nzb", 5))
        .await
        .expect("repeat enqueue of a terminal row should succeed");

    let claimed = queue.claim_next().await.expect("claim should succeed").expect("row should be reclaimable");
    assert_eq!(claimed.id, id);
    assert_eq!(claimed.retry_count, 0, "retry_count resets on a terminal-row resubmission");
    assert!(claimed.error_message.is_none(), "error_message clears on a terminal-row resubmission");
}
