//! [tests/mirror/db/health_replacement_resolution.rs]
//! Certifies `register_corrupted_file` (external corruption reports graduate
//! straight to the edge of the retry budget) and
//! `resolve_pending_repairs_in_directory` (a fresh library drop implicitly
//! resolves stale repair/corrupted records under the same path).

use std::sync::Arc;

use altmount_db::{HealthRepository, StoreConfig, StorePool};

async fn open_store(dir: &tempfile::TempDir) -> Arc<StorePool> {
    let config = StoreConfig {
        database_path: dir.path().join("altmount.db").to_string_lossy().to_string(),
        worker_count: 2,
    };
    Arc::new(StorePool::connect(&config).await.expect("store should open"))
}

#[tokio::test]
async fn register_corrupted_file_graduates_on_next_observation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let health = HealthRepository::new(open_store(&dir).await);

    health
        .register_corrupted_file("/library/flagged.mkv", None, "checksum mismatch")
        .await
        .expect("register_corrupted_file should succeed");

    let due = health.get_due(10).await.expect("get_due should succeed");
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].retry_count, due[0].max_retries - 1);

    // The very next verification failure must push it past the retry
    // budget and into repair_triggered, not another plain retry.
    let next_check_at = chrono::Utc::now();
    health
        .increment_retry("/library/flagged.mkv", "confirmed corrupt", next_check_at)
        .await
        .expect("increment_retry should succeed");

    let still_due = health.get_due(10).await.expect("get_due should succeed");
    assert_eq!(still_due[0].retry_count, still_due[0].max_retries);
}

#[tokio::test]
async fn register_corrupted_file_is_idempotent_on_repeated_reports() {
    let dir = tempfile::tempdir().expect("tempdir");
    let health = HealthRepository::new(open_store(&dir).await);

    let first_id = health
        .register_corrupted_file("/library/repeat.mkv", None, "first report")
        .await
        .expect("register_corrupted_file should succeed");
    let second_id = health
        .register_corrupted_file("/library/repeat.mkv", None, "second report")
        .await
        .expect("register_corrupted_file should succeed");

    assert_eq!(first_id, second_id, "the same file_path must upsert onto one row");
}

#[tokio::test]
async fn resolve_pending_repairs_in_directory_clears_only_matching_prefix() {
    let dir = tempfile::tempdir().expect("tempdir");
    let health = HealthRepository::new(open_store(&dir).await);

    health
        .add_automatic_check("/library/season-1/ep1.mkv", None, None, chrono::Utc::now(), None)
        .await
        .expect("registration should succeed");
    health
        .set_repair_triggered("/library/season-1/ep1.mkv", "damaged")
        .await
        .expect("set_repair_triggered should succeed");

    health
        .add_automatic_check("/library/season-2/ep1.mkv", None, None, chrono::Utc::now(), None)
        .await
        .expect("registration should succeed");
    health
        .set_repair_triggered("/library/season-2/ep1.mkv", "damaged")
        .await
        .expect("set_repair_triggered should succeed");

    let resolved = health
        .resolve_pending_repairs_in_directory("/library/season-1")
        .await
        .expect("resolve_pending_repairs_in_directory should succeed");
    assert_eq!(resolved, 1, "only the season-1 repair record should resolve");

    // season-1's record is gone entirely; re-registering it must succeed
    // as a fresh insert rather than colliding with a deleted row.
    let reregistered = health
        .add_automatic_check("/library/season-1/ep1.mkv", None, None, chrono::Utc::now(), None)
        .await
        .expect("re-registration after resolution should succeed");
    assert!(reregistered > 0);
}
