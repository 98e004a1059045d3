//! [tests/mirror/core/scanner_dedup.rs]
//! Certifies `Scanner::scan_once`'s discovery and dedup behavior: only
//! allowed extensions are picked up, ignore globs are honored, already-
//! materialized paths are skipped via `ImportedFilesIndex`, and a repeat
//! scan of the same file does not enqueue it twice.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use altmount_core::{ImportedFilesIndex, Scanner, ScannerConfig};
use altmount_db::{QueueRepository, StoreConfig, StorePool};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

async fn open_store(dir: &tempfile::TempDir) -> Arc<StorePool> {
    let config = StoreConfig {
        database_path: dir.path().join("altmount.db").to_string_lossy().to_string(),
        worker_count: 2,
    };
    Arc::new(StorePool::connect(&config).await.expect("store should open"))
}

struct StaticImportedIndex {
    already_imported: Mutex<HashSet<String>>,
}

#[async_trait]
impl ImportedFilesIndex for StaticImportedIndex {
    async fn is_already_imported(&self, submission_path: &str) -> bool {
        self.already_imported.lock().await.contains(submission_path)
    }
}

#[tokio::test]
async fn scan_once_enqueues_only_allowed_extensions_outside_ignored_paths() {
    let watch_dir = tempfile::tempdir().expect("tempdir");
    let store_dir = tempfile::tempdir().expect("tempdir");

    std::fs::write(watch_dir.path().join("keep.nzb"), b"nzb contents").expect("write should succeed");
    std::fs::write(watch_dir.path().join("skip.txt"), b"not an nzb").expect("write should succeed");

    let sample_dir = watch_dir.path().join("sample");
    std::fs::create_dir(&sample_dir).expect("mkdir should succeed");
    std::fs::write(sample_dir.join("ignored.nzb"), b"sample release, should be ignored").expect("write should succeed");

    let queue = QueueRepository::new(open_store(&store_dir).await);
    let imported = Arc::new(StaticImportedIndex {
        already_imported: Mutex::new(HashSet::new()),
    });

    let scanner = Scanner::new(
        ScannerConfig {
            watch_directory: watch_dir.path().to_path_buf(),
            poll_interval: Duration::from_secs(30),
            recursive: true,
            allowed_extensions: vec!["nzb".to_string()],
            max_depth: 8,
            worker_count: 2,
            ignore_patterns: vec!["**/sample/**".to_string()],
            default_priority: 5,
        },
        queue.clone(),
        imported,
    );

    let cancel = CancellationToken::new();
    let enqueued = scanner.scan_once(&cancel).await.expect("scan_once should succeed");
    assert_eq!(enqueued, 1, "only keep.nzb should match extension and escape the ignore glob");

    let rows = queue
        .list(Default::default(), "created_at", altmount_db::SortDirection::Ascending, altmount_db::Page { limit: 10, offset: 0 })
        .await
        .expect("list should succeed");
    assert_eq!(rows.len(), 1);
    assert!(rows[0].submission_path.ends_with("keep.nzb"));
}

#[tokio::test]
async fn scan_once_skips_paths_already_materialized() {
    let watch_dir = tempfile::tempdir().expect("tempdir");
    let store_dir = tempfile::tempdir().expect("tempdir");

    let materialized_path = watch_dir.path().join("already-imported.nzb");
    std::fs::write(&materialized_path, b"contents").expect("write should succeed");

    let queue = QueueRepository::new(open_store(&store_dir).await);
    let mut already_imported = HashSet::new();
    already_imported.insert(materialized_path.to_string_lossy().to_string());
    let imported = Arc::new(StaticImportedIndex {
        already_imported: Mutex::new(already_imported),
    });

    let scanner = Scanner::new(
        ScannerConfig {
            watch_directory: watch_dir.path().to_path_buf(),
            ..ScannerConfig::default()
        },
        queue,
        imported,
    );

    let cancel = CancellationToken::new();
    let enqueued = scanner.scan_once(&cancel).await.expect("scan_once should succeed");
    assert_eq!(enqueued, 0, "an already-materialized file must not be re-enqueued");
}

#[tokio::test]
async fn repeat_scan_of_the_same_file_does_not_duplicate_the_row() {
    let watch_dir = tempfile::tempdir().expect("tempdir");
    let store_dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(watch_dir.path().join("stable.nzb"), b"contents").expect("write should succeed");

    let queue = QueueRepository::new(open_store(&store_dir).await);
    let imported = Arc::new(StaticImportedIndex {
        already_imported: Mutex::new(HashSet::new()),
    });

    let scanner = Scanner::new(
        ScannerConfig {
            watch_directory: watch_dir.path().to_path_buf(),
            ..ScannerConfig::default()
        },
        queue.clone(),
        imported,
    );

    let cancel = CancellationToken::new();
    scanner.scan_once(&cancel).await.expect("first scan should succeed");
    scanner.scan_once(&cancel).await.expect("second scan should succeed");

    let rows = queue
        .list(Default::default(), "created_at", altmount_db::SortDirection::Ascending, altmount_db::Page { limit: 10, offset: 0 })
        .await
        .expect("list should succeed");
    assert_eq!(rows.len(), 1, "a repeat scan of the same file must upsert, not duplicate");
}
