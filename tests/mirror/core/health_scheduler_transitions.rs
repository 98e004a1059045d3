//! [tests/mirror/core/health_scheduler_transitions.rs]
//! Certifies `HealthScheduler::run`'s two ticks end to end against a
//! real store: a verification pass applies the five state-transition
//! rules via a scripted `HealthChecker`, and a repair pass escalates to
//! `corrupted` once the repair-retry budget set in a `RepairNotifier`
//! failure is exhausted.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use altmount_core::{HealthChecker, HealthScheduler, HealthSchedulerConfig, RepairNotifier};
use altmount_db::{HealthRepository, StoreConfig, StorePool};
use altmount_models::health::{HealthRecord, HealthVerdict};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

async fn open_store(dir: &tempfile::TempDir) -> Arc<StorePool> {
    let config = StoreConfig {
        database_path: dir.path().join("altmount.db").to_string_lossy().to_string(),
        worker_count: 4,
    };
    Arc::new(StorePool::connect(&config).await.expect("store should open"))
}

struct ScriptedChecker;

#[async_trait]
impl HealthChecker for ScriptedChecker {
    async fn check(&self, _cancel: &CancellationToken, record: &HealthRecord) -> HealthVerdict {
        if record.file_path.contains("healthy") {
            HealthVerdict::Healthy
        } else if record.file_path.contains("corrupted") {
            HealthVerdict::Corrupted("unrecoverable".to_string())
        } else {
            HealthVerdict::Partial("one segment missing".to_string())
        }
    }
}

struct AlwaysFailingRepairNotifier {
    attempts: AtomicUsize,
}

#[async_trait]
impl RepairNotifier for AlwaysFailingRepairNotifier {
    async fn notify(
        &self,
        _cancel: &CancellationToken,
        _record: &HealthRecord,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err("repair endpoint unreachable".into())
    }
}

async fn run_scheduler_briefly(scheduler: Arc<HealthScheduler>, duration: Duration) {
    let cancel = CancellationToken::new();
    let run_cancel = cancel.clone();
    let handle = tokio::spawn(async move { scheduler.run(&run_cancel).await });

    tokio::time::sleep(duration).await;
    cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
}

#[tokio::test]
async fn verification_tick_applies_healthy_partial_and_corrupted_verdicts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let health = HealthRepository::new(open_store(&dir).await);

    let now = chrono::Utc::now();
    for path in ["/library/healthy-one.mkv", "/library/partial-one.mkv", "/library/corrupted-one.mkv"] {
        health
            .add_automatic_check(path, None, None, now - chrono::Duration::minutes(1), None)
            .await
            .expect("registration should succeed");
    }

    let scheduler = Arc::new(HealthScheduler::new(
        HealthSchedulerConfig {
            tick_interval: Duration::from_millis(20),
            batch_size: 50,
            worker_count: 4,
            repair_batch_size: 10,
        },
        health.clone(),
        Arc::new(ScriptedChecker),
        Arc::new(AlwaysFailingRepairNotifier {
            attempts: AtomicUsize::new(0),
        }),
    ));

    run_scheduler_briefly(scheduler, Duration::from_millis(150)).await;

    // Healthy and corrupted both leave get_due; partial reschedules one
    // minute out and so also leaves get_due within this window.
    let due = health.get_due(10).await.expect("get_due should succeed");
    assert!(due.is_empty(), "all three records should have transitioned out of 'due'");
}

#[tokio::test]
async fn repair_tick_escalates_to_corrupted_once_the_retry_budget_is_exhausted() {
    let dir = tempfile::tempdir().expect("tempdir");
    let health = HealthRepository::new(open_store(&dir).await);

    health
        .add_automatic_check("/library/stuck-repair.mkv", None, None, chrono::Utc::now(), None)
        .await
        .expect("registration should succeed");
    health
        .set_repair_triggered("/library/stuck-repair.mkv", "missing segments")
        .await
        .expect("set_repair_triggered should succeed");

    // Default max_repair_retries is 4: push the row to the edge so the
    // very next failed notification (driven by the scheduler) exhausts it.
    let past_due = chrono::Utc::now() - chrono::Duration::minutes(1);
    for _ in 0..3 {
        health
            .increment_repair_retry("/library/stuck-repair.mkv", "still missing", past_due)
            .await
            .expect("increment_repair_retry should succeed");
    }

    let notifier = Arc::new(AlwaysFailingRepairNotifier {
        attempts: AtomicUsize::new(0),
    });

    let scheduler = Arc::new(HealthScheduler::new(
        HealthSchedulerConfig {
            tick_interval: Duration::from_millis(20),
            batch_size: 50,
            worker_count: 4,
            repair_batch_size: 10,
        },
        health.clone(),
        Arc::new(ScriptedChecker),
        notifier.clone(),
    ));

    run_scheduler_briefly(scheduler, Duration::from_millis(150)).await;

    assert!(notifier.attempts.load(Ordering::SeqCst) >= 1, "the repair notifier should have been invoked");

    let still_pending_repair = health
        .get_for_repair_notification(10)
        .await
        .expect("get_for_repair_notification should succeed");
    assert!(
        still_pending_repair.is_empty(),
        "once exhausted the row must no longer surface for repair notification"
    );
}
