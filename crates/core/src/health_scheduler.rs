//! [crates/core/src/health_scheduler.rs]
//! =================================================================
//! APARATO: HEALTH SCHEDULER (ESTRATO L4)
//! RESPONSABILIDAD: VERIFICACION PERIODICA Y PROMOCION A REPARACION
//!
//! Ticker-driven dispatch: each tick fetches due work in one batch, fans
//! it out to a bounded worker pool, and flushes every resulting
//! transition in a single bulk update.
//! =================================================================

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use altmount_db::{HealthRepository, HealthTransition};
use altmount_models::health::{HealthRecord, HealthVerdict};

use crate::backoff::{healthy_reschedule_at, next_repair_check_at, next_retry_check_at};
use crate::processor::{HealthChecker, RepairNotifier};

#[derive(Debug, Clone)]
pub struct HealthSchedulerConfig {
    pub tick_interval: Duration,
    pub batch_size: i64,
    pub worker_count: usize,
    pub repair_batch_size: i64,
}

impl Default for HealthSchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(30),
            batch_size: 50,
            worker_count: 4,
            repair_batch_size: 10,
        }
    }
}

pub struct HealthScheduler {
    config: HealthSchedulerConfig,
    health: HealthRepository,
    checker: Arc<dyn HealthChecker>,
    repair_notifier: Arc<dyn RepairNotifier>,
}

impl HealthScheduler {
    pub fn new(
        config: HealthSchedulerConfig,
        health: HealthRepository,
        checker: Arc<dyn HealthChecker>,
        repair_notifier: Arc<dyn RepairNotifier>,
    ) -> Self {
        Self {
            config,
            health,
            checker,
            repair_notifier,
        }
    }

    /// Runs both the verification tick and the repair-notification tick
    /// on the same interval until `cancel` fires.
    #[instrument(skip(self, cancel))]
    pub async fn run(&self, cancel: &CancellationToken) {
        info!("[HEALTH_SCHEDULER]: ticking every {:?}", self.config.tick_interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("[HEALTH_SCHEDULER]: cancelled, stopping");
                    return;
                }
                _ = tokio::time::sleep(self.config.tick_interval) => {}
            }

            if let Err(error) = self.verification_tick(cancel).await {
                error!("[HEALTH_SCHEDULER]: verification tick failed: {error}");
            }
            if let Err(error) = self.repair_tick(cancel).await {
                error!("[HEALTH_SCHEDULER]: repair tick failed: {error}");
            }
        }
    }

    /// `GetDue` → dispatch each record to the worker pool → accumulate
    /// transitions → one `BulkUpdate` flush per tick.
    #[instrument(skip(self, cancel))]
    async fn verification_tick(&self, cancel: &CancellationToken) -> anyhow::Result<()> {
        let due = self.health.get_due(self.config.batch_size).await?;
        if due.is_empty() {
            return Ok(());
        }

        debug!("[HEALTH_SCHEDULER]: {} record(s) due for verification", due.len());

        let mut join_set = JoinSet::new();
        let mut pending = due.into_iter();
        let mut in_flight = 0usize;
        let mut transitions = Vec::new();

        loop {
            while in_flight < self.config.worker_count {
                let Some(record) = pending.next() else { break };
                let checker = Arc::clone(&self.checker);
                let cancel = cancel.clone();
                join_set.spawn(async move {
                    let verdict = checker.check(&cancel, &record).await;
                    (record, verdict)
                });
                in_flight += 1;
            }

            let Some(result) = join_set.join_next().await else { break };
            in_flight -= 1;

            match result {
                Ok((record, verdict)) => {
                    transitions.push(transition_for_verdict(&record, verdict));
                }
                Err(join_error) => warn!("[HEALTH_SCHEDULER]: check task failed: {join_error}"),
            }
        }

        if !transitions.is_empty() {
            let report = self.health.bulk_update(transitions).await?;
            debug!("[HEALTH_SCHEDULER]: flushed {} transition(s)", report.applied);
        }

        Ok(())
    }

    /// `GetForRepairNotification` → invoke the repair collaborator for
    /// each due record → `IncrementRepairRetry` on failure,
    /// `MarkCorrupted` once the repair-retry budget is exhausted.
    #[instrument(skip(self, cancel))]
    async fn repair_tick(&self, cancel: &CancellationToken) -> anyhow::Result<()> {
        let due = self.health.get_for_repair_notification(self.config.repair_batch_size).await?;
        if due.is_empty() {
            return Ok(());
        }

        debug!("[HEALTH_SCHEDULER]: {} record(s) due for repair notification", due.len());
        let now = chrono::Utc::now();

        for record in due {
            if cancel.is_cancelled() {
                return Ok(());
            }

            match self.repair_notifier.notify(cancel, &record).await {
                Ok(()) => {
                    debug!("[HEALTH_SCHEDULER]: repair notified for '{}'", record.file_path);
                }
                Err(error) => {
                    let next_repair_retry_count = record.repair_retry_count + 1;
                    let exhausted = next_repair_retry_count >= record.max_repair_retries;
                    if exhausted {
                        self.health
                            .mark_corrupted(&record.file_path, &error.to_string())
                            .await?;
                        warn!(
                            "[HEALTH_SCHEDULER]: repair retries exhausted for '{}', marked corrupted",
                            record.file_path
                        );
                    } else {
                        let next_check_at = next_repair_check_at(now, next_repair_retry_count);
                        self.health
                            .increment_repair_retry(&record.file_path, &error.to_string(), next_check_at)
                            .await?;
                    }
                }
            }
        }

        Ok(())
    }
}

fn transition_for_verdict(record: &HealthRecord, verdict: HealthVerdict) -> HealthTransition {
    let now = chrono::Utc::now();

    match verdict {
        HealthVerdict::Healthy => HealthTransition::MarkHealthy {
            file_path: record.file_path.clone(),
            next_check_at: healthy_reschedule_at(now, record.release_date),
        },
        HealthVerdict::Partial(error) => {
            if record.retry_count >= record.max_retries {
                HealthTransition::SetRepairTriggered {
                    file_path: record.file_path.clone(),
                    error,
                }
            } else {
                let next_retry_count = record.retry_count + 1;
                HealthTransition::IncrementRetry {
                    file_path: record.file_path.clone(),
                    error,
                    next_check_at: next_retry_check_at(now, next_retry_count),
                }
            }
        }
        HealthVerdict::RepairTriggered(error) => HealthTransition::SetRepairTriggered {
            file_path: record.file_path.clone(),
            error,
        },
        HealthVerdict::Corrupted(error) => HealthTransition::MarkCorrupted {
            file_path: record.file_path.clone(),
            error,
        },
    }
}
