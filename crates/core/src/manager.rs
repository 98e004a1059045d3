//! [crates/core/src/manager.rs]
//! =================================================================
//! APARATO: QUEUE MANAGER (ESTRATO L4)
//! RESPONSABILIDAD: CICLO DE VIDA DEL POOL DE WORKERS DE IMPORTACION
//!
//! Worker-pool lifecycle: a configurable pool of poll-driven workers
//! with per-item cancellation, pause/resume, and a graceful, timeout-
//! bounded stop.
//! =================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use altmount_db::QueueRepository;
use altmount_models::queue::QueueEntry;

use crate::claimer::Claimer;
use crate::errors::CoreError;
use crate::processor::Processor;

const GRACEFUL_STOP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct QueueManagerConfig {
    /// Number of worker tasks to run concurrently. Clamped to at least 1.
    pub worker_count: usize,
    /// How often an idle worker polls for new work absent a wake signal.
    pub processing_interval: Duration,
}

impl Default for QueueManagerConfig {
    fn default() -> Self {
        Self {
            worker_count: 2,
            processing_interval: Duration::from_secs(5),
        }
    }
}

/// Worker pool driving the import queue. `Start`/`Stop`/`Pause`/`Resume`
/// are the only lifecycle transitions; everything else happens inside
/// the per-worker loop.
pub struct QueueManager {
    config: QueueManagerConfig,
    queue: QueueRepository,
    claimer: Claimer,
    processor: Arc<dyn Processor>,
    paused: Arc<AtomicBool>,
    notify: Arc<Notify>,
    cancel_table: Arc<Mutex<HashMap<i64, CancellationToken>>>,
    root_cancel: CancellationToken,
    workers: Mutex<JoinSet<()>>,
}

impl QueueManager {
    pub fn new(
        config: QueueManagerConfig,
        queue: QueueRepository,
        claimer: Claimer,
        processor: Arc<dyn Processor>,
    ) -> Self {
        Self {
            config,
            queue,
            claimer,
            processor,
            paused: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
            cancel_table: Arc::new(Mutex::new(HashMap::new())),
            root_cancel: CancellationToken::new(),
            workers: Mutex::new(JoinSet::new()),
        }
    }

    /// Spawns `worker_count` worker tasks.
    #[instrument(skip(self))]
    pub async fn start(&self) {
        let worker_count = self.config.worker_count.max(1);
        info!("[MANAGER]: starting {worker_count} worker(s)");

        let mut workers = self.workers.lock().await;
        for worker_id in 0..worker_count {
            let queue = self.queue.clone();
            let claimer = self.claimer.clone();
            let processor = Arc::clone(&self.processor);
            let paused = Arc::clone(&self.paused);
            let notify = Arc::clone(&self.notify);
            let cancel_table = Arc::clone(&self.cancel_table);
            let root_cancel = self.root_cancel.clone();
            let interval = self.config.processing_interval;

            workers.spawn(async move {
                worker_loop(
                    worker_id,
                    queue,
                    claimer,
                    processor,
                    paused,
                    notify,
                    cancel_table,
                    root_cancel,
                    interval,
                )
                .await;
            });
        }
    }

    /// Cancels the manager's root context and waits up to 30s for every
    /// worker to drain. A timeout logs a warning, not an error — the
    /// next `Start` recovers stale rows via `reset_stale`.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        info!("[MANAGER]: stop requested");
        self.root_cancel.cancel();

        let mut workers = self.workers.lock().await;
        let drain = tokio::time::timeout(GRACEFUL_STOP_TIMEOUT, async {
            while workers.join_next().await.is_some() {}
        });

        if drain.await.is_err() {
            warn!(
                "[MANAGER]: graceful stop timed out after {:?}; leaving stragglers to the OS",
                GRACEFUL_STOP_TIMEOUT
            );
        } else {
            info!("[MANAGER]: all workers drained");
        }
    }

    /// Sets the pause flag. Running workers finish their current item,
    /// then skip polling until `resume`.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        info!("[MANAGER]: paused");
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.notify.notify_waiters();
        info!("[MANAGER]: resumed");
    }

    /// Wakes idle workers immediately rather than waiting for the next
    /// poll tick. Queue repository callers may tickle this after
    /// `enqueue`/`batch_enqueue` to avoid waiting out a full poll interval.
    pub fn notify_enqueued(&self) {
        self.notify.notify_waiters();
    }

    /// Fires only the per-item cancellation token for `item_id`; the
    /// worker that owns it continues on to its next item afterward.
    pub async fn cancel_processing(&self, item_id: i64) -> bool {
        if let Some(token) = self.cancel_table.lock().await.get(&item_id) {
            token.cancel();
            true
        } else {
            false
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn worker_loop(
    worker_id: usize,
    queue: QueueRepository,
    claimer: Claimer,
    processor: Arc<dyn Processor>,
    paused: Arc<AtomicBool>,
    notify: Arc<Notify>,
    cancel_table: Arc<Mutex<HashMap<i64, CancellationToken>>>,
    root_cancel: CancellationToken,
    interval: Duration,
) {
    debug!("[WORKER {worker_id}]: started");

    loop {
        tokio::select! {
            _ = root_cancel.cancelled() => {
                debug!("[WORKER {worker_id}]: root cancelled, exiting");
                return;
            }
            _ = tokio::time::sleep(interval) => {}
            _ = notify.notified() => {}
        }

        if paused.load(Ordering::SeqCst) {
            continue;
        }

        let item = match claimer.claim_with_retry().await {
            Ok(Some(item)) => item,
            Ok(None) => continue,
            Err(CoreError::Contention) => {
                debug!("[WORKER {worker_id}]: contention exhausted this tick, will retry next tick");
                continue;
            }
            Err(other) => {
                error!("[WORKER {worker_id}]: claim failed: {other}");
                continue;
            }
        };

        let item_cancel = root_cancel.child_token();
        cancel_table.lock().await.insert(item.id, item_cancel.clone());

        run_item(&queue, processor.as_ref(), &item, &item_cancel).await;

        cancel_table.lock().await.remove(&item.id);
    }
}

async fn run_item(
    _queue: &QueueRepository,
    processor: &dyn Processor,
    item: &QueueEntry,
    cancel: &CancellationToken,
) {
    match processor.process_item(cancel, item).await {
        Ok(result_path) => {
            processor.handle_success(cancel, item, &result_path).await;
        }
        Err(error) => {
            processor.handle_failure(cancel, item, error.as_ref()).await;
        }
    }
}
