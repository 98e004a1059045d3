//! [crates/core/src/processor.rs]
//! =================================================================
//! APARATO: PROCESSOR CONTRACT (ESTRATO L4)
//! RESPONSABILIDAD: INTERFAZ DEL COLABORADOR EXTERNO DE PROCESAMIENTO
//!
//! The descriptor parser, VFS materialization, and third-party notifier
//! integrations live outside this workspace entirely — this module only
//! names the seam the queue manager dispatches through.
//! =================================================================

use std::error::Error as StdError;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use altmount_models::health::HealthRecord;
use altmount_models::queue::QueueEntry;

/// The unit-of-work collaborator the queue manager drives. Implemented
/// entirely outside this crate (descriptor parsing, VFS materialization,
/// remote fetch) — no concrete implementation ships here.
#[async_trait]
pub trait Processor: Send + Sync {
    /// The heavy lifting. May suspend or block at will; must honor
    /// `cancel`. Returns the materialized result path on success.
    async fn process_item(
        &self,
        cancel: &CancellationToken,
        item: &QueueEntry,
    ) -> Result<String, Box<dyn StdError + Send + Sync>>;

    /// Records completion and fans out to post-processing collaborators.
    /// Never mutates queue status directly — that happens through the
    /// queue repository inside this callback, at the processor's
    /// discretion, not the manager's.
    async fn handle_success(
        &self,
        cancel: &CancellationToken,
        item: &QueueEntry,
        result_path: &str,
    );

    /// Records a failure or schedules a retry. Classifies `error` via
    /// `is_non_retryable` to decide which queue transition to apply.
    async fn handle_failure(
        &self,
        cancel: &CancellationToken,
        item: &QueueEntry,
        error: &(dyn StdError + Send + Sync),
    );
}

/// Classifies a processor failure as retryable or terminal. The manager
/// itself never calls this — it is exported for `Processor` implementors
/// to use inside their own `handle_failure`, per the contract that only
/// the processor layer decides retryability.
pub fn is_non_retryable(error: &(dyn StdError + Send + Sync)) -> bool {
    let matches_terminal_text = |text: String| {
        let text = text.to_lowercase();
        text.contains("not found") || text.contains("permission denied")
    };

    if matches_terminal_text(error.to_string()) {
        return true;
    }

    let mut source = error.source();
    while let Some(current) = source {
        if matches_terminal_text(current.to_string()) {
            return true;
        }
        source = current.source();
    }

    false
}

/// External health-check collaborator invoked by the health scheduler.
#[async_trait]
pub trait HealthChecker: Send + Sync {
    async fn check(
        &self,
        cancel: &CancellationToken,
        record: &HealthRecord,
    ) -> altmount_models::health::HealthVerdict;
}

/// External repair-notification collaborator invoked from the
/// repair-triggered loop.
#[async_trait]
pub trait RepairNotifier: Send + Sync {
    async fn notify(
        &self,
        cancel: &CancellationToken,
        record: &HealthRecord,
    ) -> Result<(), Box<dyn StdError + Send + Sync>>;
}

/// Optional post-processing chain invoked from `Processor::handle_success`
/// / `handle_failure`. No implementation ships in this crate; these are
/// named seams only.
#[async_trait]
pub trait SymlinkCreator: Send + Sync {
    async fn create_symlink(&self, item: &QueueEntry, result_path: &str) -> Result<(), Box<dyn StdError + Send + Sync>>;
}

#[async_trait]
pub trait CacheNotifier: Send + Sync {
    async fn notify_cache(&self, item: &QueueEntry) -> Result<(), Box<dyn StdError + Send + Sync>>;
}

#[async_trait]
pub trait ArrNotifier: Send + Sync {
    async fn notify_arr(&self, item: &QueueEntry) -> Result<(), Box<dyn StdError + Send + Sync>>;
}

#[async_trait]
pub trait FallbackRouter: Send + Sync {
    async fn route_fallback(&self, item: &QueueEntry, error: &(dyn StdError + Send + Sync)) -> Result<(), Box<dyn StdError + Send + Sync>>;
}
