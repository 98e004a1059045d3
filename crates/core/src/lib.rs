//! [crates/core/src/lib.rs]
//! =================================================================
//! APARATO: ORCHESTRATION CRATE ROOT (ESTRATO L4)
//! RESPONSABILIDAD: ENSAMBLAJE DEL CLAIMER, MANAGER, SCANNER Y SCHEDULER
//!
//! Library-only: no wire protocol, no `main.rs`. The descriptor parser,
//! VFS mount, HTTP/auth layer, remote-fetch client, and third-party
//! notifiers are named external collaborators (`processor` module) with
//! no concrete implementation here.
//! =================================================================

pub mod backoff;
pub mod claimer;
pub mod errors;
pub mod health_scheduler;
pub mod manager;
pub mod processor;
pub mod scanner;

pub use claimer::Claimer;
pub use errors::{CoreError, CoreResult};
pub use health_scheduler::{HealthScheduler, HealthSchedulerConfig};
pub use manager::{QueueManager, QueueManagerConfig};
pub use processor::{
    ArrNotifier, CacheNotifier, FallbackRouter, HealthChecker, Processor, RepairNotifier,
    SymlinkCreator, is_non_retryable,
};
pub use scanner::{ImportedFilesIndex, Scanner, ScannerConfig};
