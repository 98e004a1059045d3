//! [crates/core/src/errors.rs]
//! =================================================================
//! APARATO: ORCHESTRATION ERROR CATALOG (ESTRATO L4)
//! RESPONSABILIDAD: CLASIFICACION DE FALLOS DE CLAIMER/MANAGER/SCHEDULER
//! =================================================================

use thiserror::Error;

use altmount_db::DbError;

#[derive(Error, Debug)]
pub enum CoreError {
    /// A store-level failure that isn't contention (see `DbError::is_contention`).
    #[error("[CORE_STORE]: store failure -> {0}")]
    Store(#[from] DbError),

    /// The claimer exhausted its retry budget while the store stayed busy.
    #[error("[CORE_CONTENTION]: claim retries exhausted under contention")]
    Contention,

    /// Internal-only: no row was available to claim. Never surfaced to a
    /// manager caller as an `Err` — `Claimer::claim_with_retry` maps this
    /// to `Ok(None)`.
    #[error("[CORE_NO_WORK]: no work available")]
    NoWorkAvailable,

    /// A cancellation token fired mid-operation. Propagated untouched and
    /// never treated as a retryable processor failure.
    #[error("[CORE_CANCELLED]: operation cancelled")]
    Cancelled,

    /// Opaque failure from the external `Processor` collaborator.
    #[error("[CORE_PROCESSOR]: processor failure -> {0}")]
    Processor(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type CoreResult<T> = Result<T, CoreError>;
