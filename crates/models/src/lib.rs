//! [crates/models/src/lib.rs]
//! =================================================================
//! APARATO: DOMAIN MODELS (ESTRATO L2)
//! RESPONSABILIDAD: DEFINICION DE TIPOS COMPARTIDOS ENTRE PERSISTENCIA
//! Y ORQUESTACION (SINGLE SOURCE OF TRUTH)
//! =================================================================

pub mod health;
pub mod queue;

pub use health::{HealthRecord, HealthStatus};
pub use queue::{QueueEntry, QueueStats, QueueStatus};
