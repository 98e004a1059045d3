//! [crates/db/src/repositories/mod.rs]
pub mod health;
pub mod queue;

pub use health::{BulkUpdateReport, HealthRepository, HealthTransition};
pub use queue::{Page, QueueListFilters, QueueRepository, RemoveBulkReport, SortDirection};
