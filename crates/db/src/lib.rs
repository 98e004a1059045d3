//! [crates/db/src/lib.rs]
//! =================================================================
//! APARATO: PERSISTENCE CRATE ROOT (ESTRATO L3)
//! RESPONSABILIDAD: EXPOSICION DEL ALMACEN DURABLE Y SUS REPOSITORIOS
//! =================================================================

pub mod client;
pub mod errors;
pub mod repositories;
pub mod schema;

pub use client::{PooledConnection, StoreConfig, StorePool};
pub use errors::{DbError, DbResult};
pub use repositories::{
    BulkUpdateReport, HealthRepository, HealthTransition, Page, QueueListFilters,
    QueueRepository, RemoveBulkReport, SortDirection,
};
