//! [crates/db/src/client.rs]
//! =================================================================
//! APARATO: DATABASE CONNECTION CLIENT (ESTRATO L3)
//! RESPONSABILIDAD: GESTION DE CONEXIONES Y PERSISTENCIA ACID
//!
//! Single-file embedded store, local-only. A semaphore gates how many
//! live `Connection`s may exist at once, sized to
//! `max(2, worker_count) + 4`, resizable at runtime.
//! =================================================================

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use libsql::{Builder, Connection, Database};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument};

use crate::errors::{DbError, DbResult};
use crate::schema::apply_schema;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_PAGE_CACHE_KB: i64 = 32_000;
const IDLE_CONNECTION_LIFETIME_SECS: u64 = 15 * 60;

/// Configuration the store is built from. Callers own process
/// bootstrap (reading environment variables, CLI flags, etc) and pass
/// the resolved values in — this crate has no `main.rs` of its own.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to the SQLite file, or `:memory:` for ephemeral stores
    /// (tests only — an in-memory store is not visible across
    /// connections without the anchor below, and at-most-one-caller
    /// claim tests need real cross-connection visibility).
    pub database_path: String,
    pub worker_count: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: "altmount.db".to_string(),
            worker_count: 2,
        }
    }
}

fn pool_capacity(worker_count: usize) -> usize {
    worker_count.max(2) + 4
}

/// Owns the single `libsql::Database` handle and gates concurrent
/// connections through a resizable semaphore.
pub struct StorePool {
    database: Arc<Database>,
    permits: Arc<Semaphore>,
    capacity: AtomicUsize,
}

/// A connection checked out of the pool. Dropping it releases its
/// permit back to the semaphore.
pub struct PooledConnection {
    connection: Connection,
    _permit: tokio::sync::OwnedSemaphorePermit,
}

impl std::ops::Deref for PooledConnection {
    type Target = Connection;
    fn deref(&self) -> &Connection {
        &self.connection
    }
}

impl StorePool {
    /// Opens (creating if absent) the store, applies pragmas, runs
    /// migrations, and returns a ready pool. Migration failure aborts
    /// — callers must not accept work against a half-migrated schema.
    #[instrument(skip(config))]
    pub async fn connect(config: &StoreConfig) -> DbResult<Self> {
        if config.database_path.is_empty() {
            return Err(DbError::Configuration("database_path is empty".into()));
        }

        if config.database_path != ":memory:" {
            if let Some(parent) = Path::new(&config.database_path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| DbError::Connection(format!("cannot create data dir: {e}")))?;
                }
            }
        }

        info!("[STORE]: opening '{}'", config.database_path);

        let database = Builder::new_local(&config.database_path)
            .build()
            .await
            .map_err(|e| DbError::Connection(format!("driver init failed: {e}")))?;

        let database = Arc::new(database);

        let bootstrap_connection = database
            .connect()
            .map_err(|e| DbError::Connection(format!("bootstrap connect failed: {e}")))?;

        apply_pragmas(&bootstrap_connection).await?;
        apply_schema(&bootstrap_connection)
            .await
            .map_err(|e| DbError::Migration(e.to_string()))?;

        let capacity = pool_capacity(config.worker_count);
        info!("[STORE]: migrations applied, pool capacity = {capacity}");

        Ok(Self {
            database,
            permits: Arc::new(Semaphore::new(capacity)),
            capacity: AtomicUsize::new(capacity),
        })
    }

    /// Adjusts the pool capacity at runtime when the worker count
    /// changes.
    pub fn resize(&self, new_worker_count: usize) {
        let new_capacity = pool_capacity(new_worker_count);
        let current = self.capacity.swap(new_capacity, Ordering::SeqCst);
        if new_capacity > current {
            self.permits.add_permits(new_capacity - current);
        }
        debug!("[STORE]: pool resized {current} -> {new_capacity}");
        // Shrinking releases no permits — outstanding connections drain
        // naturally and the semaphore simply grants fewer new ones
        // until usage falls under the new ceiling.
    }

    /// Checks out a connection, waiting for a free permit if the pool
    /// is saturated. Each fresh `libsql::Connection` only inherits the
    /// database-level WAL setting; the per-connection pragmas (busy
    /// timeout, synchronous, temp store, cache size) are re-applied here
    /// since `libsql` does not persist them across connections.
    pub async fn acquire(&self) -> DbResult<PooledConnection> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| DbError::Connection(format!("pool closed: {e}")))?;

        let connection = self
            .database
            .connect()
            .map_err(|e| DbError::Connection(format!("connect failed: {e}")))?;

        apply_pragmas(&connection).await?;

        Ok(PooledConnection {
            connection,
            _permit: permit,
        })
    }
}

async fn apply_pragmas(connection: &Connection) -> DbResult<()> {
    connection
        .execute("PRAGMA journal_mode=WAL", ())
        .await
        .map_err(DbError::Query)?;
    connection
        .execute("PRAGMA synchronous=NORMAL", ())
        .await
        .map_err(DbError::Query)?;
    connection
        .execute("PRAGMA temp_store=MEMORY", ())
        .await
        .map_err(DbError::Query)?;
    connection
        .execute(&format!("PRAGMA cache_size=-{DEFAULT_PAGE_CACHE_KB}"), ())
        .await
        .map_err(DbError::Query)?;
    connection
        .execute(&format!("PRAGMA busy_timeout={DEFAULT_BUSY_TIMEOUT_MS}"), ())
        .await
        .map_err(DbError::Query)?;

    tracing::trace!(
        "[STORE]: pragmas applied (WAL, synchronous=NORMAL, busy_timeout={DEFAULT_BUSY_TIMEOUT_MS}ms)"
    );
    Ok(())
}
