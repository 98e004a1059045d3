//! [crates/db/src/errors.rs]
//! =================================================================
//! APARATO: DATABASE ERROR CATALOG (ESTRATO L3)
//! RESPONSABILIDAD: CATALOGACION SEMANTICA DE FALLOS DE PERSISTENCIA
//! =================================================================

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    /// Physical/driver-level failure opening or maintaining a connection.
    #[error("[DB_CONN]: connection failure -> {0}")]
    Connection(String),

    /// Env/config problem distinct from a network failure (empty
    /// `DATABASE_URL`, malformed pragma, etc).
    #[error("[DB_CONFIG]: configuration error -> {0}")]
    Configuration(String),

    /// Syntax or execution failure surfaced by the underlying engine.
    #[error("[DB_QUERY]: query rejected -> {0}")]
    Query(#[from] libsql::Error),

    /// Row-to-domain mapping failure (unexpected column type, unknown
    /// enum string, etc).
    #[error("[DB_MAPPING]: mapping violation -> {0}")]
    Mapping(String),

    /// Multi-statement sequence failed to begin or commit.
    #[error("[DB_TX]: transaction collapse -> {0}")]
    Transaction(libsql::Error),

    /// Forward migration failed; caller must abort startup rather than
    /// accept work against a half-migrated schema.
    #[error("[DB_MIGRATION]: schema migration failed -> {0}")]
    Migration(String),

    /// `claim_next`/`update_status`/etc addressed a row that isn't
    /// there (or isn't in the expected state) anymore.
    #[error("[DB_ENTRY]: queue entry not found")]
    EntryNotFound,

    /// A health-repository mutation addressed a `file_path` with no
    /// matching row.
    #[error("[DB_HEALTH]: health record not found")]
    HealthRecordNotFound,

    /// `list`/`GetDue`/etc was asked to sort by a column outside the
    /// whitelist — rejected at the repository boundary.
    #[error("[DB_SORT]: column '{0}' is not sortable")]
    UnsortableColumn(String),
}

impl DbError {
    /// True when the underlying driver reports SQLITE_BUSY/SQLITE_LOCKED
    /// (codes 5/6) rather than a real query or schema fault. Matched on
    /// the driver's typed result code, never on message text, so a
    /// caller can distinguish "someone else holds the writer lock" from
    /// every other failure shape.
    pub fn is_contention(&self) -> bool {
        match self {
            DbError::Query(libsql::Error::SqliteFailure(code, _))
            | DbError::Transaction(libsql::Error::SqliteFailure(code, _)) => {
                matches!(code, 5 | 6)
            }
            _ => false,
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;
