//! [crates/db/src/repositories/health.rs]
//! =================================================================
//! APARATO: HEALTH REPOSITORY (ESTRATO L3)
//! RESPONSABILIDAD: CICLO DE VIDA DE LA VERIFICACION DE INTEGRIDAD
//!
//! Three operation families: registering new checks, selecting due work
//! for the scheduler, and recording the transitions the scheduler
//! drives (healthy/partial/repair/corrupted).
//! =================================================================

use std::sync::Arc;

use chrono::{DateTime, Utc};
use libsql::{params, Row, Transaction, TransactionBehavior};
use tracing::{debug, info, instrument};

use altmount_models::health::{HealthRecord, HealthStatus};

use crate::client::StorePool;
use crate::errors::{DbError, DbResult};

/// One mutation accepted by `bulk_update`.
#[derive(Debug, Clone)]
pub enum HealthTransition {
    IncrementRetry {
        file_path: String,
        error: String,
        next_check_at: DateTime<Utc>,
    },
    SetRepairTriggered {
        file_path: String,
        error: String,
    },
    IncrementRepairRetry {
        file_path: String,
        error: String,
        next_check_at: DateTime<Utc>,
    },
    MarkCorrupted {
        file_path: String,
        error: String,
    },
    MarkHealthy {
        file_path: String,
        next_check_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BulkUpdateReport {
    pub applied: usize,
}

#[derive(Clone)]
pub struct HealthRepository {
    pool: Arc<StorePool>,
}

impl HealthRepository {
    pub fn new(pool: Arc<StorePool>) -> Self {
        Self { pool }
    }

    /// UPSERT registration for a routine scan discovery.
    #[instrument(skip(self, source_nzb_path))]
    pub async fn add_automatic_check(
        &self,
        file_path: &str,
        library_path: Option<&str>,
        release_date: Option<DateTime<Utc>>,
        scheduled_check_at: DateTime<Utc>,
        source_nzb_path: Option<&str>,
    ) -> DbResult<i64> {
        let connection = self.pool.acquire().await?;

        connection
            .execute(
                r#"
                INSERT INTO file_health (
                    file_path, library_path, status, release_date,
                    scheduled_check_at, source_nzb_path, created_at, updated_at
                ) VALUES (?1, ?2, 'pending', ?3, ?4, ?5, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
                ON CONFLICT(file_path) DO UPDATE SET
                    library_path = excluded.library_path,
                    release_date = excluded.release_date,
                    scheduled_check_at = excluded.scheduled_check_at,
                    source_nzb_path = excluded.source_nzb_path,
                    updated_at = CURRENT_TIMESTAMP
                "#,
                params![
                    file_path,
                    library_path,
                    release_date.map(|d| d.to_rfc3339()),
                    scheduled_check_at.to_rfc3339(),
                    source_nzb_path
                ],
            )
            .await?;

        let id = fetch_id_by_path(&connection, file_path).await?;
        debug!("[HEALTH]: automatic check registered id={id} path={file_path}");
        Ok(id)
    }

    /// Registers an externally-detected corrupted file: sets
    /// retry-count to max-retries minus one so the next
    /// `IncrementRetry` observation graduates it straight into
    /// `repair_triggered`.
    #[instrument(skip(self, error, library_path))]
    pub async fn register_corrupted_file(
        &self,
        file_path: &str,
        library_path: Option<&str>,
        error: &str,
    ) -> DbResult<i64> {
        let connection = self.pool.acquire().await?;

        connection
            .execute(
                r#"
                INSERT INTO file_health (
                    file_path, library_path, status, last_error,
                    retry_count, max_retries, scheduled_check_at,
                    created_at, updated_at
                ) VALUES (?1, ?2, 'pending', ?3, ?4 - 1, ?4, CURRENT_TIMESTAMP,
                          CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
                ON CONFLICT(file_path) DO UPDATE SET
                    library_path = excluded.library_path,
                    last_error = excluded.last_error,
                    retry_count = file_health.max_retries - 1,
                    status = 'pending',
                    scheduled_check_at = CURRENT_TIMESTAMP,
                    updated_at = CURRENT_TIMESTAMP
                "#,
                params![file_path, library_path, error, default_max_retries()],
            )
            .await?;

        let id = fetch_id_by_path(&connection, file_path).await?;
        info!("[HEALTH]: corrupted file registered id={id} path={file_path}");
        Ok(id)
    }

    /// Non-terminal, non-in-flight rows due for a check, highest
    /// priority first, oldest schedule first.
    #[instrument(skip(self))]
    pub async fn get_due(&self, limit: i64) -> DbResult<Vec<HealthRecord>> {
        let connection = self.pool.acquire().await?;

        let mut rows = connection
            .query(
                r#"
                SELECT * FROM file_health
                WHERE status NOT IN ('corrupted', 'checking', 'healthy', 'repair_triggered')
                  AND scheduled_check_at IS NOT NULL
                  AND scheduled_check_at <= CURRENT_TIMESTAMP
                ORDER BY priority DESC, scheduled_check_at ASC
                LIMIT ?1
                "#,
                params![limit],
            )
            .await?;

        collect_records(&mut rows).await
    }

    /// `repair_triggered` rows whose deferred check is due and whose
    /// repair-retry budget is not exhausted.
    #[instrument(skip(self))]
    pub async fn get_for_repair_notification(&self, limit: i64) -> DbResult<Vec<HealthRecord>> {
        let connection = self.pool.acquire().await?;

        let mut rows = connection
            .query(
                r#"
                SELECT * FROM file_health
                WHERE status = 'repair_triggered'
                  AND scheduled_check_at IS NOT NULL
                  AND scheduled_check_at <= CURRENT_TIMESTAMP
                  AND repair_retry_count < max_repair_retries
                ORDER BY priority DESC, scheduled_check_at ASC
                LIMIT ?1
                "#,
                params![limit],
            )
            .await?;

        collect_records(&mut rows).await
    }

    /// Advances retry-count, returns to `pending`, schedules the next
    /// check.
    #[instrument(skip(self, error))]
    pub async fn increment_retry(
        &self,
        file_path: &str,
        error: &str,
        next_check_at: DateTime<Utc>,
    ) -> DbResult<()> {
        let connection = self.pool.acquire().await?;
        let tx = connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(DbError::Transaction)?;
        apply_increment_retry(&tx, file_path, error, next_check_at).await?;
        tx.commit().await.map_err(DbError::Transaction)
    }

    /// Moves to `repair_triggered`, deferring the schedule by one hour.
    #[instrument(skip(self, error))]
    pub async fn set_repair_triggered(&self, file_path: &str, error: &str) -> DbResult<()> {
        let connection = self.pool.acquire().await?;
        let tx = connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(DbError::Transaction)?;
        apply_set_repair_triggered(&tx, file_path, error).await?;
        tx.commit().await.map_err(DbError::Transaction)
    }

    /// Raises repair-retry-count while remaining `repair_triggered`,
    /// deferring the next repair attempt per the repair-retry backoff
    /// ladder.
    #[instrument(skip(self, error))]
    pub async fn increment_repair_retry(
        &self,
        file_path: &str,
        error: &str,
        next_check_at: DateTime<Utc>,
    ) -> DbResult<()> {
        let connection = self.pool.acquire().await?;
        let tx = connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(DbError::Transaction)?;
        apply_increment_repair_retry(&tx, file_path, error, next_check_at).await?;
        tx.commit().await.map_err(DbError::Transaction)
    }

    /// Terminal from the scheduler's viewpoint: clears
    /// `scheduled_check_at`.
    #[instrument(skip(self, error))]
    pub async fn mark_corrupted(&self, file_path: &str, error: &str) -> DbResult<()> {
        let connection = self.pool.acquire().await?;
        let tx = connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(DbError::Transaction)?;
        apply_mark_corrupted(&tx, file_path, error).await?;
        tx.commit().await.map_err(DbError::Transaction)
    }

    /// Clears all error state and counters, schedules the next periodic
    /// verification.
    #[instrument(skip(self))]
    pub async fn mark_healthy(&self, file_path: &str, next_check_at: DateTime<Utc>) -> DbResult<()> {
        let connection = self.pool.acquire().await?;
        let tx = connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(DbError::Transaction)?;
        apply_mark_healthy(&tx, file_path, next_check_at).await?;
        tx.commit().await.map_err(DbError::Transaction)
    }

    /// Applies many transitions in one immediate transaction,
    /// all-or-nothing.
    #[instrument(skip(self, updates), fields(count = updates.len()))]
    pub async fn bulk_update(&self, updates: Vec<HealthTransition>) -> DbResult<BulkUpdateReport> {
        if updates.is_empty() {
            return Ok(BulkUpdateReport::default());
        }

        let connection = self.pool.acquire().await?;
        let tx = connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(DbError::Transaction)?;

        for update in &updates {
            match update {
                HealthTransition::IncrementRetry {
                    file_path,
                    error,
                    next_check_at,
                } => apply_increment_retry(&tx, file_path, error, *next_check_at).await?,
                HealthTransition::SetRepairTriggered { file_path, error } => {
                    apply_set_repair_triggered(&tx, file_path, error).await?
                }
                HealthTransition::IncrementRepairRetry {
                    file_path,
                    error,
                    next_check_at,
                } => apply_increment_repair_retry(&tx, file_path, error, *next_check_at).await?,
                HealthTransition::MarkCorrupted { file_path, error } => {
                    apply_mark_corrupted(&tx, file_path, error).await?
                }
                HealthTransition::MarkHealthy {
                    file_path,
                    next_check_at,
                } => apply_mark_healthy(&tx, file_path, *next_check_at).await?,
            }
        }

        tx.commit()
            .await
            .map_err(DbError::Transaction)?;

        info!("[HEALTH]: bulk update applied {} transitions", updates.len());
        Ok(BulkUpdateReport {
            applied: updates.len(),
        })
    }

    /// Deletes `repair_triggered`/`corrupted` records whose file path
    /// falls under `directory` — replacement is implicit once a fresh
    /// entry lands in the same directory.
    #[instrument(skip(self))]
    pub async fn resolve_pending_repairs_in_directory(&self, directory: &str) -> DbResult<usize> {
        let connection = self.pool.acquire().await?;
        let prefix = format!("{}%", directory.trim_end_matches('/'));

        let rows_affected = connection
            .execute(
                r#"
                DELETE FROM file_health
                WHERE status IN ('repair_triggered', 'corrupted')
                  AND file_path LIKE ?1
                "#,
                params![prefix],
            )
            .await?;

        if rows_affected > 0 {
            info!("[HEALTH]: resolved {rows_affected} pending repairs under {directory}");
        }
        Ok(rows_affected as usize)
    }
}

fn default_max_retries() -> i32 {
    5
}

async fn fetch_id_by_path(connection: &libsql::Connection, file_path: &str) -> DbResult<i64> {
    let mut rows = connection
        .query(
            "SELECT id FROM file_health WHERE file_path = ?1",
            params![file_path],
        )
        .await?;
    let row = rows.next().await?.ok_or(DbError::HealthRecordNotFound)?;
    Ok(row.get(0)?)
}

async fn apply_increment_retry(
    executor: &Transaction,
    file_path: &str,
    error: &str,
    next_check_at: DateTime<Utc>,
) -> DbResult<()> {
    let rows_affected = executor
        .execute(
            r#"
            UPDATE file_health
            SET status = 'pending', retry_count = retry_count + 1, last_error = ?2,
                scheduled_check_at = ?3, last_checked = CURRENT_TIMESTAMP,
                updated_at = CURRENT_TIMESTAMP
            WHERE file_path = ?1
            "#,
            params![file_path, error, next_check_at.to_rfc3339()],
        )
        .await?;

    if rows_affected == 0 {
        return Err(DbError::HealthRecordNotFound);
    }
    Ok(())
}

async fn apply_set_repair_triggered(
    executor: &Transaction,
    file_path: &str,
    error: &str,
) -> DbResult<()> {
    let rows_affected = executor
        .execute(
            r#"
            UPDATE file_health
            SET status = 'repair_triggered', last_error = ?2,
                scheduled_check_at = datetime(CURRENT_TIMESTAMP, '+1 hour'),
                last_checked = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP
            WHERE file_path = ?1
            "#,
            params![file_path, error],
        )
        .await?;

    if rows_affected == 0 {
        return Err(DbError::HealthRecordNotFound);
    }
    Ok(())
}

async fn apply_increment_repair_retry(
    executor: &Transaction,
    file_path: &str,
    error: &str,
    next_check_at: DateTime<Utc>,
) -> DbResult<()> {
    let rows_affected = executor
        .execute(
            r#"
            UPDATE file_health
            SET repair_retry_count = repair_retry_count + 1, last_error = ?2,
                scheduled_check_at = ?3,
                last_checked = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP
            WHERE file_path = ?1 AND status = 'repair_triggered'
            "#,
            params![file_path, error, next_check_at.to_rfc3339()],
        )
        .await?;

    if rows_affected == 0 {
        return Err(DbError::HealthRecordNotFound);
    }
    Ok(())
}

async fn apply_mark_corrupted(
    executor: &Transaction,
    file_path: &str,
    error: &str,
) -> DbResult<()> {
    let rows_affected = executor
        .execute(
            r#"
            UPDATE file_health
            SET status = 'corrupted', last_error = ?2, scheduled_check_at = NULL,
                last_checked = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP
            WHERE file_path = ?1
            "#,
            params![file_path, error],
        )
        .await?;

    if rows_affected == 0 {
        return Err(DbError::HealthRecordNotFound);
    }
    Ok(())
}

async fn apply_mark_healthy(
    executor: &Transaction,
    file_path: &str,
    next_check_at: DateTime<Utc>,
) -> DbResult<()> {
    let rows_affected = executor
        .execute(
            r#"
            UPDATE file_health
            SET status = 'healthy', last_error = NULL, error_details = NULL,
                retry_count = 0, repair_retry_count = 0,
                scheduled_check_at = ?2, last_checked = CURRENT_TIMESTAMP,
                updated_at = CURRENT_TIMESTAMP
            WHERE file_path = ?1
            "#,
            params![file_path, next_check_at.to_rfc3339()],
        )
        .await?;

    if rows_affected == 0 {
        return Err(DbError::HealthRecordNotFound);
    }
    Ok(())
}

async fn collect_records(rows: &mut libsql::Rows) -> DbResult<Vec<HealthRecord>> {
    let mut records = Vec::new();
    while let Some(row) = rows.next().await? {
        records.push(row_to_record(&row)?);
    }
    Ok(records)
}

/// Maps a `SELECT *` row from `file_health` by positional index,
/// matching the column order declared in `schema::BASE_TABLES`.
fn row_to_record(row: &Row) -> DbResult<HealthRecord> {
    let status_raw: String = row.get(3)?;
    let status = HealthStatus::parse(&status_raw)
        .ok_or_else(|| DbError::Mapping(format!("unknown health status '{status_raw}'")))?;

    Ok(HealthRecord {
        id: row.get(0)?,
        file_path: row.get(1)?,
        library_path: row.get(2)?,
        status,
        last_checked: parse_timestamp(row, 4)?,
        last_error: row.get(5)?,
        error_details: row.get(6)?,
        retry_count: row.get(7)?,
        max_retries: row.get(8)?,
        repair_retry_count: row.get(9)?,
        max_repair_retries: row.get(10)?,
        source_nzb_path: row.get(11)?,
        created_at: parse_timestamp(row, 12)?.unwrap_or_else(Utc::now),
        updated_at: parse_timestamp(row, 13)?.unwrap_or_else(Utc::now),
        release_date: parse_timestamp(row, 14)?,
        scheduled_check_at: parse_timestamp(row, 15)?,
        priority: row.get(16)?,
    })
}

fn parse_timestamp(row: &Row, index: i32) -> DbResult<Option<DateTime<Utc>>> {
    let Some(raw) = row.get::<Option<String>>(index)? else {
        return Ok(None);
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }

    chrono::NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S")
        .map(|naive| Some(DateTime::from_naive_utc_and_offset(naive, Utc)))
        .map_err(|e| DbError::Mapping(format!("unparseable timestamp '{raw}': {e}")))
}
