//! [crates/db/src/repositories/queue.rs]
//! =================================================================
//! APARATO: QUEUE REPOSITORY (ESTRATO L3)
//! RESPONSABILIDAD: CICLO DE VIDA DEL IMPORT QUEUE
//!
//! The two invariants the rest of the system relies on:
//! the UNIQUE constraint on `nzb_path`, and a single atomic statement
//! for `claim_next` so at most one caller ever observes a given row as
//! claimed. The claim runs inside a `BEGIN IMMEDIATE` transaction to
//! acquire the writer lock eagerly and avoid the deferred-transaction
//! upgrade race that otherwise surfaces as "database is locked"
//! mid-transaction.
//! =================================================================

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Duration, Utc};
use libsql::{params, Row, Transaction, TransactionBehavior};
use tracing::{debug, info, instrument, warn};

use altmount_models::queue::{NewQueueEntry, QueueEntry, QueueStats, QueueStatus};

use crate::client::StorePool;
use crate::errors::{DbError, DbResult};

/// Rows left `processing` longer than this with no heartbeat are
/// presumed to belong to a dead worker.
const STALE_PROCESSING_THRESHOLD_MINUTES: i64 = 10;

const SORTABLE_COLUMNS: &[&str] = &["created_at", "updated_at", "status", "nzb_path"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueueListFilters {
    pub status: Option<QueueStatus>,
    pub category: Option<String>,
    pub batch_id: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveBulkReport {
    pub removed: usize,
    /// Count of requested ids that were skipped because the row was
    /// `processing`.
    pub protected: usize,
}

/// Stateless value type holding a reference to the durable store; all
/// mutable state lives in `import_queue` itself.
#[derive(Clone)]
pub struct QueueRepository {
    pool: Arc<StorePool>,
}

impl QueueRepository {
    pub fn new(pool: Arc<StorePool>) -> Self {
        Self { pool }
    }

    /// UPSERT on `nzb_path`. A non-terminal existing row only has its
    /// priority numerically lowered (never raised) and its
    /// category/metadata/file_size refreshed — status and retry_count
    /// are untouched. A terminal existing row is reset so the work
    /// runs again.
    #[instrument(skip(self, entry), fields(path = %entry.submission_path))]
    pub async fn enqueue(&self, entry: NewQueueEntry) -> DbResult<i64> {
        let connection = self.pool.acquire().await?;
        let tx = connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(DbError::Transaction)?;

        let id = enqueue_in_tx(&tx, &entry).await?;

        tx.commit()
            .await
            .map_err(DbError::Transaction)?;

        debug!("[QUEUE]: enqueued id={id}");
        Ok(id)
    }

    /// Semantically equivalent to calling `enqueue` per item, but
    /// executed inside one immediate transaction.
    #[instrument(skip(self, entries), fields(count = entries.len()))]
    pub async fn batch_enqueue(&self, entries: Vec<NewQueueEntry>) -> DbResult<Vec<i64>> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let connection = self.pool.acquire().await?;
        let tx = connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(DbError::Transaction)?;

        let mut ids = Vec::with_capacity(entries.len());
        for entry in &entries {
            ids.push(enqueue_in_tx(&tx, entry).await?);
        }

        tx.commit()
            .await
            .map_err(DbError::Transaction)?;

        info!("[QUEUE]: batch enqueued {} entries", ids.len());
        Ok(ids)
    }

    /// Atomically selects the single highest-priority pending entry
    /// (ties broken by older `created_at`), flips it to `processing`,
    /// stamps `started_at`, and returns the full row. Returns `Ok(None)`
    /// when no eligible row exists — callers must treat that as "no
    /// work available", not an error.
    #[instrument(skip(self))]
    pub async fn claim_next(&self) -> DbResult<Option<QueueEntry>> {
        let connection = self.pool.acquire().await?;
        let tx = connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(DbError::Transaction)?;

        let mut rows = tx
            .query(
                r#"
                UPDATE import_queue
                SET status = 'processing',
                    started_at = CURRENT_TIMESTAMP,
                    updated_at = CURRENT_TIMESTAMP
                WHERE id = (
                    SELECT id FROM import_queue
                    WHERE status = 'pending'
                    ORDER BY priority ASC, created_at ASC
                    LIMIT 1
                )
                RETURNING *
                "#,
                (),
            )
            .await?;

        let claimed = match rows.next().await? {
            Some(row) => Some(row_to_entry(&row)?),
            None => None,
        };

        tx.commit()
            .await
            .map_err(DbError::Transaction)?;

        if let Some(entry) = &claimed {
            info!("[QUEUE]: claimed id={} path={}", entry.id, entry.submission_path);
        }

        Ok(claimed)
    }

    /// Stamps timestamps per the target status; clears error on
    /// completion, sets it on failure.
    #[instrument(skip(self, error_message))]
    pub async fn update_status(
        &self,
        id: i64,
        status: QueueStatus,
        error_message: Option<&str>,
    ) -> DbResult<()> {
        let connection = self.pool.acquire().await?;

        let sql = match status {
            QueueStatus::Processing => {
                "UPDATE import_queue SET status = ?2, started_at = CURRENT_TIMESTAMP, \
                 updated_at = CURRENT_TIMESTAMP, error_message = NULL WHERE id = ?1"
            }
            QueueStatus::Completed => {
                "UPDATE import_queue SET status = ?2, completed_at = CURRENT_TIMESTAMP, \
                 updated_at = CURRENT_TIMESTAMP, error_message = NULL WHERE id = ?1"
            }
            QueueStatus::Failed => {
                "UPDATE import_queue SET status = ?2, completed_at = CURRENT_TIMESTAMP, \
                 updated_at = CURRENT_TIMESTAMP, error_message = ?3 WHERE id = ?1"
            }
            QueueStatus::Pending | QueueStatus::Paused => {
                "UPDATE import_queue SET status = ?2, updated_at = CURRENT_TIMESTAMP, \
                 error_message = ?3 WHERE id = ?1"
            }
        };

        let rows_affected = connection
            .execute(sql, params![id, status.as_str(), error_message])
            .await?;

        if rows_affected == 0 {
            return Err(DbError::EntryNotFound);
        }

        debug!("[QUEUE]: id={id} -> {}", status.as_str());
        Ok(())
    }

    /// Administrative priority override (admin endpoints only).
    pub async fn update_priority(&self, id: i64, priority: i32) -> DbResult<()> {
        let connection = self.pool.acquire().await?;
        let rows_affected = connection
            .execute(
                "UPDATE import_queue SET priority = ?2, updated_at = CURRENT_TIMESTAMP WHERE id = ?1",
                params![id, priority],
            )
            .await?;

        if rows_affected == 0 {
            return Err(DbError::EntryNotFound);
        }
        Ok(())
    }

    /// Resets counters and clears error on a terminal row so it is
    /// reclaimable.
    #[instrument(skip(self))]
    pub async fn restart_bulk(&self, ids: &[i64]) -> DbResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let connection = self.pool.acquire().await?;
        let tx = connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(DbError::Transaction)?;

        let mut restarted = 0usize;
        for id in ids {
            let rows_affected = tx
                .execute(
                    r#"
                    UPDATE import_queue
                    SET status = 'pending', retry_count = 0, error_message = NULL,
                        started_at = NULL, completed_at = NULL, updated_at = CURRENT_TIMESTAMP
                    WHERE id = ?1 AND status IN ('completed', 'failed')
                    "#,
                    params![*id],
                )
                .await?;
            restarted += rows_affected as usize;
        }

        tx.commit()
            .await
            .map_err(DbError::Transaction)?;

        info!("[QUEUE]: restarted {restarted}/{} requested rows", ids.len());
        Ok(restarted)
    }

    /// Deletes rows by id, refusing any row currently `processing`
    /// and reporting how many were protected.
    #[instrument(skip(self))]
    pub async fn remove_bulk(&self, ids: &[i64]) -> DbResult<RemoveBulkReport> {
        if ids.is_empty() {
            return Ok(RemoveBulkReport::default());
        }

        let connection = self.pool.acquire().await?;
        let tx = connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(DbError::Transaction)?;

        let mut report = RemoveBulkReport::default();
        for id in ids {
            let mut rows = tx
                .query("SELECT status FROM import_queue WHERE id = ?1", params![*id])
                .await?;

            let Some(row) = rows.next().await? else {
                continue;
            };
            let status: String = row.get(0)?;

            if status == "processing" {
                report.protected += 1;
                warn!("[QUEUE]: refusing to remove in-flight id={id}");
                continue;
            }

            let rows_affected = tx
                .execute("DELETE FROM import_queue WHERE id = ?1", params![*id])
                .await?;
            report.removed += rows_affected as usize;
        }

        tx.commit()
            .await
            .map_err(DbError::Transaction)?;

        Ok(report)
    }

    /// Whitelisted, paginated listing.
    pub async fn list(
        &self,
        filters: QueueListFilters,
        sort_column: &str,
        sort_direction: SortDirection,
        page: Page,
    ) -> DbResult<Vec<QueueEntry>> {
        if !SORTABLE_COLUMNS.contains(&sort_column) {
            return Err(DbError::UnsortableColumn(sort_column.to_string()));
        }

        let connection = self.pool.acquire().await?;

        let mut clauses = Vec::new();
        let mut bind_values: Vec<libsql::Value> = Vec::new();

        if let Some(status) = filters.status {
            clauses.push(format!("status = ?{}", bind_values.len() + 1));
            bind_values.push(status.as_str().into());
        }
        if let Some(category) = &filters.category {
            clauses.push(format!("category = ?{}", bind_values.len() + 1));
            bind_values.push(category.clone().into());
        }
        if let Some(batch_id) = &filters.batch_id {
            clauses.push(format!("batch_id = ?{}", bind_values.len() + 1));
            bind_values.push(batch_id.clone().into());
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let limit_placeholder = bind_values.len() + 1;
        let offset_placeholder = bind_values.len() + 2;
        bind_values.push(page.limit.into());
        bind_values.push(page.offset.into());

        let sql = format!(
            "SELECT * FROM import_queue {where_clause} ORDER BY {sort_column} {} \
             LIMIT ?{limit_placeholder} OFFSET ?{offset_placeholder}",
            sort_direction.as_sql()
        );

        let mut rows = connection.query(&sql, bind_values).await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(row_to_entry(&row)?);
        }
        Ok(entries)
    }

    /// Transitions all `processing` rows to `pending`, clearing
    /// `started_at`. Called on process start to recover work orphaned
    /// by a crash.
    #[instrument(skip(self))]
    pub async fn reset_stale(&self) -> DbResult<usize> {
        let connection = self.pool.acquire().await?;
        let rows_affected = connection
            .execute(
                r#"
                UPDATE import_queue
                SET status = 'pending', started_at = NULL, updated_at = CURRENT_TIMESTAMP
                WHERE status = 'processing'
                "#,
                (),
            )
            .await?;

        if rows_affected > 0 {
            info!("[QUEUE]: reset {rows_affected} stale processing rows");
        }
        Ok(rows_affected as usize)
    }

    /// Marks `processing` rows whose `started_at` predates the stale
    /// threshold and whose worker is presumed dead back to `pending`,
    /// without disturbing rows claimed within the grace window. This
    /// is the scoped counterpart to `reset_stale` used by a live
    /// manager rather than at cold start.
    #[instrument(skip(self))]
    pub async fn reclaim_stale_since(&self, threshold: DateTime<Utc>) -> DbResult<usize> {
        let connection = self.pool.acquire().await?;
        let rows_affected = connection
            .execute(
                r#"
                UPDATE import_queue
                SET status = 'pending', started_at = NULL, updated_at = CURRENT_TIMESTAMP
                WHERE status = 'processing' AND started_at < ?1
                "#,
                params![threshold.to_rfc3339()],
            )
            .await?;
        Ok(rows_affected as usize)
    }

    /// Default staleness threshold (10 minutes).
    pub fn default_stale_threshold(now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::minutes(STALE_PROCESSING_THRESHOLD_MINUTES)
    }

    /// Recomputed on read, never persisted as an authoritative snapshot.
    #[instrument(skip(self))]
    pub async fn stats(&self) -> DbResult<QueueStats> {
        let connection = self.pool.acquire().await?;

        let mut rows = connection
            .query(
                r#"
                SELECT
                    SUM(CASE WHEN status IN ('pending', 'paused') THEN 1 ELSE 0 END),
                    SUM(CASE WHEN status = 'processing' THEN 1 ELSE 0 END),
                    SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END),
                    SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END),
                    AVG(CASE
                        WHEN status = 'completed' AND started_at IS NOT NULL AND completed_at IS NOT NULL
                        THEN (julianday(completed_at) - julianday(started_at)) * 86400000.0
                        ELSE NULL
                    END)
                FROM import_queue
                "#,
                (),
            )
            .await?;

        let row = rows.next().await?;
        let Some(row) = row else {
            return Ok(QueueStats::default());
        };

        Ok(QueueStats {
            total_queued: row.get::<Option<i64>>(0)?.unwrap_or(0),
            total_processing: row.get::<Option<i64>>(1)?.unwrap_or(0),
            total_completed: row.get::<Option<i64>>(2)?.unwrap_or(0),
            total_failed: row.get::<Option<i64>>(3)?.unwrap_or(0),
            avg_processing_time_ms: row.get::<Option<f64>>(4)?,
        })
    }
}

/// Shared between `enqueue` and `batch_enqueue`, both of which run the
/// upsert inside an immediate transaction.
async fn enqueue_in_tx(
    executor: &Transaction,
    entry: &NewQueueEntry,
) -> DbResult<i64> {
    let metadata_json = entry
        .metadata
        .as_ref()
        .map(|v| v.to_string());

    // Terminal rows reset on UPSERT; non-terminal rows only ratchet
    // priority down (never up) and refresh descriptive fields, leaving
    // status/retry_count untouched.
    executor
        .execute(
            r#"
            INSERT INTO import_queue (
                nzb_path, relative_path, storage_path, category, priority,
                max_retries, batch_id, metadata, file_size, status,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'pending',
                      CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
            ON CONFLICT(nzb_path) DO UPDATE SET
                relative_path = excluded.relative_path,
                storage_path = excluded.storage_path,
                category = excluded.category,
                priority = MIN(import_queue.priority, excluded.priority),
                metadata = excluded.metadata,
                file_size = excluded.file_size,
                updated_at = CURRENT_TIMESTAMP,
                status = CASE
                    WHEN import_queue.status IN ('completed', 'failed') THEN 'pending'
                    ELSE import_queue.status
                END,
                retry_count = CASE
                    WHEN import_queue.status IN ('completed', 'failed') THEN 0
                    ELSE import_queue.retry_count
                END,
                error_message = CASE
                    WHEN import_queue.status IN ('completed', 'failed') THEN NULL
                    ELSE import_queue.error_message
                END,
                started_at = CASE
                    WHEN import_queue.status IN ('completed', 'failed') THEN NULL
                    ELSE import_queue.started_at
                END,
                completed_at = CASE
                    WHEN import_queue.status IN ('completed', 'failed') THEN NULL
                    ELSE import_queue.completed_at
                END
            "#,
            params![
                entry.submission_path.clone(),
                entry.relative_path.clone(),
                entry.storage_path.clone(),
                entry.category.clone(),
                entry.priority,
                entry.max_retries,
                entry.batch_id.clone(),
                metadata_json,
                entry.file_size
            ],
        )
        .await?;

    let mut rows = executor
        .query(
            "SELECT id FROM import_queue WHERE nzb_path = ?1",
            params![entry.submission_path.clone()],
        )
        .await?;

    let row = rows.next().await?.ok_or(DbError::EntryNotFound)?;
    Ok(row.get(0)?)
}

/// Maps a `SELECT *` / `RETURNING *` row from `import_queue` by
/// positional index, matching the column order declared in
/// `schema::BASE_TABLES`.
fn row_to_entry(row: &Row) -> DbResult<QueueEntry> {
    let status_raw: String = row.get(6)?;
    let status = QueueStatus::parse(&status_raw)
        .ok_or_else(|| DbError::Mapping(format!("unknown queue status '{status_raw}'")))?;

    let metadata = row
        .get::<Option<String>>(11)?
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(|e| DbError::Mapping(format!("malformed metadata json: {e}")))?;

    Ok(QueueEntry {
        id: row.get(0)?,
        submission_path: row.get(1)?,
        relative_path: row.get(2)?,
        storage_path: row.get(3)?,
        category: row.get(4)?,
        priority: row.get(5)?,
        status,
        retry_count: row.get(7)?,
        max_retries: row.get(8)?,
        error_message: row.get(9)?,
        batch_id: row.get(10)?,
        metadata,
        file_size: row.get(12)?,
        created_at: parse_timestamp(row, 13)?.unwrap_or_else(Utc::now),
        updated_at: parse_timestamp(row, 14)?.unwrap_or_else(Utc::now),
        started_at: parse_timestamp(row, 15)?,
        completed_at: parse_timestamp(row, 16)?,
    })
}

/// SQLite's `CURRENT_TIMESTAMP` yields `YYYY-MM-DD HH:MM:SS` (UTC, no
/// offset); values written explicitly elsewhere use RFC 3339. Both are
/// accepted since the store never distinguishes the two at write time.
fn parse_timestamp(row: &Row, index: i32) -> DbResult<Option<DateTime<Utc>>> {
    let Some(raw) = row.get::<Option<String>>(index)? else {
        return Ok(None);
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }

    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S")
        .map(|naive| Some(DateTime::from_naive_utc_and_offset(naive, Utc)))
        .map_err(|e| DbError::Mapping(format!("unparseable timestamp '{raw}': {e}")))
}
