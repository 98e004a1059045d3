//! [crates/models/src/queue.rs]
//! =================================================================
//! APARATO: QUEUE DOMAIN MODELS (ESTRATO L2)
//! RESPONSABILIDAD: CONTRATO DE ENTRADAS DEL IMPORT QUEUE
//! =================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a single `import_queue` row.
///
/// There is no separate `retrying` status — a retryable failure simply
/// leaves a row `Pending` with an incremented `retry_count`. `Paused`
/// is an administrative per-row state distinct from the manager-level
/// pause flag, set only through explicit admin actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Paused,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Processing => "processing",
            QueueStatus::Completed => "completed",
            QueueStatus::Failed => "failed",
            QueueStatus::Paused => "paused",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(QueueStatus::Pending),
            "processing" => Some(QueueStatus::Processing),
            "completed" => Some(QueueStatus::Completed),
            "failed" => Some(QueueStatus::Failed),
            "paused" => Some(QueueStatus::Paused),
            _ => None,
        }
    }

    /// True for the two terminal states: a second submission of the
    /// same path resets counters instead of merely nudging priority.
    pub fn is_terminal(&self) -> bool {
        matches!(self, QueueStatus::Completed | QueueStatus::Failed)
    }

    /// "Queued" for statistics purposes unifies pending and paused rows.
    pub fn counts_as_queued(&self) -> bool {
        matches!(self, QueueStatus::Pending | QueueStatus::Paused)
    }
}

/// One row of the `import_queue` relation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: i64,
    /// Unique submission path; the natural key for upsert semantics.
    pub submission_path: String,
    pub relative_path: Option<String>,
    pub storage_path: Option<String>,
    pub category: Option<String>,
    /// Lower is more urgent.
    pub priority: i32,
    pub status: QueueStatus,
    pub retry_count: i32,
    pub max_retries: i32,
    pub error_message: Option<String>,
    pub batch_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub file_size: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A submission accepted by the repository's `enqueue`/`batch_enqueue`.
/// Distinct from `QueueEntry` because a submitter never supplies an id,
/// status, or timestamps — those are assigned by the repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewQueueEntry {
    pub submission_path: String,
    pub relative_path: Option<String>,
    pub storage_path: Option<String>,
    pub category: Option<String>,
    pub priority: i32,
    pub max_retries: i32,
    pub batch_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub file_size: Option<i64>,
}

impl NewQueueEntry {
    /// Convenience constructor for scanner submissions, which carry no
    /// batch id, metadata, or non-default retry budget.
    pub fn from_scanner(submission_path: impl Into<String>, priority: i32) -> Self {
        Self {
            submission_path: submission_path.into(),
            relative_path: None,
            storage_path: None,
            category: None,
            priority,
            max_retries: 3,
            batch_id: None,
            metadata: None,
            file_size: None,
        }
    }
}

/// Statistics derived from the `import_queue` relation on read;
/// recompute-on-read is canonical, no persisted snapshot is treated
/// as authoritative.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub total_queued: i64,
    pub total_processing: i64,
    pub total_completed: i64,
    pub total_failed: i64,
    pub avg_processing_time_ms: Option<f64>,
}
