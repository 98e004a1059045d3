//! [crates/models/src/health.rs]
//! =================================================================
//! APARATO: HEALTH DOMAIN MODELS (ESTRATO L2)
//! RESPONSABILIDAD: CONTRATO DE REGISTROS DE SALUD DE ARTEFACTOS
//! =================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a single `file_health` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Pending,
    Checking,
    Healthy,
    Partial,
    RepairTriggered,
    Corrupted,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Pending => "pending",
            HealthStatus::Checking => "checking",
            HealthStatus::Healthy => "healthy",
            HealthStatus::Partial => "partial",
            HealthStatus::RepairTriggered => "repair_triggered",
            HealthStatus::Corrupted => "corrupted",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(HealthStatus::Pending),
            "checking" => Some(HealthStatus::Checking),
            "healthy" => Some(HealthStatus::Healthy),
            "partial" => Some(HealthStatus::Partial),
            "repair_triggered" => Some(HealthStatus::RepairTriggered),
            "corrupted" => Some(HealthStatus::Corrupted),
            _ => None,
        }
    }

    /// Terminal from the scheduler's viewpoint: never returned by
    /// `GetDue`, never re-scheduled.
    pub fn is_terminal(&self) -> bool {
        matches!(self, HealthStatus::Corrupted)
    }
}

/// One row of the `file_health` relation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthRecord {
    pub id: i64,
    pub file_path: String,
    pub library_path: Option<String>,
    pub status: HealthStatus,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub error_details: Option<String>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub repair_retry_count: i32,
    pub max_repair_retries: i32,
    pub source_nzb_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub release_date: Option<DateTime<Utc>>,
    pub scheduled_check_at: Option<DateTime<Utc>>,
    /// Higher is more urgent — the inverse convention of
    /// `QueueEntry::priority`; each relation defines its own sense.
    pub priority: i32,
}

/// The verdict an external `HealthChecker` collaborator returns for one
/// record. Carried as data here so the health scheduler
/// can match on it without depending on the collaborator trait itself.
#[derive(Debug, Clone)]
pub enum HealthVerdict {
    Healthy,
    Partial(String),
    RepairTriggered(String),
    Corrupted(String),
}
