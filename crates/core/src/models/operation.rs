use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DateRange;

/// Terminal and in-flight states of a sync operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Pending,
    Running,
    Succeeded,
    /// Some schools failed; the rest completed and their data stands.
    Partial,
    Failed,
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationStatus::Succeeded | OperationStatus::Partial | OperationStatus::Failed
        )
    }
}

/// Per-school progress within one operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SchoolSyncStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SchoolProgress {
    pub school_id: String,
    pub status: SchoolSyncStatus,
    pub students_synced: i64,
    pub events_loaded: i64,
    pub records_rejected: i64,
    /// Summary-only records with no daily resolution; counted, never
    /// loaded as events.
    pub records_low_fidelity: i64,
    pub reconciliation_gaps: i64,
}

impl SchoolProgress {
    pub fn pending(school_id: &str) -> Self {
        Self {
            school_id: school_id.to_string(),
            status: SchoolSyncStatus::Pending,
            students_synced: 0,
            events_loaded: 0,
            records_rejected: 0,
            records_low_fidelity: 0,
            reconciliation_gaps: 0,
        }
    }
}

/// One recorded failure within an operation. `school_id` is None for
/// operation-level errors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OperationError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub school_id: Option<String>,
    pub kind: String,
    pub message: String,
}

/// Bookkeeping record for one orchestration run, retained for audit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncOperation {
    pub id: i64,
    pub status: OperationStatus,
    pub range: DateRange,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub schools: Vec<SchoolProgress>,
    #[serde(default)]
    pub errors: Vec<OperationError>,
}
