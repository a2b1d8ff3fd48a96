use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    attendance::AttendanceEvent,
    operation::{OperationError, OperationStatus, SchoolProgress, SyncOperation},
    school::SchoolMapping,
    student::StudentIdentity,
    summary::{DailyGradeSummary, SummaryScope},
    DateRange,
};
use chrono::NaiveDate;

/// Outcome counters for one persisted batch of attendance events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchCounts {
    pub inserted: u64,
    pub updated: u64,
    pub failed: u64,
}

#[async_trait]
pub trait SchoolRepository: Send + Sync {
    async fn upsert_school(&self, school: &SchoolMapping) -> Result<()>;
    /// Register an additional source code for a school. Fails if the
    /// alias already belongs to a different school.
    async fn add_school_alias(&self, school_id: &str, alias: &str) -> Result<()>;
    async fn get_school(&self, id: &str) -> Result<Option<SchoolMapping>>;
    async fn list_schools(&self) -> Result<Vec<SchoolMapping>>;
    async fn deactivate_school(&self, id: &str) -> Result<bool>;
}

#[async_trait]
pub trait StudentRepository: Send + Sync {
    /// Insert or update a student identity keyed by source id. When
    /// the student's school changes, the previous identity row is
    /// marked superseded and a new one is inserted.
    async fn upsert_student_identity(&self, student: &StudentIdentity) -> Result<()>;
    async fn list_students(&self) -> Result<Vec<StudentIdentity>>;
    async fn get_active_student_by_source(
        &self,
        source_student_id: &str,
    ) -> Result<Option<StudentIdentity>>;
}

#[async_trait]
pub trait AttendanceRepository: Send + Sync {
    /// Upsert a batch of events in one transaction. Per-record
    /// failures are counted, not propagated; a batch-level failure
    /// rolls the batch back and returns the error.
    async fn upsert_attendance_batch(&self, events: &[AttendanceEvent]) -> Result<BatchCounts>;
    async fn list_events(&self, scope: &SummaryScope) -> Result<Vec<AttendanceEvent>>;
    async fn delete_events(&self, scope: &SummaryScope) -> Result<u64>;
}

#[async_trait]
pub trait SummaryRepository: Send + Sync {
    async fn upsert_summary(&self, summary: &DailyGradeSummary) -> Result<()>;
    async fn delete_summaries(&self, scope: &SummaryScope) -> Result<u64>;
    async fn list_summaries(&self, scope: &SummaryScope) -> Result<Vec<DailyGradeSummary>>;
    /// Summaries for one (school, grade) on or after a date, date
    /// ascending. Used to roll cumulative counts forward.
    async fn list_summaries_from(
        &self,
        school_id: &str,
        grade: &str,
        from: NaiveDate,
    ) -> Result<Vec<DailyGradeSummary>>;
    /// Cumulative absence count of the last summary strictly before a
    /// date, or zero when there is none. `since` bounds the lookup
    /// below, so summaries from before the school year start are not
    /// used as seeds.
    async fn last_cumulative_before(
        &self,
        school_id: &str,
        grade: &str,
        date: NaiveDate,
        since: Option<NaiveDate>,
    ) -> Result<i64>;
}

#[async_trait]
pub trait OperationRepository: Send + Sync {
    async fn create_operation(&self, range: &DateRange, status: OperationStatus) -> Result<i64>;
    async fn update_operation_status(
        &self,
        operation_id: i64,
        status: OperationStatus,
    ) -> Result<()>;
    async fn upsert_school_progress(
        &self,
        operation_id: i64,
        progress: &SchoolProgress,
    ) -> Result<()>;
    async fn add_operation_error(&self, operation_id: i64, error: &OperationError) -> Result<()>;
    async fn get_operation(&self, operation_id: i64) -> Result<Option<SyncOperation>>;
    async fn get_latest_operation(&self) -> Result<Option<SyncOperation>>;
    async fn list_running_operations(&self) -> Result<Vec<SyncOperation>>;
}

/// Everything the sync pipeline needs from storage.
pub trait RollcallRepository:
    SchoolRepository
    + StudentRepository
    + AttendanceRepository
    + SummaryRepository
    + OperationRepository
{
}
