//! Sync orchestration: drives enrollment refresh, attendance fetch,
//! reconciliation, loading, and aggregation across schools.
//!
//! Schools are processed sequentially (the upstream rate limit makes
//! parallelism pointless) and isolated from each other: one school's
//! failure marks it failed and moves on. The single exception is an
//! authentication failure, which aborts the whole operation since no
//! further request can succeed. Every run is recorded as a sync
//! operation with per-school progress, so failed or interrupted runs
//! can be resumed without redoing completed schools.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::aggregate::{Aggregator, SchoolCalendar};
use crate::db::repository::RollcallRepository;
use crate::error::{Result, RollcallError};
use crate::loader::BulkLoader;
use crate::models::operation::{
    OperationError, OperationStatus, SchoolProgress, SchoolSyncStatus, SyncOperation,
};
use crate::models::school::SchoolMapping;
use crate::models::student::StudentIdentity;
use crate::models::DateRange;
use crate::normalize::normalize;
use crate::reconcile::Resolver;
use crate::source::{fetch_attendance_with_fallback, AttendanceSource};

/// What one sync run covers. An empty school list means every active
/// school.
#[derive(Debug, Clone)]
pub struct SyncScope {
    pub school_ids: Vec<String>,
    pub range: DateRange,
}

pub struct SyncOrchestrator<'a, R: ?Sized> {
    repository: &'a R,
    calendar: SchoolCalendar,
    batch_size: usize,
    cancel: Arc<AtomicBool>,
}

impl<'a, R> SyncOrchestrator<'a, R>
where
    R: RollcallRepository + ?Sized,
{
    pub fn new(repository: &'a R, calendar: SchoolCalendar, batch_size: usize) -> Self {
        Self {
            repository,
            calendar,
            batch_size,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for requesting cancellation from another task. The
    /// current school finishes; remaining schools are skipped and
    /// completed data stands.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Run a new sync operation over the scope. Only overlapping
    /// (school, date) scope conflicts: concurrent operations over
    /// disjoint school sets are allowed even on the same dates.
    pub async fn run(
        &self,
        source: &dyn AttendanceSource,
        scope: &SyncScope,
    ) -> Result<SyncOperation> {
        let schools = self.select_schools(scope).await?;

        for running in self.repository.list_running_operations().await? {
            if !running.range.overlaps(&scope.range) {
                continue;
            }
            let shared = running
                .schools
                .iter()
                .any(|p| schools.iter().any(|s| s.id == p.school_id));
            if shared {
                return Err(RollcallError::Validation(format!(
                    "operation {} is already running over an overlapping (school, date) scope",
                    running.id
                )));
            }
        }
        let operation_id = self
            .repository
            .create_operation(&scope.range, OperationStatus::Running)
            .await?;
        for school in &schools {
            self.repository
                .upsert_school_progress(operation_id, &SchoolProgress::pending(&school.id))
                .await?;
        }

        info!(
            operation_id,
            schools = schools.len(),
            start = %scope.range.start,
            end = %scope.range.end,
            "sync operation started"
        );
        self.execute(operation_id, &schools, &scope.range, source)
            .await
    }

    /// Resume a failed, partial, or interrupted operation, skipping
    /// schools that already completed.
    pub async fn resume(
        &self,
        source: &dyn AttendanceSource,
        operation_id: i64,
    ) -> Result<SyncOperation> {
        let operation = self
            .repository
            .get_operation(operation_id)
            .await?
            .ok_or_else(|| {
                RollcallError::Validation(format!("operation {operation_id} does not exist"))
            })?;
        if operation.status == OperationStatus::Succeeded {
            return Err(RollcallError::Validation(format!(
                "operation {operation_id} already succeeded"
            )));
        }

        let mut schools = Vec::new();
        for progress in &operation.schools {
            if progress.status == SchoolSyncStatus::Completed {
                continue;
            }
            match self.repository.get_school(&progress.school_id).await? {
                Some(school) => schools.push(school),
                None => warn!(school_id = %progress.school_id, "school no longer exists, skipping"),
            }
        }

        self.repository
            .update_operation_status(operation_id, OperationStatus::Running)
            .await?;
        info!(operation_id, remaining = schools.len(), "resuming sync operation");
        self.execute(operation_id, &schools, &operation.range, source)
            .await
    }

    async fn select_schools(&self, scope: &SyncScope) -> Result<Vec<SchoolMapping>> {
        let all = self.repository.list_schools().await?;
        if scope.school_ids.is_empty() {
            return Ok(all.into_iter().filter(|s| s.active).collect());
        }
        let mut selected = Vec::with_capacity(scope.school_ids.len());
        for id in &scope.school_ids {
            let school = all.iter().find(|s| &s.id == id).ok_or_else(|| {
                RollcallError::Validation(format!("unknown school id {id:?}"))
            })?;
            selected.push(school.clone());
        }
        Ok(selected)
    }

    async fn execute(
        &self,
        operation_id: i64,
        schools: &[SchoolMapping],
        range: &DateRange,
        source: &dyn AttendanceSource,
    ) -> Result<SyncOperation> {
        let mut touched: BTreeSet<(String, chrono::NaiveDate)> = BTreeSet::new();

        for school in schools {
            if self.cancel.load(Ordering::SeqCst) {
                warn!(operation_id, "cancellation requested, skipping remaining schools");
                self.record_error(operation_id, None, "cancelled", "sync cancelled by operator")
                    .await?;
                break;
            }

            match self
                .sync_school(operation_id, school, range, source, &mut touched)
                .await
            {
                Ok(progress) => {
                    self.repository
                        .upsert_school_progress(operation_id, &progress)
                        .await?;
                }
                Err(e) if e.is_fatal() => {
                    error!(operation_id, school_id = %school.id, error = %e, "fatal error, aborting operation");
                    self.record_error(operation_id, Some(&school.id), "auth", &e.to_string())
                        .await?;
                    self.mark_school_failed(operation_id, &school.id).await?;
                    return self.finalize(operation_id, &touched, true).await;
                }
                Err(e) => {
                    warn!(operation_id, school_id = %school.id, error = %e, "school sync failed");
                    self.record_error(operation_id, Some(&school.id), error_kind(&e), &e.to_string())
                        .await?;
                    self.mark_school_failed(operation_id, &school.id).await?;
                }
            }
        }

        self.finalize(operation_id, &touched, false).await
    }

    async fn sync_school(
        &self,
        operation_id: i64,
        school: &SchoolMapping,
        range: &DateRange,
        source: &dyn AttendanceSource,
        touched: &mut BTreeSet<(String, chrono::NaiveDate)>,
    ) -> Result<SchoolProgress> {
        let enrollment = source.fetch_enrollment(&school.source_code).await?;
        for raw in &enrollment {
            let id = format!("stu-{}-{}", school.id, raw.student_id);
            self.repository
                .upsert_student_identity(&StudentIdentity::new(
                    &id,
                    &raw.student_id,
                    &school.id,
                    &raw.grade,
                ))
                .await?;
        }

        // Persist the enrollment count now, so a failure later in the
        // school's pipeline does not lose it.
        let mut interim = SchoolProgress::pending(&school.id);
        interim.students_synced = enrollment.len() as i64;
        self.repository
            .upsert_school_progress(operation_id, &interim)
            .await?;

        // Identities may have changed above; rebuild the index.
        let resolver = Resolver::new(
            &self.repository.list_schools().await?,
            &self.repository.list_students().await?,
        )?;

        let raw = fetch_attendance_with_fallback(source, &school.source_code, range).await?;
        let batch = normalize(&raw, school.period_count as usize);
        let (events, gaps) = resolver.resolve_events(&school.source_code, batch.events);

        for gap in &gaps {
            self.record_error(
                operation_id,
                Some(&school.id),
                "reconciliation_gap",
                &format!("unresolved {} code {:?}", gap.kind.as_str(), gap.raw_code),
            )
            .await?;
        }

        let outcome = BulkLoader::new(self.batch_size)
            .load(self.repository, &events)
            .await;
        for failed_batch in outcome.batches.iter().filter(|b| b.error.is_some()) {
            self.record_error(
                operation_id,
                Some(&school.id),
                "load",
                failed_batch.error.as_deref().unwrap_or("batch failed"),
            )
            .await?;
        }

        for event in &events {
            touched.insert((event.school_id.clone(), event.date));
        }

        info!(
            operation_id,
            school_id = %school.id,
            shape = raw.shape().as_str(),
            students = enrollment.len(),
            loaded = outcome.loaded(),
            rejected = batch.rejected,
            low_fidelity = batch.low_fidelity,
            gaps = gaps.len(),
            "school sync complete"
        );

        Ok(SchoolProgress {
            school_id: school.id.clone(),
            status: SchoolSyncStatus::Completed,
            students_synced: enrollment.len() as i64,
            events_loaded: outcome.loaded() as i64,
            records_rejected: (batch.rejected + outcome.failed) as i64,
            records_low_fidelity: batch.low_fidelity as i64,
            reconciliation_gaps: gaps.len() as i64,
        })
    }

    async fn finalize(
        &self,
        operation_id: i64,
        touched: &BTreeSet<(String, chrono::NaiveDate)>,
        fatal: bool,
    ) -> Result<SyncOperation> {
        let cells: Vec<(String, chrono::NaiveDate)> = touched.iter().cloned().collect();
        Aggregator::new(self.repository, self.calendar.clone())
            .recompute_incremental(&cells)
            .await?;

        let operation = self
            .repository
            .get_operation(operation_id)
            .await?
            .ok_or_else(|| {
                RollcallError::Validation(format!("operation {operation_id} disappeared"))
            })?;

        let completed = operation
            .schools
            .iter()
            .filter(|s| s.status == SchoolSyncStatus::Completed)
            .count();
        let status = if fatal {
            OperationStatus::Failed
        } else if completed == operation.schools.len() {
            OperationStatus::Succeeded
        } else if completed > 0 {
            OperationStatus::Partial
        } else {
            OperationStatus::Failed
        };

        self.repository
            .update_operation_status(operation_id, status)
            .await?;
        info!(operation_id, status = ?status, "sync operation finished");

        self.repository
            .get_operation(operation_id)
            .await?
            .ok_or_else(|| {
                RollcallError::Validation(format!("operation {operation_id} disappeared"))
            })
    }

    /// Flip the school's status to Failed, keeping whatever counters
    /// it accumulated before the failure.
    async fn mark_school_failed(&self, operation_id: i64, school_id: &str) -> Result<()> {
        let existing = self
            .repository
            .get_operation(operation_id)
            .await?
            .and_then(|op| op.schools.into_iter().find(|p| p.school_id == school_id));
        let mut progress = existing.unwrap_or_else(|| SchoolProgress::pending(school_id));
        progress.status = SchoolSyncStatus::Failed;
        self.repository
            .upsert_school_progress(operation_id, &progress)
            .await
    }

    async fn record_error(
        &self,
        operation_id: i64,
        school_id: Option<&str>,
        kind: &str,
        message: &str,
    ) -> Result<()> {
        self.repository
            .add_operation_error(
                operation_id,
                &OperationError {
                    school_id: school_id.map(String::from),
                    kind: kind.to_string(),
                    message: message.to_string(),
                },
            )
            .await
    }
}

fn error_kind(e: &RollcallError) -> &'static str {
    match e {
        RollcallError::Transient(_) => "transient",
        RollcallError::UnsupportedShape(_) => "unsupported_shape",
        RollcallError::FatalAuth(_) => "auth",
        RollcallError::Validation(_) => "validation",
        RollcallError::Load(_) => "load",
        RollcallError::Database(_) => "database",
        _ => "source",
    }
}
