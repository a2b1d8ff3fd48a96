use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Row, SqlitePool};

use crate::error::{Result, RollcallError};
use crate::models::{
    attendance::{AttendanceEvent, EndpointShape, PresenceState, Provenance},
    operation::{OperationError, OperationStatus, SchoolProgress, SchoolSyncStatus, SyncOperation},
    school::SchoolMapping,
    student::StudentIdentity,
    summary::{DailyGradeSummary, SummaryScope},
    DateRange,
};

use super::repository::{
    AttendanceRepository, BatchCounts, OperationRepository, RollcallRepository, SchoolRepository,
    StudentRepository, SummaryRepository,
};

#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn load_operation_details(&self, op: &mut SyncOperation) -> Result<()> {
        let school_rows = sqlx::query(
            "SELECT school_id, status, students_synced, events_loaded, records_rejected,
                    records_low_fidelity, reconciliation_gaps
             FROM operation_schools WHERE operation_id = ?1 ORDER BY school_id",
        )
        .bind(op.id)
        .fetch_all(&self.pool)
        .await?;
        op.schools = school_rows
            .iter()
            .map(|r| SchoolProgress {
                school_id: r.get("school_id"),
                status: parse_school_sync_status(r.get("status")),
                students_synced: r.get("students_synced"),
                events_loaded: r.get("events_loaded"),
                records_rejected: r.get("records_rejected"),
                records_low_fidelity: r.get("records_low_fidelity"),
                reconciliation_gaps: r.get("reconciliation_gaps"),
            })
            .collect();

        let error_rows = sqlx::query(
            "SELECT school_id, kind, message FROM operation_errors WHERE operation_id = ?1 ORDER BY id",
        )
        .bind(op.id)
        .fetch_all(&self.pool)
        .await?;
        op.errors = error_rows
            .iter()
            .map(|r| OperationError {
                school_id: r.get("school_id"),
                kind: r.get("kind"),
                message: r.get("message"),
            })
            .collect();

        Ok(())
    }

    async fn hydrate_operation(&self, row: sqlx::sqlite::SqliteRow) -> Result<SyncOperation> {
        let mut op = SyncOperation {
            id: row.get("id"),
            status: parse_operation_status(row.get("status")),
            range: DateRange {
                start: parse_date(row.get("range_start")),
                end: parse_date(row.get("range_end")),
            },
            started_at: parse_datetime(row.get("started_at")),
            completed_at: row
                .get::<Option<String>, _>("completed_at")
                .map(|s| parse_datetime(&s)),
            schools: Vec::new(),
            errors: Vec::new(),
        };
        self.load_operation_details(&mut op).await?;
        Ok(op)
    }
}

impl RollcallRepository for SqliteRepository {}

// -- Helper functions for parsing enums and dates from DB strings --

fn parse_presence_state(s: &str) -> PresenceState {
    match s {
        "present" => PresenceState::Present,
        "absent_excused" => PresenceState::AbsentExcused,
        "absent_unexcused" => PresenceState::AbsentUnexcused,
        "partial" => PresenceState::Partial,
        "tardy" => PresenceState::Tardy,
        _ => PresenceState::Present,
    }
}

fn presence_state_to_str(s: &PresenceState) -> &'static str {
    match s {
        PresenceState::Present => "present",
        PresenceState::AbsentExcused => "absent_excused",
        PresenceState::AbsentUnexcused => "absent_unexcused",
        PresenceState::Partial => "partial",
        PresenceState::Tardy => "tardy",
    }
}

fn parse_provenance(s: &str) -> Provenance {
    match s {
        "synthesized" => Provenance::Synthesized,
        _ => Provenance::Observed,
    }
}

fn provenance_to_str(p: &Provenance) -> &'static str {
    match p {
        Provenance::Observed => "observed",
        Provenance::Synthesized => "synthesized",
    }
}

fn parse_shape(s: &str) -> EndpointShape {
    match s {
        "detail_history" => EndpointShape::DetailHistory,
        "summary_only" => EndpointShape::SummaryOnly,
        _ => EndpointShape::DayLevel,
    }
}

fn parse_operation_status(s: &str) -> OperationStatus {
    match s {
        "pending" => OperationStatus::Pending,
        "running" => OperationStatus::Running,
        "succeeded" => OperationStatus::Succeeded,
        "partial" => OperationStatus::Partial,
        _ => OperationStatus::Failed,
    }
}

fn operation_status_to_str(s: &OperationStatus) -> &'static str {
    match s {
        OperationStatus::Pending => "pending",
        OperationStatus::Running => "running",
        OperationStatus::Succeeded => "succeeded",
        OperationStatus::Partial => "partial",
        OperationStatus::Failed => "failed",
    }
}

fn parse_school_sync_status(s: &str) -> SchoolSyncStatus {
    match s {
        "completed" => SchoolSyncStatus::Completed,
        "failed" => SchoolSyncStatus::Failed,
        _ => SchoolSyncStatus::Pending,
    }
}

fn school_sync_status_to_str(s: &SchoolSyncStatus) -> &'static str {
    match s {
        SchoolSyncStatus::Pending => "pending",
        SchoolSyncStatus::Completed => "completed",
        SchoolSyncStatus::Failed => "failed",
    }
}

fn parse_date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap_or(NaiveDate::MIN)
}

fn date_to_str(d: &NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn periods_to_json(periods: &[PresenceState]) -> String {
    let codes: Vec<&str> = periods.iter().map(presence_state_to_str).collect();
    serde_json::to_string(&codes).unwrap_or_else(|_| "[]".to_string())
}

fn periods_from_json(s: &str) -> Vec<PresenceState> {
    let codes: Vec<String> = serde_json::from_str(s).unwrap_or_default();
    codes.iter().map(|c| parse_presence_state(c)).collect()
}

fn row_to_event(r: &sqlx::sqlite::SqliteRow) -> AttendanceEvent {
    AttendanceEvent {
        student_id: r.get("student_id"),
        school_id: r.get("school_id"),
        date: parse_date(r.get("date")),
        state: parse_presence_state(r.get("state")),
        periods: periods_from_json(r.get("periods")),
        provenance: parse_provenance(r.get("provenance")),
        source_shape: parse_shape(r.get("source_shape")),
    }
}

fn row_to_summary(r: &sqlx::sqlite::SqliteRow) -> DailyGradeSummary {
    DailyGradeSummary {
        school_id: r.get("school_id"),
        grade: r.get("grade"),
        date: parse_date(r.get("date")),
        total: r.get("total"),
        present: r.get("present"),
        absent: r.get("absent"),
        tardy: r.get("tardy"),
        excused: r.get("excused"),
        unexcused: r.get("unexcused"),
        daily_absences: r.get("daily_absences"),
        cumulative_absences: r.get("cumulative_absences"),
        attendance_rate: r.get("attendance_rate"),
    }
}

fn row_to_student(r: &sqlx::sqlite::SqliteRow) -> StudentIdentity {
    StudentIdentity {
        id: r.get("id"),
        source_student_id: r.get("source_student_id"),
        school_id: r.get("school_id"),
        grade: r.get("grade"),
        superseded: r.get::<i64, _>("superseded") != 0,
        superseded_at: r
            .get::<Option<String>, _>("superseded_at")
            .map(|s| parse_datetime(&s)),
    }
}

#[async_trait]
impl SchoolRepository for SqliteRepository {
    async fn upsert_school(&self, school: &SchoolMapping) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO schools (id, name, source_code, period_count, active)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                source_code = excluded.source_code,
                period_count = excluded.period_count,
                active = excluded.active",
        )
        .bind(&school.id)
        .bind(&school.name)
        .bind(&school.source_code)
        .bind(school.period_count as i64)
        .bind(school.active as i64)
        .execute(&mut *tx)
        .await?;

        for alias in &school.aliases {
            sqlx::query(
                "INSERT INTO school_aliases (alias, school_id) VALUES (?1, ?2)
                 ON CONFLICT(alias) DO NOTHING",
            )
            .bind(alias)
            .bind(&school.id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn add_school_alias(&self, school_id: &str, alias: &str) -> Result<()> {
        let existing =
            sqlx::query("SELECT school_id FROM school_aliases WHERE alias = ?1")
                .bind(alias)
                .fetch_optional(&self.pool)
                .await?;
        if let Some(row) = existing {
            let owner: String = row.get("school_id");
            if owner != school_id {
                return Err(RollcallError::Validation(format!(
                    "alias {alias:?} already belongs to school {owner}"
                )));
            }
            return Ok(());
        }
        sqlx::query("INSERT INTO school_aliases (alias, school_id) VALUES (?1, ?2)")
            .bind(alias)
            .bind(school_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_school(&self, id: &str) -> Result<Option<SchoolMapping>> {
        let row = sqlx::query(
            "SELECT id, name, source_code, period_count, active FROM schools WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(r) = row else {
            return Ok(None);
        };

        let alias_rows =
            sqlx::query("SELECT alias FROM school_aliases WHERE school_id = ?1 ORDER BY alias")
                .bind(id)
                .fetch_all(&self.pool)
                .await?;

        Ok(Some(SchoolMapping {
            id: r.get("id"),
            name: r.get("name"),
            source_code: r.get("source_code"),
            period_count: r.get::<i64, _>("period_count") as u32,
            active: r.get::<i64, _>("active") != 0,
            aliases: alias_rows.iter().map(|a| a.get("alias")).collect(),
        }))
    }

    async fn list_schools(&self) -> Result<Vec<SchoolMapping>> {
        let rows = sqlx::query(
            "SELECT id, name, source_code, period_count, active FROM schools ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        let alias_rows =
            sqlx::query("SELECT alias, school_id FROM school_aliases ORDER BY alias")
                .fetch_all(&self.pool)
                .await?;

        let mut schools: Vec<SchoolMapping> = rows
            .iter()
            .map(|r| SchoolMapping {
                id: r.get("id"),
                name: r.get("name"),
                source_code: r.get("source_code"),
                period_count: r.get::<i64, _>("period_count") as u32,
                active: r.get::<i64, _>("active") != 0,
                aliases: Vec::new(),
            })
            .collect();
        for row in &alias_rows {
            let school_id: String = row.get("school_id");
            if let Some(school) = schools.iter_mut().find(|s| s.id == school_id) {
                school.aliases.push(row.get("alias"));
            }
        }
        Ok(schools)
    }

    async fn deactivate_school(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE schools SET active = 0 WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl StudentRepository for SqliteRepository {
    async fn upsert_student_identity(&self, student: &StudentIdentity) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query(
            "SELECT row_id, id, school_id FROM students
             WHERE source_student_id = ?1 AND superseded = 0",
        )
        .bind(&student.source_student_id)
        .fetch_optional(&mut *tx)
        .await?;

        match existing {
            Some(row) => {
                let current_school: String = row.get("school_id");
                if current_school == student.school_id {
                    let row_id: i64 = row.get("row_id");
                    sqlx::query("UPDATE students SET grade = ?1 WHERE row_id = ?2")
                        .bind(&student.grade)
                        .bind(row_id)
                        .execute(&mut *tx)
                        .await?;
                } else {
                    // School transfer: retire the old identity, keep
                    // its rows attributed, and start a fresh one.
                    let row_id: i64 = row.get("row_id");
                    sqlx::query(
                        "UPDATE students SET superseded = 1, superseded_at = ?1 WHERE row_id = ?2",
                    )
                    .bind(Utc::now().to_rfc3339())
                    .bind(row_id)
                    .execute(&mut *tx)
                    .await?;

                    sqlx::query(
                        "INSERT INTO students (id, source_student_id, school_id, grade, superseded)
                         VALUES (?1, ?2, ?3, ?4, 0)",
                    )
                    .bind(&student.id)
                    .bind(&student.source_student_id)
                    .bind(&student.school_id)
                    .bind(&student.grade)
                    .execute(&mut *tx)
                    .await?;
                }
            }
            None => {
                sqlx::query(
                    "INSERT INTO students (id, source_student_id, school_id, grade, superseded)
                     VALUES (?1, ?2, ?3, ?4, 0)",
                )
                .bind(&student.id)
                .bind(&student.source_student_id)
                .bind(&student.school_id)
                .bind(&student.grade)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_students(&self) -> Result<Vec<StudentIdentity>> {
        let rows = sqlx::query(
            "SELECT id, source_student_id, school_id, grade, superseded, superseded_at
             FROM students ORDER BY row_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_student).collect())
    }

    async fn get_active_student_by_source(
        &self,
        source_student_id: &str,
    ) -> Result<Option<StudentIdentity>> {
        let row = sqlx::query(
            "SELECT id, source_student_id, school_id, grade, superseded, superseded_at
             FROM students WHERE source_student_id = ?1 AND superseded = 0",
        )
        .bind(source_student_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_student))
    }
}

#[async_trait]
impl AttendanceRepository for SqliteRepository {
    async fn upsert_attendance_batch(&self, events: &[AttendanceEvent]) -> Result<BatchCounts> {
        let mut counts = BatchCounts::default();
        let mut tx = self.pool.begin().await?;

        for event in events {
            let exists = sqlx::query(
                "SELECT 1 FROM attendance_events WHERE student_id = ?1 AND date = ?2",
            )
            .bind(&event.student_id)
            .bind(date_to_str(&event.date))
            .fetch_optional(&mut *tx)
            .await?
            .is_some();

            let result = sqlx::query(
                "INSERT INTO attendance_events (student_id, date, school_id, state, periods, provenance, source_shape)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(student_id, date) DO UPDATE SET
                    school_id = excluded.school_id,
                    state = excluded.state,
                    periods = excluded.periods,
                    provenance = excluded.provenance,
                    source_shape = excluded.source_shape",
            )
            .bind(&event.student_id)
            .bind(date_to_str(&event.date))
            .bind(&event.school_id)
            .bind(presence_state_to_str(&event.state))
            .bind(periods_to_json(&event.periods))
            .bind(provenance_to_str(&event.provenance))
            .bind(event.source_shape.as_str())
            .execute(&mut *tx)
            .await;

            match result {
                Ok(_) if exists => counts.updated += 1,
                Ok(_) => counts.inserted += 1,
                Err(e) => {
                    tracing::warn!(
                        student_id = %event.student_id,
                        date = %event.date,
                        error = %e,
                        "failed to persist attendance event"
                    );
                    counts.failed += 1;
                }
            }
        }

        tx.commit().await?;
        Ok(counts)
    }

    async fn list_events(&self, scope: &SummaryScope) -> Result<Vec<AttendanceEvent>> {
        let rows = match &scope.school_id {
            Some(school_id) => {
                sqlx::query(
                    "SELECT student_id, date, school_id, state, periods, provenance, source_shape
                     FROM attendance_events
                     WHERE school_id = ?1 AND date >= ?2 AND date <= ?3
                     ORDER BY date, student_id",
                )
                .bind(school_id)
                .bind(date_to_str(&scope.range.start))
                .bind(date_to_str(&scope.range.end))
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT student_id, date, school_id, state, periods, provenance, source_shape
                     FROM attendance_events
                     WHERE date >= ?1 AND date <= ?2
                     ORDER BY date, student_id",
                )
                .bind(date_to_str(&scope.range.start))
                .bind(date_to_str(&scope.range.end))
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows.iter().map(row_to_event).collect())
    }

    async fn delete_events(&self, scope: &SummaryScope) -> Result<u64> {
        let result = match &scope.school_id {
            Some(school_id) => {
                sqlx::query(
                    "DELETE FROM attendance_events
                     WHERE school_id = ?1 AND date >= ?2 AND date <= ?3",
                )
                .bind(school_id)
                .bind(date_to_str(&scope.range.start))
                .bind(date_to_str(&scope.range.end))
                .execute(&self.pool)
                .await?
            }
            None => {
                sqlx::query("DELETE FROM attendance_events WHERE date >= ?1 AND date <= ?2")
                    .bind(date_to_str(&scope.range.start))
                    .bind(date_to_str(&scope.range.end))
                    .execute(&self.pool)
                    .await?
            }
        };
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SummaryRepository for SqliteRepository {
    async fn upsert_summary(&self, summary: &DailyGradeSummary) -> Result<()> {
        sqlx::query(
            "INSERT INTO daily_grade_summaries
                (school_id, grade, date, total, present, absent, tardy, excused, unexcused,
                 daily_absences, cumulative_absences, attendance_rate)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(school_id, grade, date) DO UPDATE SET
                total = excluded.total,
                present = excluded.present,
                absent = excluded.absent,
                tardy = excluded.tardy,
                excused = excluded.excused,
                unexcused = excluded.unexcused,
                daily_absences = excluded.daily_absences,
                cumulative_absences = excluded.cumulative_absences,
                attendance_rate = excluded.attendance_rate",
        )
        .bind(&summary.school_id)
        .bind(&summary.grade)
        .bind(date_to_str(&summary.date))
        .bind(summary.total)
        .bind(summary.present)
        .bind(summary.absent)
        .bind(summary.tardy)
        .bind(summary.excused)
        .bind(summary.unexcused)
        .bind(summary.daily_absences)
        .bind(summary.cumulative_absences)
        .bind(summary.attendance_rate)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_summaries(&self, scope: &SummaryScope) -> Result<u64> {
        let result = match &scope.school_id {
            Some(school_id) => {
                sqlx::query(
                    "DELETE FROM daily_grade_summaries
                     WHERE school_id = ?1 AND date >= ?2 AND date <= ?3",
                )
                .bind(school_id)
                .bind(date_to_str(&scope.range.start))
                .bind(date_to_str(&scope.range.end))
                .execute(&self.pool)
                .await?
            }
            None => {
                sqlx::query("DELETE FROM daily_grade_summaries WHERE date >= ?1 AND date <= ?2")
                    .bind(date_to_str(&scope.range.start))
                    .bind(date_to_str(&scope.range.end))
                    .execute(&self.pool)
                    .await?
            }
        };
        Ok(result.rows_affected())
    }

    async fn list_summaries(&self, scope: &SummaryScope) -> Result<Vec<DailyGradeSummary>> {
        let rows = match &scope.school_id {
            Some(school_id) => {
                sqlx::query(
                    "SELECT * FROM daily_grade_summaries
                     WHERE school_id = ?1 AND date >= ?2 AND date <= ?3
                     ORDER BY school_id, grade, date",
                )
                .bind(school_id)
                .bind(date_to_str(&scope.range.start))
                .bind(date_to_str(&scope.range.end))
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT * FROM daily_grade_summaries
                     WHERE date >= ?1 AND date <= ?2
                     ORDER BY school_id, grade, date",
                )
                .bind(date_to_str(&scope.range.start))
                .bind(date_to_str(&scope.range.end))
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows.iter().map(row_to_summary).collect())
    }

    async fn list_summaries_from(
        &self,
        school_id: &str,
        grade: &str,
        from: NaiveDate,
    ) -> Result<Vec<DailyGradeSummary>> {
        let rows = sqlx::query(
            "SELECT * FROM daily_grade_summaries
             WHERE school_id = ?1 AND grade = ?2 AND date >= ?3
             ORDER BY date",
        )
        .bind(school_id)
        .bind(grade)
        .bind(date_to_str(&from))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_summary).collect())
    }

    async fn last_cumulative_before(
        &self,
        school_id: &str,
        grade: &str,
        date: NaiveDate,
        since: Option<NaiveDate>,
    ) -> Result<i64> {
        let row = match since {
            Some(floor) => {
                sqlx::query(
                    "SELECT cumulative_absences FROM daily_grade_summaries
                     WHERE school_id = ?1 AND grade = ?2 AND date < ?3 AND date >= ?4
                     ORDER BY date DESC LIMIT 1",
                )
                .bind(school_id)
                .bind(grade)
                .bind(date_to_str(&date))
                .bind(date_to_str(&floor))
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT cumulative_absences FROM daily_grade_summaries
                     WHERE school_id = ?1 AND grade = ?2 AND date < ?3
                     ORDER BY date DESC LIMIT 1",
                )
                .bind(school_id)
                .bind(grade)
                .bind(date_to_str(&date))
                .fetch_optional(&self.pool)
                .await?
            }
        };
        Ok(row.map(|r| r.get("cumulative_absences")).unwrap_or(0))
    }
}

#[async_trait]
impl OperationRepository for SqliteRepository {
    async fn create_operation(&self, range: &DateRange, status: OperationStatus) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO sync_operations (status, range_start, range_end, started_at)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(operation_status_to_str(&status))
        .bind(date_to_str(&range.start))
        .bind(date_to_str(&range.end))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn update_operation_status(
        &self,
        operation_id: i64,
        status: OperationStatus,
    ) -> Result<()> {
        if status.is_terminal() {
            sqlx::query("UPDATE sync_operations SET status = ?1, completed_at = ?2 WHERE id = ?3")
                .bind(operation_status_to_str(&status))
                .bind(Utc::now().to_rfc3339())
                .bind(operation_id)
                .execute(&self.pool)
                .await?;
        } else {
            sqlx::query("UPDATE sync_operations SET status = ?1 WHERE id = ?2")
                .bind(operation_status_to_str(&status))
                .bind(operation_id)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    async fn upsert_school_progress(
        &self,
        operation_id: i64,
        progress: &SchoolProgress,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO operation_schools
                (operation_id, school_id, status, students_synced, events_loaded,
                 records_rejected, records_low_fidelity, reconciliation_gaps)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(operation_id, school_id) DO UPDATE SET
                status = excluded.status,
                students_synced = excluded.students_synced,
                events_loaded = excluded.events_loaded,
                records_rejected = excluded.records_rejected,
                records_low_fidelity = excluded.records_low_fidelity,
                reconciliation_gaps = excluded.reconciliation_gaps",
        )
        .bind(operation_id)
        .bind(&progress.school_id)
        .bind(school_sync_status_to_str(&progress.status))
        .bind(progress.students_synced)
        .bind(progress.events_loaded)
        .bind(progress.records_rejected)
        .bind(progress.records_low_fidelity)
        .bind(progress.reconciliation_gaps)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn add_operation_error(&self, operation_id: i64, error: &OperationError) -> Result<()> {
        sqlx::query(
            "INSERT INTO operation_errors (operation_id, school_id, kind, message)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(operation_id)
        .bind(&error.school_id)
        .bind(&error.kind)
        .bind(&error.message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_operation(&self, operation_id: i64) -> Result<Option<SyncOperation>> {
        let row = sqlx::query(
            "SELECT id, status, range_start, range_end, started_at, completed_at
             FROM sync_operations WHERE id = ?1",
        )
        .bind(operation_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(r) => Ok(Some(self.hydrate_operation(r).await?)),
            None => Ok(None),
        }
    }

    async fn get_latest_operation(&self) -> Result<Option<SyncOperation>> {
        let row = sqlx::query(
            "SELECT id, status, range_start, range_end, started_at, completed_at
             FROM sync_operations ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(r) => Ok(Some(self.hydrate_operation(r).await?)),
            None => Ok(None),
        }
    }

    async fn list_running_operations(&self) -> Result<Vec<SyncOperation>> {
        let rows = sqlx::query(
            "SELECT id, status, range_start, range_end, started_at, completed_at
             FROM sync_operations WHERE status = 'running' ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut ops = Vec::with_capacity(rows.len());
        for row in rows {
            ops.push(self.hydrate_operation(row).await?);
        }
        Ok(ops)
    }
}
