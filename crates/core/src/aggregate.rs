//! Daily per-grade aggregation over attendance events.
//!
//! Summaries are pure derivations: they can always be deleted and
//! rebuilt from events. Full recompute rebuilds a whole scope;
//! incremental recompute patches the days a sync touched and rolls the
//! cumulative absence counts forward so later days stay consistent.
//! Only observed events on school days count.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::{Datelike, NaiveDate, Weekday};
use tracing::{debug, info};

use crate::config::CalendarConfig;
use crate::db::repository::{AttendanceRepository, StudentRepository, SummaryRepository};
use crate::error::Result;
use crate::models::attendance::{AttendanceEvent, PresenceState, Provenance};
use crate::models::summary::{attendance_rate, DailyGradeSummary, SummaryScope};
use crate::models::DateRange;

const UNGRADED: &str = "ungraded";

/// Which calendar days count as instructional days, and where the
/// current school year starts.
#[derive(Debug, Clone, Default)]
pub struct SchoolCalendar {
    holidays: HashSet<NaiveDate>,
    year_start: Option<NaiveDate>,
}

impl SchoolCalendar {
    pub fn new(holidays: &[NaiveDate]) -> Self {
        Self {
            holidays: holidays.iter().copied().collect(),
            year_start: None,
        }
    }

    pub fn with_year_start(mut self, date: NaiveDate) -> Self {
        self.year_start = Some(date);
        self
    }

    pub fn from_config(config: &CalendarConfig) -> Self {
        Self {
            holidays: config.holidays.iter().copied().collect(),
            year_start: config.school_year_start,
        }
    }

    /// Weekdays that are not configured holidays.
    pub fn is_school_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }

    /// First instructional day of the current school year, if
    /// configured. Cumulative absence counts run from here.
    pub fn year_start(&self) -> Option<NaiveDate> {
        self.year_start
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    total: i64,
    present: i64,
    absent: i64,
    tardy: i64,
    excused: i64,
    unexcused: i64,
}

impl Tally {
    fn add(&mut self, state: PresenceState) {
        self.total += 1;
        match state {
            PresenceState::Present | PresenceState::Partial => self.present += 1,
            PresenceState::Tardy => {
                self.present += 1;
                self.tardy += 1;
            }
            PresenceState::AbsentExcused => {
                self.absent += 1;
                self.excused += 1;
            }
            PresenceState::AbsentUnexcused => {
                self.absent += 1;
                self.unexcused += 1;
            }
        }
    }

    fn into_summary(
        self,
        school_id: &str,
        grade: &str,
        date: NaiveDate,
        cumulative_absences: i64,
    ) -> DailyGradeSummary {
        DailyGradeSummary {
            school_id: school_id.to_string(),
            grade: grade.to_string(),
            date,
            total: self.total,
            present: self.present,
            absent: self.absent,
            tardy: self.tardy,
            excused: self.excused,
            unexcused: self.unexcused,
            daily_absences: self.absent,
            cumulative_absences,
            attendance_rate: attendance_rate(self.present, self.total),
        }
    }
}

/// Student id -> grade lookup, school-scoped with a fallback to the
/// student's current identity for events recorded before a transfer.
struct GradeIndex {
    by_school: HashMap<(String, String), String>,
    by_id: HashMap<String, String>,
}

impl GradeIndex {
    async fn load<R: StudentRepository + ?Sized>(repository: &R) -> Result<Self> {
        let students = repository.list_students().await?;
        let mut by_school = HashMap::new();
        let mut by_id = HashMap::new();
        for student in students {
            by_school.insert(
                (student.id.clone(), student.school_id.clone()),
                student.grade.clone(),
            );
            if !student.superseded {
                by_id.insert(student.id, student.grade);
            }
        }
        Ok(Self { by_school, by_id })
    }

    fn grade(&self, event: &AttendanceEvent) -> &str {
        self.by_school
            .get(&(event.student_id.clone(), event.school_id.clone()))
            .or_else(|| self.by_id.get(&event.student_id))
            .map(String::as_str)
            .unwrap_or(UNGRADED)
    }
}

pub struct Aggregator<'a, R: ?Sized> {
    repository: &'a R,
    calendar: SchoolCalendar,
}

impl<'a, R> Aggregator<'a, R>
where
    R: AttendanceRepository + StudentRepository + SummaryRepository + ?Sized,
{
    pub fn new(repository: &'a R, calendar: SchoolCalendar) -> Self {
        Self {
            repository,
            calendar,
        }
    }

    /// Group events into per-(school, grade, date) tallies, skipping
    /// non-school days and synthesized records.
    fn tally_events(
        &self,
        events: &[AttendanceEvent],
        grades: &GradeIndex,
    ) -> BTreeMap<(String, String, NaiveDate), Tally> {
        let mut tallies: BTreeMap<(String, String, NaiveDate), Tally> = BTreeMap::new();
        for event in events {
            if event.provenance == Provenance::Synthesized {
                continue;
            }
            if !self.calendar.is_school_day(event.date) {
                continue;
            }
            let grade = grades.grade(event).to_string();
            tallies
                .entry((event.school_id.clone(), grade, event.date))
                .or_default()
                .add(event.state);
        }
        tallies
    }

    /// Drop and rebuild every summary in the scope. Cumulative counts
    /// seed from the last summary before the scope's start, so a
    /// partial-window recompute stays consistent with history. The
    /// running count restarts at the school year start: summaries from
    /// a prior year never seed or feed the current year's totals.
    pub async fn recompute_full(&self, scope: &SummaryScope) -> Result<u64> {
        let events = self.repository.list_events(scope).await?;
        let grades = GradeIndex::load(self.repository).await?;
        let tallies = self.tally_events(&events, &grades);

        self.repository.delete_summaries(scope).await?;

        let year_start = self.calendar.year_start();
        let seed_floor = year_start.filter(|ys| scope.range.start >= *ys);

        // BTreeMap ordering gives (school, grade) runs in date order.
        // The bool tracks whether the running count has crossed into
        // the current school year.
        let mut written: u64 = 0;
        let mut cumulative: HashMap<(String, String), (i64, bool)> = HashMap::new();
        for ((school_id, grade, date), tally) in tallies {
            let key = (school_id.clone(), grade.clone());
            let (mut running, mut in_year) = match cumulative.get(&key) {
                Some(state) => *state,
                None => {
                    let seed = self
                        .repository
                        .last_cumulative_before(&school_id, &grade, scope.range.start, seed_floor)
                        .await?;
                    (seed, seed_floor.is_some())
                }
            };
            if let Some(ys) = year_start {
                if !in_year && date >= ys {
                    running = 0;
                    in_year = true;
                }
            }
            running += tally.absent;
            cumulative.insert(key, (running, in_year));
            self.repository
                .upsert_summary(&tally.into_summary(&school_id, &grade, date, running))
                .await?;
            written += 1;
        }

        info!(summaries = written, "full summary recompute complete");
        Ok(written)
    }

    /// Recompute exactly the (school, date) cells a sync touched and
    /// repair cumulative counts on every later summary.
    pub async fn recompute_incremental(&self, touched: &[(String, NaiveDate)]) -> Result<u64> {
        let mut cells: BTreeSet<(String, NaiveDate)> = touched.iter().cloned().collect();
        if cells.is_empty() {
            return Ok(0);
        }

        let grades = GradeIndex::load(self.repository).await?;
        let mut written: u64 = 0;
        // (school, grade) -> earliest touched date, for the forward fix.
        let mut dirty: BTreeMap<(String, String), NaiveDate> = BTreeMap::new();

        for (school_id, date) in std::mem::take(&mut cells) {
            let day_scope =
                SummaryScope::new(Some(school_id.clone()), DateRange::day(date));

            for existing in self.repository.list_summaries(&day_scope).await? {
                mark_dirty(&mut dirty, &school_id, &existing.grade, date);
            }
            self.repository.delete_summaries(&day_scope).await?;

            let events = self.repository.list_events(&day_scope).await?;
            let tallies = self.tally_events(&events, &grades);
            for ((school_id, grade, date), tally) in tallies {
                mark_dirty(&mut dirty, &school_id, &grade, date);
                // Cumulative placeholder; fixed in the forward pass.
                self.repository
                    .upsert_summary(&tally.into_summary(&school_id, &grade, date, 0))
                    .await?;
                written += 1;
            }
        }

        let year_start = self.calendar.year_start();
        for ((school_id, grade), from) in dirty {
            let seed_floor = year_start.filter(|ys| from >= *ys);
            let mut running = self
                .repository
                .last_cumulative_before(&school_id, &grade, from, seed_floor)
                .await?;
            let mut in_year = seed_floor.is_some();
            for mut summary in self
                .repository
                .list_summaries_from(&school_id, &grade, from)
                .await?
            {
                if let Some(ys) = year_start {
                    if !in_year && summary.date >= ys {
                        running = 0;
                        in_year = true;
                    }
                }
                running += summary.daily_absences;
                if summary.cumulative_absences != running {
                    summary.cumulative_absences = running;
                    self.repository.upsert_summary(&summary).await?;
                }
            }
            debug!(school_id, grade, %from, "cumulative counts repaired");
        }

        info!(summaries = written, "incremental summary recompute complete");
        Ok(written)
    }
}

fn mark_dirty(
    dirty: &mut BTreeMap<(String, String), NaiveDate>,
    school_id: &str,
    grade: &str,
    date: NaiveDate,
) {
    dirty
        .entry((school_id.to_string(), grade.to_string()))
        .and_modify(|d| {
            if date < *d {
                *d = date;
            }
        })
        .or_insert(date);
}
