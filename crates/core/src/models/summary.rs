use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::DateRange;

/// Daily attendance aggregate for one (school, grade, date).
///
/// Derived entirely from attendance events; recomputed, never
/// hand-edited. `present + absent == total` and
/// `daily_absences == absent` hold by construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DailyGradeSummary {
    pub school_id: String,
    pub grade: String,
    pub date: NaiveDate,
    pub total: i64,
    pub present: i64,
    pub absent: i64,
    pub tardy: i64,
    pub excused: i64,
    pub unexcused: i64,
    pub daily_absences: i64,
    /// Running absence total for this (school, grade) since the start
    /// of the aggregation window, ordered by date.
    pub cumulative_absences: i64,
    /// Percentage in [0, 100], two decimal places. 100 when total is 0.
    pub attendance_rate: f64,
}

/// Compute the attendance rate for a day.
///
/// Zero enrollment is 100 by convention: no students means no
/// absenteeism, and it keeps the division well-defined.
pub fn attendance_rate(present: i64, total: i64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (present as f64 / total as f64 * 10_000.0).round() / 100.0
}

/// Scope selector for aggregation and summary queries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SummaryScope {
    /// None means all schools.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub school_id: Option<String>,
    pub range: DateRange,
}

impl SummaryScope {
    pub fn new(school_id: Option<String>, range: DateRange) -> Self {
        Self { school_id, range }
    }

    pub fn matches(&self, school_id: &str, date: NaiveDate) -> bool {
        self.range.contains(date)
            && self
                .school_id
                .as_deref()
                .map(|s| s == school_id)
                .unwrap_or(true)
    }
}
