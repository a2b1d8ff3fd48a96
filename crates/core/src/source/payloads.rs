//! Raw payload shapes returned by the source SIS.
//!
//! The source exposes attendance through three endpoint families with
//! different payload structures: day-level, detail-history, and
//! summary-only. All are deserialized as-is; the normalizer converts
//! them to the canonical event shape.

use serde::{Deserialize, Serialize};

use crate::models::attendance::EndpointShape;

/// A school as reported by the source registry endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RawSchool {
    pub school_code: String,
    pub name: String,
    #[serde(default = "default_period_count")]
    pub period_count: u32,
}

fn default_period_count() -> u32 {
    7
}

/// An enrolled student as reported by the enrollment endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RawStudent {
    pub student_id: String,
    pub school_code: String,
    pub grade: String,
}

/// Day-level record: one row per student per day with a per-period
/// code vector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DayLevelRecord {
    pub student_id: String,
    /// Calendar date as reported; may be missing or malformed.
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub period_codes: Vec<String>,
}

/// One dated entry within a student's detail history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryDetail {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub period_codes: Vec<String>,
}

/// Detail history grouped by school year.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryYear {
    pub school_year: String,
    #[serde(default)]
    pub details: Vec<HistoryDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DetailHistoryRecord {
    pub student_id: String,
    #[serde(default)]
    pub years: Vec<HistoryYear>,
}

/// Summary-only record: totals with no daily resolution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRecord {
    pub student_id: String,
    pub days_enrolled: u32,
    pub days_present: u32,
}

/// Shape-tagged attendance payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawAttendance {
    DayLevel(Vec<DayLevelRecord>),
    DetailHistory(Vec<DetailHistoryRecord>),
    SummaryOnly(Vec<SummaryRecord>),
}

impl RawAttendance {
    pub fn shape(&self) -> EndpointShape {
        match self {
            RawAttendance::DayLevel(_) => EndpointShape::DayLevel,
            RawAttendance::DetailHistory(_) => EndpointShape::DetailHistory,
            RawAttendance::SummaryOnly(_) => EndpointShape::SummaryOnly,
        }
    }

    pub fn record_count(&self) -> usize {
        match self {
            RawAttendance::DayLevel(r) => r.len(),
            RawAttendance::DetailHistory(r) => r.len(),
            RawAttendance::SummaryOnly(r) => r.len(),
        }
    }
}
