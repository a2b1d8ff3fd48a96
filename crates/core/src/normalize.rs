//! Conversion of raw source payloads into canonical attendance events.
//!
//! Each endpoint shape carries different structure and fidelity.
//! Day-level and detail-history payloads yield one event per student
//! per day; summary-only payloads carry no daily resolution and are
//! counted as low-fidelity without producing events. Records that fail
//! validation are rejected individually so one bad row never discards
//! a batch.

use chrono::NaiveDate;
use tracing::debug;

use crate::models::attendance::{
    day_state, state_from_code, EndpointShape, PresenceState, Provenance,
};
use crate::source::payloads::{DayLevelRecord, HistoryDetail, RawAttendance};

/// An attendance event still keyed by the source system's student
/// identifier; reconciliation maps it to a canonical identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedEvent {
    pub source_student_id: String,
    pub date: NaiveDate,
    pub state: PresenceState,
    pub periods: Vec<PresenceState>,
    pub provenance: Provenance,
    pub shape: EndpointShape,
}

/// Result of normalizing one raw payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedBatch {
    pub events: Vec<NormalizedEvent>,
    /// Records dropped for malformed dates or unknown period codes.
    pub rejected: u64,
    /// Summary-only records, which carry no per-day data.
    pub low_fidelity: u64,
}

/// Normalize a raw attendance payload against a school's period count.
pub fn normalize(raw: &RawAttendance, period_count: usize) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();

    match raw {
        RawAttendance::DayLevel(records) => {
            for record in records {
                normalize_day_record(record, period_count, &mut batch);
            }
        }
        RawAttendance::DetailHistory(records) => {
            for record in records {
                for year in &record.years {
                    for detail in &year.details {
                        normalize_history_detail(&record.student_id, detail, period_count, &mut batch);
                    }
                }
            }
        }
        RawAttendance::SummaryOnly(records) => {
            // Totals without dates cannot become daily events; surface
            // them as low-fidelity so the caller can report coverage.
            batch.low_fidelity = records.len() as u64;
        }
    }

    debug!(
        shape = raw.shape().as_str(),
        events = batch.events.len(),
        rejected = batch.rejected,
        low_fidelity = batch.low_fidelity,
        "normalized payload"
    );
    batch
}

fn normalize_day_record(record: &DayLevelRecord, period_count: usize, batch: &mut NormalizedBatch) {
    let Some(date) = record.date.as_deref().and_then(parse_date) else {
        batch.rejected += 1;
        return;
    };
    match periods_from_codes(&record.period_codes, period_count) {
        Some(periods) => batch.events.push(NormalizedEvent {
            source_student_id: record.student_id.clone(),
            date,
            state: day_state(&periods),
            periods,
            provenance: Provenance::Observed,
            shape: EndpointShape::DayLevel,
        }),
        None => batch.rejected += 1,
    }
}

fn normalize_history_detail(
    student_id: &str,
    detail: &HistoryDetail,
    period_count: usize,
    batch: &mut NormalizedBatch,
) {
    let Some(date) = detail.date.as_deref().and_then(parse_date) else {
        batch.rejected += 1;
        return;
    };
    match periods_from_codes(&detail.period_codes, period_count) {
        Some(periods) => batch.events.push(NormalizedEvent {
            source_student_id: student_id.to_string(),
            date,
            state: day_state(&periods),
            periods,
            provenance: Provenance::Observed,
            shape: EndpointShape::DetailHistory,
        }),
        None => batch.rejected += 1,
    }
}

/// Map a code vector to a full-width period vector.
///
/// Vectors longer than the school's period count are invalid; shorter
/// ones are padded with present (the source omits trailing periods a
/// student attended).
fn periods_from_codes(codes: &[String], period_count: usize) -> Option<Vec<PresenceState>> {
    if codes.len() > period_count {
        return None;
    }
    let mut periods = Vec::with_capacity(period_count);
    for code in codes {
        periods.push(state_from_code(code)?);
    }
    periods.resize(period_count, PresenceState::Present);
    Some(periods)
}

/// Dates arrive in ISO or US format depending on the source version.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%m/%d/%Y"))
        .ok()
}
