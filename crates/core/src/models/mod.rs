pub mod attendance;
pub mod operation;
pub mod school;
pub mod student;
pub mod summary;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RollcallError};

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(RollcallError::Validation(format!(
                "date range start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Single-day range.
    pub fn day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn range_rejects_inverted_bounds() {
        let err = DateRange::new(d(2024, 9, 2), d(2024, 9, 1)).unwrap_err();
        assert!(err.to_string().contains("after end"));
    }

    #[test]
    fn range_contains_bounds() {
        let r = DateRange::new(d(2024, 9, 1), d(2024, 9, 30)).unwrap();
        assert!(r.contains(d(2024, 9, 1)));
        assert!(r.contains(d(2024, 9, 30)));
        assert!(!r.contains(d(2024, 10, 1)));
    }

    #[test]
    fn range_overlap() {
        let a = DateRange::new(d(2024, 9, 1), d(2024, 9, 10)).unwrap();
        let b = DateRange::new(d(2024, 9, 10), d(2024, 9, 20)).unwrap();
        let c = DateRange::new(d(2024, 9, 11), d(2024, 9, 20)).unwrap();
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn range_serde_round_trip() {
        let r = DateRange::day(d(2024, 8, 15));
        let json = serde_json::to_string(&r).unwrap();
        let back: DateRange = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }
}
