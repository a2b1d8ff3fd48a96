pub mod client;
pub mod payloads;

use async_trait::async_trait;

use crate::error::{Result, RollcallError};
use crate::models::attendance::EndpointShape;
use crate::models::DateRange;

use self::payloads::{RawAttendance, RawSchool, RawStudent};

/// Trait over the source SIS, so the orchestrator can run against a
/// mock in tests.
#[async_trait]
pub trait AttendanceSource: Send + Sync {
    async fn fetch_schools(&self) -> Result<Vec<RawSchool>>;

    async fn fetch_enrollment(&self, school_code: &str) -> Result<Vec<RawStudent>>;

    async fn fetch_attendance(
        &self,
        school_code: &str,
        range: &DateRange,
        shape: EndpointShape,
    ) -> Result<RawAttendance>;
}

/// Fetch attendance trying each endpoint family in fallback order.
///
/// A shape that returns `UnsupportedShape` falls through to the next;
/// every other error propagates. If no family is supported the last
/// `UnsupportedShape` error is returned.
pub async fn fetch_attendance_with_fallback(
    source: &dyn AttendanceSource,
    school_code: &str,
    range: &DateRange,
) -> Result<RawAttendance> {
    let mut last_err = RollcallError::UnsupportedShape("no endpoint shape attempted".into());
    for shape in EndpointShape::FALLBACK_ORDER {
        match source.fetch_attendance(school_code, range, shape).await {
            Ok(raw) => return Ok(raw),
            Err(RollcallError::UnsupportedShape(msg)) => {
                tracing::warn!(school_code, shape = shape.as_str(), "endpoint shape unsupported, falling back");
                last_err = RollcallError::UnsupportedShape(msg);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err)
}
