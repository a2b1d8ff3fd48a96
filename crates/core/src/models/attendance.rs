use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Daily presence state of a student.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PresenceState {
    Present,
    AbsentExcused,
    AbsentUnexcused,
    Partial,
    Tardy,
}

impl PresenceState {
    /// True for the states that count toward daily absences.
    pub fn is_absent(&self) -> bool {
        matches!(
            self,
            PresenceState::AbsentExcused | PresenceState::AbsentUnexcused
        )
    }
}

/// Whether a record was observed from the source system or estimated.
///
/// Synthesized records are excluded from authoritative aggregation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Observed,
    Synthesized,
}

/// The endpoint family an attendance payload came from. The source
/// system exposes the same data through all three, with different
/// payload structures and fidelity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EndpointShape {
    DayLevel,
    DetailHistory,
    SummaryOnly,
}

impl EndpointShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointShape::DayLevel => "day_level",
            EndpointShape::DetailHistory => "detail_history",
            EndpointShape::SummaryOnly => "summary_only",
        }
    }

    /// Fallback order when an endpoint family returns 404.
    pub const FALLBACK_ORDER: [EndpointShape; 3] = [
        EndpointShape::DayLevel,
        EndpointShape::DetailHistory,
        EndpointShape::SummaryOnly,
    ];
}

/// Map a source-system period code to a presence state.
///
/// Fixed table: `P` or empty means present, `A`/`U` unexcused absence,
/// `E` excused absence, `T` tardy, `S` (suspended) counts as excused
/// absence for aggregation. Unknown codes are a validation error at
/// the caller.
pub fn state_from_code(code: &str) -> Option<PresenceState> {
    match code.trim() {
        "" | "P" => Some(PresenceState::Present),
        "A" | "U" => Some(PresenceState::AbsentUnexcused),
        "E" | "S" => Some(PresenceState::AbsentExcused),
        "T" => Some(PresenceState::Tardy),
        _ => None,
    }
}

/// Derive the day-level state from a per-period vector.
///
/// Every period absent is a full-day absence (excused only when all
/// absent periods are excused); some but not all absent is partial;
/// a tardy with no absences is tardy; otherwise present. An empty
/// vector (no periods configured) is present.
pub fn day_state(periods: &[PresenceState]) -> PresenceState {
    if periods.is_empty() {
        return PresenceState::Present;
    }
    let absent = periods.iter().filter(|p| p.is_absent()).count();
    if absent == periods.len() {
        if periods.iter().all(|p| *p == PresenceState::AbsentExcused) {
            return PresenceState::AbsentExcused;
        }
        return PresenceState::AbsentUnexcused;
    }
    if absent > 0 {
        return PresenceState::Partial;
    }
    if periods.iter().any(|p| *p == PresenceState::Tardy) {
        return PresenceState::Tardy;
    }
    PresenceState::Present
}

/// The canonical attendance record: at most one per (student, date).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceEvent {
    pub student_id: String,
    pub school_id: String,
    pub date: NaiveDate,
    pub state: PresenceState,
    /// One state per period; length matches the school's period count.
    pub periods: Vec<PresenceState>,
    pub provenance: Provenance,
    pub source_shape: EndpointShape,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_table() {
        assert_eq!(state_from_code(""), Some(PresenceState::Present));
        assert_eq!(state_from_code("P"), Some(PresenceState::Present));
        assert_eq!(state_from_code("A"), Some(PresenceState::AbsentUnexcused));
        assert_eq!(state_from_code("U"), Some(PresenceState::AbsentUnexcused));
        assert_eq!(state_from_code("E"), Some(PresenceState::AbsentExcused));
        assert_eq!(state_from_code("S"), Some(PresenceState::AbsentExcused));
        assert_eq!(state_from_code("T"), Some(PresenceState::Tardy));
        assert_eq!(state_from_code("X"), None);
    }

    #[test]
    fn code_table_trims_whitespace() {
        assert_eq!(state_from_code(" P "), Some(PresenceState::Present));
        assert_eq!(state_from_code("  "), Some(PresenceState::Present));
    }

    #[test]
    fn day_state_all_present() {
        let p = vec![PresenceState::Present; 7];
        assert_eq!(day_state(&p), PresenceState::Present);
    }

    #[test]
    fn day_state_all_absent_unexcused() {
        let p = vec![PresenceState::AbsentUnexcused; 7];
        assert_eq!(day_state(&p), PresenceState::AbsentUnexcused);
    }

    #[test]
    fn day_state_all_absent_excused() {
        let p = vec![PresenceState::AbsentExcused; 7];
        assert_eq!(day_state(&p), PresenceState::AbsentExcused);
    }

    #[test]
    fn day_state_mixed_absence_is_unexcused() {
        let mut p = vec![PresenceState::AbsentExcused; 6];
        p.push(PresenceState::AbsentUnexcused);
        assert_eq!(day_state(&p), PresenceState::AbsentUnexcused);
    }

    #[test]
    fn day_state_partial() {
        let mut p = vec![PresenceState::Present; 5];
        p.push(PresenceState::AbsentUnexcused);
        assert_eq!(day_state(&p), PresenceState::Partial);
    }

    #[test]
    fn day_state_tardy() {
        let mut p = vec![PresenceState::Present; 6];
        p.push(PresenceState::Tardy);
        assert_eq!(day_state(&p), PresenceState::Tardy);
    }

    #[test]
    fn day_state_empty_is_present() {
        assert_eq!(day_state(&[]), PresenceState::Present);
    }

    #[test]
    fn presence_state_serialization() {
        assert_eq!(
            serde_json::to_string(&PresenceState::AbsentExcused).unwrap(),
            "\"absent_excused\""
        );
        assert_eq!(
            serde_json::to_string(&Provenance::Observed).unwrap(),
            "\"observed\""
        );
        assert_eq!(
            serde_json::to_string(&EndpointShape::DayLevel).unwrap(),
            "\"day_level\""
        );
    }

    #[test]
    fn event_round_trip() {
        let event = AttendanceEvent {
            student_id: "stu-1".into(),
            school_id: "sch-1".into(),
            date: NaiveDate::from_ymd_opt(2024, 8, 15).unwrap(),
            state: PresenceState::Present,
            periods: vec![PresenceState::Present; 7],
            provenance: Provenance::Observed,
            source_shape: EndpointShape::DayLevel,
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: AttendanceEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
