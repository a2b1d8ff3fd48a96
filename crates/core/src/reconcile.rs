//! Identifier reconciliation between the source system and canonical
//! Rollcall identities.
//!
//! Source exports are inconsistent about identifier formatting (the
//! same school appears as `"001"`, `"01"`, and `"1"` across endpoints)
//! and about which school a student record is attributed to. The
//! resolver matches codes exactly first, then after zero-padding
//! normalization. Codes that resolve to nothing become reconciliation
//! gaps: data quality findings, not errors.

use std::collections::HashMap;

use crate::error::{Result, RollcallError};
use crate::models::attendance::AttendanceEvent;
use crate::models::school::SchoolMapping;
use crate::models::student::StudentIdentity;
use crate::normalize::NormalizedEvent;

/// What kind of identifier failed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapKind {
    School,
    Student,
}

impl GapKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GapKind::School => "school",
            GapKind::Student => "student",
        }
    }
}

/// An identifier the source reported that maps to no known identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationGap {
    pub kind: GapKind,
    pub raw_code: String,
}

/// Strip leading zeros, keeping at least one character.
pub fn normalize_code(code: &str) -> String {
    let trimmed = code.trim();
    let stripped = trimmed.trim_start_matches('0');
    if stripped.is_empty() && !trimmed.is_empty() {
        "0".to_string()
    } else {
        stripped.to_string()
    }
}

/// In-memory index over school aliases and active student identities.
#[derive(Debug)]
pub struct Resolver {
    /// Exact alias -> school id.
    schools_exact: HashMap<String, String>,
    /// Zero-stripped alias -> school id.
    schools_normalized: HashMap<String, String>,
    /// Exact source student id -> canonical student id.
    students_exact: HashMap<String, String>,
    students_normalized: HashMap<String, String>,
}

impl Resolver {
    /// Build the index. Aliases for inactive schools are still indexed
    /// so historical records keep resolving; superseded student
    /// identities are not. Fails if an alias is claimed by two schools.
    pub fn new(schools: &[SchoolMapping], students: &[StudentIdentity]) -> Result<Self> {
        let mut schools_exact = HashMap::new();
        let mut schools_normalized = HashMap::new();

        for school in schools {
            for alias in &school.aliases {
                if let Some(existing) = schools_exact.get(alias) {
                    if existing != &school.id {
                        return Err(RollcallError::Validation(format!(
                            "school alias {alias:?} is claimed by both {existing} and {}",
                            school.id
                        )));
                    }
                }
                schools_exact.insert(alias.clone(), school.id.clone());
                schools_normalized
                    .entry(normalize_code(alias))
                    .or_insert_with(|| school.id.clone());
            }
        }

        let mut students_exact = HashMap::new();
        let mut students_normalized = HashMap::new();
        for student in students.iter().filter(|s| !s.superseded) {
            students_exact.insert(student.source_student_id.clone(), student.id.clone());
            students_normalized
                .entry(normalize_code(&student.source_student_id))
                .or_insert_with(|| student.id.clone());
        }

        Ok(Self {
            schools_exact,
            schools_normalized,
            students_exact,
            students_normalized,
        })
    }

    /// Resolve a school code to a canonical school id.
    pub fn resolve_school(&self, code: &str) -> Option<&str> {
        self.schools_exact
            .get(code)
            .or_else(|| self.schools_normalized.get(&normalize_code(code)))
            .map(String::as_str)
    }

    /// Resolve a source student id to a canonical student id.
    pub fn resolve_student(&self, source_id: &str) -> Option<&str> {
        self.students_exact
            .get(source_id)
            .or_else(|| self.students_normalized.get(&normalize_code(source_id)))
            .map(String::as_str)
    }

    /// Attach canonical identities to normalized events. Events whose
    /// student cannot be resolved become gaps; if the school code
    /// itself is unknown the whole batch is one school gap.
    pub fn resolve_events(
        &self,
        school_code: &str,
        events: Vec<NormalizedEvent>,
    ) -> (Vec<AttendanceEvent>, Vec<ReconciliationGap>) {
        let Some(school_id) = self.resolve_school(school_code) else {
            return (
                Vec::new(),
                vec![ReconciliationGap {
                    kind: GapKind::School,
                    raw_code: school_code.to_string(),
                }],
            );
        };

        let mut resolved = Vec::with_capacity(events.len());
        let mut gaps = Vec::new();
        for event in events {
            match self.resolve_student(&event.source_student_id) {
                Some(student_id) => resolved.push(AttendanceEvent {
                    student_id: student_id.to_string(),
                    school_id: school_id.to_string(),
                    date: event.date,
                    state: event.state,
                    periods: event.periods,
                    provenance: event.provenance,
                    source_shape: event.shape,
                }),
                None => gaps.push(ReconciliationGap {
                    kind: GapKind::Student,
                    raw_code: event.source_student_id,
                }),
            }
        }
        (resolved, gaps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::attendance::{EndpointShape, PresenceState, Provenance};
    use chrono::NaiveDate;

    fn school(id: &str, code: &str, aliases: &[&str]) -> SchoolMapping {
        let mut s = SchoolMapping::new(id, "Lincoln Elementary", code, 7);
        for alias in aliases {
            s.aliases.push(alias.to_string());
        }
        s
    }

    fn student(id: &str, source_id: &str, school_id: &str) -> StudentIdentity {
        StudentIdentity::new(id, source_id, school_id, "04")
    }

    fn event(source_id: &str) -> NormalizedEvent {
        NormalizedEvent {
            source_student_id: source_id.into(),
            date: NaiveDate::from_ymd_opt(2024, 8, 15).unwrap(),
            state: PresenceState::Present,
            periods: vec![PresenceState::Present; 7],
            provenance: Provenance::Observed,
            shape: EndpointShape::DayLevel,
        }
    }

    #[test]
    fn normalize_code_strips_leading_zeros() {
        assert_eq!(normalize_code("001"), "1");
        assert_eq!(normalize_code("0100"), "100");
        assert_eq!(normalize_code("1"), "1");
        assert_eq!(normalize_code(" 042 "), "42");
    }

    #[test]
    fn normalize_code_all_zeros_keeps_one() {
        assert_eq!(normalize_code("000"), "0");
        assert_eq!(normalize_code("0"), "0");
    }

    #[test]
    fn exact_match_wins() {
        let schools = vec![school("sch-1", "001", &[])];
        let resolver = Resolver::new(&schools, &[]).unwrap();
        assert_eq!(resolver.resolve_school("001"), Some("sch-1"));
    }

    #[test]
    fn padded_and_unpadded_codes_resolve_to_same_school() {
        let schools = vec![school("sch-1", "001", &[])];
        let resolver = Resolver::new(&schools, &[]).unwrap();
        assert_eq!(resolver.resolve_school("1"), Some("sch-1"));
        assert_eq!(resolver.resolve_school("01"), Some("sch-1"));
        assert_eq!(resolver.resolve_school("0001"), Some("sch-1"));
    }

    #[test]
    fn explicit_alias_resolves() {
        let schools = vec![school("sch-1", "001", &["NORTH"])];
        let resolver = Resolver::new(&schools, &[]).unwrap();
        assert_eq!(resolver.resolve_school("NORTH"), Some("sch-1"));
    }

    #[test]
    fn duplicate_alias_across_schools_is_rejected() {
        let schools = vec![school("sch-1", "001", &[]), school("sch-2", "001", &[])];
        let err = Resolver::new(&schools, &[]).unwrap_err();
        assert!(matches!(err, RollcallError::Validation(_)));
    }

    #[test]
    fn superseded_students_are_not_indexed() {
        let mut old = student("stu-old", "90001", "sch-1");
        old.superseded = true;
        let current = student("stu-new", "90001", "sch-2");
        let resolver = Resolver::new(&[], &[old, current]).unwrap();
        assert_eq!(resolver.resolve_student("90001"), Some("stu-new"));
    }

    #[test]
    fn resolve_events_maps_identities() {
        let schools = vec![school("sch-1", "001", &[])];
        let students = vec![student("stu-1", "90001", "sch-1")];
        let resolver = Resolver::new(&schools, &students).unwrap();

        let (resolved, gaps) = resolver.resolve_events("1", vec![event("090001")]);
        assert!(gaps.is_empty());
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].student_id, "stu-1");
        assert_eq!(resolved[0].school_id, "sch-1");
    }

    #[test]
    fn unknown_student_becomes_gap() {
        let schools = vec![school("sch-1", "001", &[])];
        let resolver = Resolver::new(&schools, &[]).unwrap();

        let (resolved, gaps) = resolver.resolve_events("001", vec![event("99999")]);
        assert!(resolved.is_empty());
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].kind, GapKind::Student);
        assert_eq!(gaps[0].raw_code, "99999");
    }

    #[test]
    fn unknown_school_is_single_gap() {
        let resolver = Resolver::new(&[], &[]).unwrap();
        let (resolved, gaps) = resolver.resolve_events("77", vec![event("90001"), event("90002")]);
        assert!(resolved.is_empty());
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].kind, GapKind::School);
        assert_eq!(gaps[0].raw_code, "77");
    }

    #[test]
    fn inactive_school_aliases_still_resolve() {
        let mut closed = school("sch-9", "009", &[]);
        closed.active = false;
        let resolver = Resolver::new(&[closed], &[]).unwrap();
        assert_eq!(resolver.resolve_school("9"), Some("sch-9"));
    }
}
