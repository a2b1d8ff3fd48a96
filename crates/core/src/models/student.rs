use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A student's canonical identity within one school.
///
/// A student has exactly one non-superseded identity at a time. On
/// school transfer the old identity is marked superseded instead of
/// being overwritten, so attendance recorded under the old school
/// keeps its attribution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StudentIdentity {
    pub id: String,
    pub source_student_id: String,
    pub school_id: String,
    pub grade: String,
    #[serde(default)]
    pub superseded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded_at: Option<DateTime<Utc>>,
}

impl StudentIdentity {
    pub fn new(id: &str, source_student_id: &str, school_id: &str, grade: &str) -> Self {
        Self {
            id: id.to_string(),
            source_student_id: source_student_id.to_string(),
            school_id: school_id.to_string(),
            grade: grade.to_string(),
            superseded: false,
            superseded_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn new_identity_is_active() {
        let s = StudentIdentity::new("stu-1", "90001", "sch-1", "04");
        assert!(!s.superseded);
        assert!(s.superseded_at.is_none());
    }

    #[test]
    fn identity_round_trip() {
        let mut s = StudentIdentity::new("stu-1", "90001", "sch-1", "04");
        s.superseded = true;
        s.superseded_at = Some(Utc.with_ymd_and_hms(2024, 8, 1, 0, 0, 0).unwrap());
        let json = serde_json::to_string(&s).unwrap();
        let back: StudentIdentity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn identity_camel_case_fields() {
        let s = StudentIdentity::new("stu-1", "90001", "sch-1", "04");
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"sourceStudentId\""));
        assert!(json.contains("\"schoolId\""));
    }
}
