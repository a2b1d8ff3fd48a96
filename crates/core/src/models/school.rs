use serde::{Deserialize, Serialize};

/// Mapping between a canonical school and its source-system codes.
///
/// `aliases` holds every source code that has ever referred to this
/// school, including historically malformed variants (zero-padded,
/// whitespace-wrapped). `source_code` is the code currently used when
/// talking to the SIS and is always a member of `aliases`. Schools are
/// soft-deactivated, never deleted, so historical events stay
/// attributable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SchoolMapping {
    pub id: String,
    pub name: String,
    pub source_code: String,
    /// Number of attendance periods in this school's bell schedule.
    pub period_count: u32,
    pub active: bool,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl SchoolMapping {
    pub fn new(id: &str, name: &str, source_code: &str, period_count: u32) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            source_code: source_code.to_string(),
            period_count,
            active: true,
            aliases: vec![source_code.to_string()],
        }
    }
}
