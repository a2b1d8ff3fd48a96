//! TOML-based configuration system for Rollcall.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, RollcallError};

/// Top-level Rollcall configuration, deserialized from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollcallConfig {
    pub rollcall: RollcallSection,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Core instance settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollcallSection {
    pub instance_name: String,
    pub data_dir: String,
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// Database backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file path.
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "/var/lib/rollcall/rollcall.db".into(),
        }
    }
}

/// Source SIS client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub base_url: String,
    /// Certificate credential attached as a header to every request.
    #[serde(default)]
    pub certificate: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Minimum delay between consecutive requests, to respect the
    /// upstream rate limit.
    #[serde(default = "default_min_request_interval_ms")]
    pub min_request_interval_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: String::new(),
            certificate: String::new(),
            request_timeout_secs: default_request_timeout_secs(),
            min_request_interval_ms: default_min_request_interval_ms(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            page_size: default_page_size(),
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_min_request_interval_ms() -> u64 {
    1500
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_cap_ms() -> u64 {
    30_000
}

fn default_page_size() -> u64 {
    200
}

/// School calendar: non-school days are excluded from aggregation.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CalendarConfig {
    /// First instructional day; cumulative absence counts run from here.
    #[serde(default)]
    pub school_year_start: Option<NaiveDate>,
    #[serde(default)]
    pub holidays: Vec<NaiveDate>,
}

/// Sync pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

fn default_batch_size() -> usize {
    500
}

impl RollcallConfig {
    /// Load configuration from a TOML file at the given path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| RollcallError::Config(format!("failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Validate the configuration, returning an error for invalid combinations.
    pub fn validate(&self) -> Result<()> {
        if self.rollcall.instance_name.is_empty() {
            return Err(RollcallError::Config(
                "rollcall.instance_name must not be empty".into(),
            ));
        }

        if self.rollcall.data_dir.is_empty() {
            return Err(RollcallError::Config(
                "rollcall.data_dir must not be empty".into(),
            ));
        }

        if self.rollcall.database.path.is_empty() {
            return Err(RollcallError::Config(
                "rollcall.database.path must not be empty".into(),
            ));
        }

        if self.source.enabled {
            if self.source.base_url.is_empty() {
                return Err(RollcallError::Config(
                    "source.base_url is required when the source is enabled".into(),
                ));
            }
            if self.source.certificate.is_empty() {
                return Err(RollcallError::Config(
                    "source.certificate is required when the source is enabled".into(),
                ));
            }
        }

        if self.source.max_attempts == 0 {
            return Err(RollcallError::Config(
                "source.max_attempts must be at least 1".into(),
            ));
        }

        if self.sync.batch_size == 0 {
            return Err(RollcallError::Config(
                "sync.batch_size must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Generate a sensible default configuration.
    pub fn generate_default() -> Self {
        Self {
            rollcall: RollcallSection {
                instance_name: "My School District".into(),
                data_dir: "/var/lib/rollcall".into(),
                database: DatabaseConfig::default(),
            },
            source: SourceConfig::default(),
            calendar: CalendarConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_TOML: &str = r#"
[rollcall]
instance_name = "Springfield USD"
data_dir = "/var/lib/rollcall"

[rollcall.database]
path = "/var/lib/rollcall/rollcall.db"

[source]
enabled = true
base_url = "https://sis.springfield.k12.us/api"
certificate = "SPRINGFIELD-CERT-01"
request_timeout_secs = 20
min_request_interval_ms = 2000
max_attempts = 4
backoff_base_ms = 250
backoff_cap_ms = 10000
page_size = 100

[calendar]
school_year_start = "2024-08-12"
holidays = ["2024-09-02", "2024-11-28", "2024-11-29"]

[sync]
batch_size = 750
"#;

    fn parse_sample() -> RollcallConfig {
        toml::from_str(SAMPLE_TOML).expect("sample TOML should parse")
    }

    #[test]
    fn parse_full_config() {
        let cfg = parse_sample();
        assert_eq!(cfg.rollcall.instance_name, "Springfield USD");
        assert_eq!(cfg.rollcall.database.path, "/var/lib/rollcall/rollcall.db");
        assert!(cfg.source.enabled);
        assert_eq!(cfg.source.base_url, "https://sis.springfield.k12.us/api");
        assert_eq!(cfg.source.certificate, "SPRINGFIELD-CERT-01");
        assert_eq!(cfg.source.request_timeout_secs, 20);
        assert_eq!(cfg.source.min_request_interval_ms, 2000);
        assert_eq!(cfg.source.max_attempts, 4);
        assert_eq!(cfg.source.page_size, 100);
        assert_eq!(
            cfg.calendar.school_year_start,
            NaiveDate::from_ymd_opt(2024, 8, 12)
        );
        assert_eq!(cfg.calendar.holidays.len(), 3);
        assert_eq!(cfg.sync.batch_size, 750);
    }

    #[test]
    fn roundtrip_serialization() {
        let cfg = parse_sample();
        let serialized = toml::to_string(&cfg).expect("should serialize");
        let deserialized: RollcallConfig =
            toml::from_str(&serialized).expect("should deserialize roundtrip");
        assert_eq!(
            deserialized.rollcall.instance_name,
            cfg.rollcall.instance_name
        );
        assert_eq!(deserialized.source.certificate, cfg.source.certificate);
        assert_eq!(deserialized.calendar.holidays, cfg.calendar.holidays);
    }

    #[test]
    fn generate_default_is_valid() {
        let cfg = RollcallConfig::generate_default();
        cfg.validate().expect("default config should be valid");
    }

    #[test]
    fn validate_requires_instance_name() {
        let mut cfg = RollcallConfig::generate_default();
        cfg.rollcall.instance_name = String::new();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("instance_name"));
    }

    #[test]
    fn validate_requires_database_path() {
        let mut cfg = RollcallConfig::generate_default();
        cfg.rollcall.database.path = String::new();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("database.path"));
    }

    #[test]
    fn validate_source_requires_base_url_when_enabled() {
        let mut cfg = RollcallConfig::generate_default();
        cfg.source.enabled = true;
        cfg.source.certificate = "CERT".into();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn validate_source_requires_certificate_when_enabled() {
        let mut cfg = RollcallConfig::generate_default();
        cfg.source.enabled = true;
        cfg.source.base_url = "https://sis.example.com".into();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("certificate"));
    }

    #[test]
    fn validate_source_disabled_no_base_url_ok() {
        let mut cfg = RollcallConfig::generate_default();
        cfg.source.enabled = false;
        cfg.validate()
            .expect("disabled source should not require base_url");
    }

    #[test]
    fn validate_rejects_zero_attempts() {
        let mut cfg = RollcallConfig::generate_default();
        cfg.source.max_attempts = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn validate_rejects_zero_batch_size() {
        let mut cfg = RollcallConfig::generate_default();
        cfg.sync.batch_size = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn minimal_config_parses() {
        let minimal = r#"
[rollcall]
instance_name = "Test"
data_dir = "/tmp/rollcall"
"#;
        let cfg: RollcallConfig = toml::from_str(minimal).expect("minimal config should parse");
        assert_eq!(cfg.rollcall.instance_name, "Test");
        assert!(!cfg.source.enabled);
        assert_eq!(cfg.source.max_attempts, 5);
        assert_eq!(cfg.sync.batch_size, 500);
        assert!(cfg.calendar.holidays.is_empty());
    }

    #[test]
    fn load_nonexistent_file_returns_io_error() {
        let result = RollcallConfig::load(Path::new("/nonexistent/rollcall.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn load_invalid_toml_returns_config_error() {
        let dir = std::env::temp_dir().join("rollcall_test_bad_toml");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.toml");
        std::fs::write(&path, "this is [[[not valid toml").unwrap();

        let result = RollcallConfig::load(&path);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("config"));

        std::fs::remove_file(&path).ok();
        std::fs::remove_dir(&dir).ok();
    }

    #[test]
    fn load_from_file() {
        let dir = std::env::temp_dir().join("rollcall_test_config");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("rollcall.toml");
        std::fs::write(&path, SAMPLE_TOML).unwrap();

        let cfg = RollcallConfig::load(&path).expect("should load from file");
        assert_eq!(cfg.rollcall.instance_name, "Springfield USD");

        std::fs::remove_file(&path).ok();
        std::fs::remove_dir(&dir).ok();
    }
}
