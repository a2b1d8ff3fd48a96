//! Error types for the Rollcall core crate.

use thiserror::Error;

/// Top-level error type for all Rollcall core operations.
///
/// The variants mirror how failures propagate through a sync run:
/// record-level errors (`Validation`, `Load`) never abort a batch,
/// batch-level errors never abort a school, school-level errors
/// (`Transient` after retry exhaustion) never abort an operation.
/// `FatalAuth` is the single exception and aborts immediately.
#[derive(Debug, Error)]
pub enum RollcallError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Timeout, 429, or 5xx that survived the retry budget.
    #[error("transient source error: {0}")]
    Transient(String),

    /// The source does not expose this endpoint shape (HTTP 404);
    /// the caller should fall back to the next shape.
    #[error("unsupported endpoint shape: {0}")]
    UnsupportedShape(String),

    /// Invalid credentials. No further progress is possible.
    #[error("source authentication failed: {0}")]
    FatalAuth(String),

    /// Malformed record or invalid input; skipped and counted.
    #[error("validation error: {0}")]
    Validation(String),

    /// Storage constraint violation during bulk load.
    #[error("load error: {0}")]
    Load(String),

    /// Unexpected response from the source system.
    #[error("source error: {0}")]
    Source(String),
}

impl RollcallError {
    /// True when the error aborts the whole operation rather than
    /// a single school.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RollcallError::FatalAuth(_))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, RollcallError::Transient(_))
    }
}

/// A convenience Result alias that defaults to [`RollcallError`].
pub type Result<T> = std::result::Result<T, RollcallError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = RollcallError::Config("missing field".into());
        assert_eq!(err.to_string(), "configuration error: missing field");
    }

    #[test]
    fn transient_is_transient_not_fatal() {
        let err = RollcallError::Transient("429 after 5 attempts".into());
        assert!(err.is_transient());
        assert!(!err.is_fatal());
    }

    #[test]
    fn fatal_auth_is_fatal() {
        let err = RollcallError::FatalAuth("certificate rejected".into());
        assert!(err.is_fatal());
        assert!(!err.is_transient());
    }

    #[test]
    fn io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = RollcallError::from(io_err);
        assert!(matches!(err, RollcallError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn result_alias_works() {
        let ok: Result<i32> = Ok(42);
        assert!(ok.is_ok());

        let err: Result<i32> = Err(RollcallError::Validation("no date".into()));
        assert!(err.is_err());
    }
}
