use thiserror::Error;

/// Input and validation errors. Cluster I/O errors travel as `anyhow::Error`
/// and can carry one of these as their root cause.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to convert apply-wave {value:?} on {name} to integer: {source}")]
    InvalidWave {
        name: String,
        value: String,
        source: std::num::ParseIntError,
    },

    #[error("invalid version {version:?}: {reason}")]
    InvalidVersion { version: String, reason: &'static str },

    #[error("the selected manifests count {actual} does not match the expected manifests count {expected}")]
    CountMismatch { expected: usize, actual: usize },

    /// Every per-manifest problem found in one batch.
    #[error("{}", .0.join("; "))]
    InvalidManifests(Vec<String>),

    #[error("{what} is missing {field}")]
    MissingField { what: String, field: &'static str },

    #[error("invalid {what} {input:?}: expected {expected}")]
    Parse { what: &'static str, input: String, expected: &'static str },

    #[error("{what} is not found")]
    NotFound { what: String },

    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// True when `err` (or anything in its chain) is a [`Error::NotFound`].
    pub fn is_not_found(err: &anyhow::Error) -> bool {
        err.chain().any(|e| matches!(e.downcast_ref::<Error>(), Some(Error::NotFound { .. })))
    }

    pub fn is_cancelled(err: &anyhow::Error) -> bool {
        err.chain().any(|e| matches!(e.downcast_ref::<Error>(), Some(Error::Cancelled)))
    }
}
