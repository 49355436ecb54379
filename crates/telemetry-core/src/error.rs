//! Telemetry error types.

use thiserror::Error;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can stop a producer strategy.
#[derive(Error, Debug)]
pub enum Error {
    /// The configured data source could not be opened or read.
    #[error("Source unavailable ({source_name}): {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    /// The historical dataset is structurally unusable.
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// A stream that was already open stopped delivering data.
    #[error("Stream interrupted: {0}")]
    Interrupted(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV decoding errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Frame encoding/decoding errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a source-unavailable error.
    pub fn source_unavailable(source_name: impl Into<String>, reason: impl ToString) -> Self {
        Self::SourceUnavailable {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a dataset error.
    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }

    /// Create a stream-interrupted error.
    pub fn interrupted(msg: impl Into<String>) -> Self {
        Self::Interrupted(msg.into())
    }

    /// Whether the scheduler may restart the strategy after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Interrupted(_))
    }
}

/// Errors reported by a single subscriber delivery.
#[derive(Error, Debug)]
pub enum SendError {
    /// The subscriber has already closed.
    #[error("subscriber closed")]
    Closed,

    /// The underlying transport rejected the message.
    #[error("transport error: {0}")]
    Transport(String),
}

impl SendError {
    pub fn transport(msg: impl ToString) -> Self {
        Self::Transport(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(Error::interrupted("device unplugged").is_recoverable());
        assert!(!Error::source_unavailable("replay", "missing").is_recoverable());
        assert!(!Error::dataset("no rows").is_recoverable());
    }

    #[test]
    fn test_source_unavailable_message() {
        let err = Error::source_unavailable("/dev/ttyUSB0", "No such file or directory");
        assert_eq!(
            err.to_string(),
            "Source unavailable (/dev/ttyUSB0): No such file or directory"
        );
    }
}
