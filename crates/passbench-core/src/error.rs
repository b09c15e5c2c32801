//! Centralized error types for passbench.
//!
//! Uses thiserror for ergonomic error handling with context.

use thiserror::Error;

/// Main error type for passbench operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PassbenchError {
    /// Input file not found at specified path.
    #[error("Dataset not found: {0}")]
    DatasetNotFound(String),

    /// Invalid configuration detected.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Reference CSV is structurally broken.
    #[error("Malformed reference data in {path}, row {row}: {reason}")]
    MalformedReference {
        path: String,
        row: usize,
        reason: String,
    },

    /// A required column is missing from the reference CSV header.
    #[error("Reference data is missing required column '{0}'")]
    MissingColumn(String),

    /// The predictions file has an unusable top-level shape.
    #[error("Unusable predictions file {path}: {reason}")]
    BadPredictions { path: String, reason: String },

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML deserialization error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Generic error with context.
    #[error("{0}")]
    Other(String),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, PassbenchError>;

impl PassbenchError {
    /// Check if the error points at user-supplied input data
    /// (as opposed to configuration or environment problems).
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            PassbenchError::DatasetNotFound(_)
                | PassbenchError::MalformedReference { .. }
                | PassbenchError::MissingColumn(_)
                | PassbenchError::BadPredictions { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PassbenchError::MalformedReference {
            path: "dev.csv".to_string(),
            row: 7,
            reason: "id 'x7' is not an integer".to_string(),
        };
        assert!(err.to_string().contains("row 7"));
        assert!(err.to_string().contains("dev.csv"));
        assert!(err.is_data_error());
    }

    #[test]
    fn test_missing_column_is_data_error() {
        let err = PassbenchError::MissingColumn("test_list".to_string());
        assert!(err.to_string().contains("test_list"));
        assert!(err.is_data_error());
    }

    #[test]
    fn test_config_error_is_not_data_error() {
        let err = PassbenchError::InvalidConfig("timeout_secs must be > 0".to_string());
        assert!(!err.is_data_error());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let err = PassbenchError::from(io);
        assert!(matches!(err, PassbenchError::Io(_)));
        assert!(!err.is_data_error());
    }
}
