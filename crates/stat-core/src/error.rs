//! Error types for the statistics engines
//!
//! Provides a unified error type for all stat-engine crates. Most variants
//! describe a failure local to one request; the engines turn those into a
//! diagnostic and move on to the next request. [`Error::Inconsistent`] is the
//! one that aborts a whole phase call.

use thiserror::Error;

/// Core error type for statistics operations
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid parameter provided to a setter or descriptor
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A request references a column the table does not have
    #[error("Missing column: {column}")]
    MissingColumn { column: String },

    /// A column exists but holds values the algorithm cannot process
    #[error("Type mismatch in column {column}: expected {expected}, found {found}")]
    TypeMismatch {
        column: String,
        expected: String,
        found: String,
    },

    /// Model tables disagree with each other (cardinalities, shapes, keys)
    #[error("Inconsistent model: {0}")]
    Inconsistent(String),

    /// A table the phase depends on is absent from the model
    #[error("Missing model table: {0}")]
    MissingTable(String),

    /// Insufficient data for the requested operation
    #[error("Insufficient data: expected at least {expected} samples, got {actual}")]
    InsufficientData { expected: usize, actual: usize },

    /// Descriptor text could not be parsed
    #[error("Parse error at position {position}: {message}")]
    Parse { position: usize, message: String },

    /// Registry lookup failed
    #[error("Unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    /// Numerical computation error
    #[error("Computation error: {0}")]
    Computation(String),

    /// Model (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other errors
    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

// Helper functions for common error patterns

impl Error {
    /// Create an error for a column absent from a table
    pub fn missing_column(column: &str) -> Self {
        Self::MissingColumn {
            column: column.to_string(),
        }
    }

    /// Create an error for a column of the wrong kind
    pub fn type_mismatch(column: &str, expected: &str, found: &str) -> Self {
        Self::TypeMismatch {
            column: column.to_string(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    /// Create an error for an inconsistent model
    pub fn inconsistent(context: impl Into<String>) -> Self {
        Self::Inconsistent(context.into())
    }

    /// Create an error for a table missing from a model
    pub fn missing_table(name: &str) -> Self {
        Self::MissingTable(name.to_string())
    }

    /// Create an error for mismatched column lengths
    pub fn size_mismatch(expected: usize, actual: usize, context: &str) -> Self {
        Self::InvalidParameter(format!(
            "Size mismatch in {context}: expected {expected}, got {actual}"
        ))
    }

    /// Whether this error is confined to a single request
    ///
    /// Request-local errors are reported and skipped; everything else aborts
    /// the phase call.
    pub fn is_request_local(&self) -> bool {
        matches!(
            self,
            Self::MissingColumn { .. }
                | Self::TypeMismatch { .. }
                | Self::MissingTable(_)
                | Self::InsufficientData { .. }
        )
    }
}
