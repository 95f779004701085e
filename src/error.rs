//! Run-level errors.
//!
//! Every fatal failure maps to one variant and one process exit code. Per-record
//! problems (missing fields, out-of-range values) are *not* errors: they are
//! recorded as violations in the report.

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Malformed rule definitions or invalid run configuration.
    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),

    /// The dataset could be read but does not have the expected shape.
    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Insufficient data: {records} record(s) supplied, at least {minimum} required for outlier scoring")]
    InsufficientData { records: usize, minimum: usize },

    #[error("Estimator error: {0}")]
    Estimator(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }

    pub fn dataset(message: impl Into<String>) -> Self {
        Self::Dataset(message.into())
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Config(_) | AppError::Io(_) | AppError::Dataset(_) => 2,
            AppError::InsufficientData { .. } => 3,
            AppError::Estimator(_) | AppError::Internal(_) => 4,
        }
    }
}
