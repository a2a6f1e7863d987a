//! Error types for the pipeline crate.

use data_loader::DataLoadError;
use thiserror::Error;

/// Errors raised by analyzers.
///
/// Configuration and validation problems are detected before any
/// aggregation work starts, so a failed call never leaves partial output.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// An operation needs optional input that was not supplied
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A required column is absent or has the wrong shape
    #[error("Validation error: {0}")]
    Validation(String),

    /// Any other data-layer failure
    #[error(transparent)]
    Data(DataLoadError),
}

impl From<DataLoadError> for PipelineError {
    fn from(err: DataLoadError) -> Self {
        match err {
            DataLoadError::ValidationError(reason) => PipelineError::Validation(reason),
            other => PipelineError::Data(other),
        }
    }
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, PipelineError>;
