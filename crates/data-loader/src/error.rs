//! Error types for the data-loader crate.
//!
//! Covers both the file side (opening, reading and parsing delimited
//! telemetry files) and the table side (shape checks on `ReadingTable`
//! and `TankInfoTable`).

use thiserror::Error;

/// Errors that can occur while loading, writing or assembling telemetry tables
#[derive(Error, Debug)]
pub enum DataLoadError {
    /// File could not be found or opened
    #[error("Failed to open file: {path}")]
    FileNotFound { path: String },

    /// I/O error occurred while reading or writing a file
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The delimited reader/writer rejected the input
    #[error("Delimited file error: {0}")]
    Csv(#[from] csv::Error),

    /// A cell couldn't be parsed
    ///
    /// Line numbers are 1-based and count the header row.
    #[error("Parse error at line {line} in {file}: {reason}")]
    ParseError {
        file: String,
        line: usize,
        reason: String,
    },

    /// A required column is absent from the header
    #[error("Missing required column '{column}' in {file}")]
    MissingColumn { file: String, column: String },

    /// Table shape validation failed
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, DataLoadError>;
