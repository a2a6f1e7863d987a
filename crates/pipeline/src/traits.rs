//! Core traits for the analysis pipeline.
//!
//! This module defines the Analyzer trait that allows composable
//! table transformations to be chained in an `AnalyzerPipeline`.

use crate::error::Result;
use data_loader::ReadingTable;

/// Core trait for a table-to-table analysis stage.
///
/// ## Design Note
/// - `Send + Sync` allows analyzers to be shared across worker threads
/// - Analyzers borrow their input and return a new table; the input is
///   never modified
pub trait Analyzer: Send + Sync {
    /// Returns the name of this analyzer (for logging/debugging)
    fn name(&self) -> &str;

    /// Apply this analyzer to a reading table.
    ///
    /// # Returns
    /// * `Ok(ReadingTable)` - The derived table
    /// * `Err` - If the input or the analyzer's configuration is invalid
    fn apply(&self, table: &ReadingTable) -> Result<ReadingTable>;
}
