//! The AnalyzerPipeline runs multiple analyzers in sequence.

use crate::error::Result;
use crate::traits::Analyzer;
use data_loader::ReadingTable;
use std::borrow::Cow;
use tracing::debug;

/// Chains analyzers together into a processing pipeline.
///
/// ## Usage
/// ```ignore
/// let pipeline = AnalyzerPipeline::new()
///     .add_analyzer(FeatureBuilder::new(FeatureConfig::default()))
///     .add_analyzer(StressScorer::new(StressConfig::default()));
///
/// let enriched = pipeline.apply(&readings)?;
/// ```
pub struct AnalyzerPipeline {
    analyzers: Vec<Box<dyn Analyzer>>,
}

impl AnalyzerPipeline {
    /// Create a new empty AnalyzerPipeline.
    pub fn new() -> Self {
        Self {
            analyzers: Vec::new(),
        }
    }

    /// Add an analyzer to the end of the pipeline (builder pattern).
    pub fn add_analyzer(mut self, analyzer: impl Analyzer + 'static) -> Self {
        self.analyzers.push(Box::new(analyzer));
        self
    }

    pub fn len(&self) -> usize {
        self.analyzers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }

    /// Analyzer names in execution order
    pub fn names(&self) -> Vec<&str> {
        self.analyzers.iter().map(|a| a.name()).collect()
    }

    /// Apply all analyzers in order.
    ///
    /// The first failure aborts the run and nothing is returned. An empty
    /// pipeline returns a copy of its input.
    pub fn apply(&self, table: &ReadingTable) -> Result<ReadingTable> {
        let mut current = Cow::Borrowed(table);
        for analyzer in &self.analyzers {
            debug!(
                "Applying analyzer: {} (input rows: {})",
                analyzer.name(),
                current.len()
            );
            current = Cow::Owned(analyzer.apply(&current)?);
            debug!(
                "Analyzer applied: {} (output rows: {}, columns: {})",
                analyzer.name(),
                current.len(),
                current.columns().len()
            );
        }
        Ok(current.into_owned())
    }
}

impl Default for AnalyzerPipeline {
    fn default() -> Self {
        Self::new()
    }
}
