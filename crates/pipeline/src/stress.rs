//! Pairwise stress scoring.
//!
//! ## Algorithm
//! For every ordered pair (i, j) of the n readings, self pairs included:
//! - skip the pair if pH, temp or capacity is missing on either side
//! - `ph_dev = |pH_i - pH_j|`, `temp_dev = |temp_i - temp_j| * 2`
//! - `crowding = 500 / cap_i + 500 / cap_j`
//! - add `(ph_dev + temp_dev) * crowding`
//!
//! The score is the sum divided by n², where n counts every row, skipped
//! or not. Self pairs add 0 but still count in the denominator.

use crate::config::{ReductionMode, StressConfig};
use crate::error::{PipelineError, Result};
use crate::traits::Analyzer;
use data_loader::{columns, Column, ReadingTable};
use rayon::prelude::*;
use tracing::{debug, instrument};

/// A reading with every input to the kernel present
#[derive(Debug, Clone, Copy)]
struct Sample {
    ph: f64,
    temp: f64,
    /// `crowding_numerator / capacity`
    crowding: f64,
}

/// Computes the batch stress score and attaches it as `stress_score`.
#[derive(Debug, Clone, Default)]
pub struct StressScorer {
    config: StressConfig,
}

impl StressScorer {
    pub fn new(config: StressConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StressConfig {
        &self.config
    }

    /// Score a batch of readings.
    ///
    /// Returns 0.0 for an empty table (whatever its schema), a single
    /// reading, or a table where no pair is complete.
    ///
    /// # Errors
    /// * `Validation` - a non-empty table whose schema has no
    ///   `capacity_liters` column, or a non-positive capacity under
    ///   `CapacityPolicy::Reject`
    #[instrument(skip_all, fields(rows = readings.len(), mode = ?self.config.mode))]
    pub fn score(&self, readings: &ReadingTable) -> Result<f64> {
        let n = readings.len();
        if n == 0 {
            return Ok(0.0);
        }

        let capacity = readings.capacity_liters().ok_or_else(|| {
            PipelineError::Validation(format!(
                "stress score needs the '{}' column",
                columns::CAPACITY_LITERS
            ))
        })?;
        let capacity = self.config.capacity_policy.screen(capacity, "crowding factor")?;

        let samples = self.complete_samples(readings, &capacity);
        let total = match self.config.mode {
            ReductionMode::Parallel => self.pair_sum_parallel(&samples),
            ReductionMode::Sequential => self.pair_sum_sequential(&samples),
        };
        let score = total / (n as f64 * n as f64);

        debug!(
            "Stress score {:.6} over {} rows ({} complete)",
            score,
            n,
            samples.len()
        );
        Ok(score)
    }

    /// Rows with pH, temp and usable capacity; all others never pair.
    fn complete_samples(&self, readings: &ReadingTable, capacity: &[Option<f64>]) -> Vec<Sample> {
        readings
            .ph()
            .iter()
            .zip(readings.temp())
            .zip(capacity)
            .filter_map(|((ph, temp), cap)| match (ph, temp, cap) {
                (Some(ph), Some(temp), Some(cap)) => Some(Sample {
                    ph: *ph,
                    temp: *temp,
                    crowding: self.config.crowding_numerator / cap,
                }),
                _ => None,
            })
            .collect()
    }

    fn contribution(&self, a: &Sample, b: &Sample) -> f64 {
        let ph_dev = (a.ph - b.ph).abs() * self.config.ph_weight;
        let temp_dev = (a.temp - b.temp).abs() * self.config.temp_weight;
        (ph_dev + temp_dev) * (a.crowding + b.crowding)
    }

    /// Sum of `a` paired with every sample (a itself included)
    fn row_sum(&self, a: &Sample, samples: &[Sample]) -> f64 {
        samples.iter().map(|b| self.contribution(a, b)).sum()
    }

    fn pair_sum_sequential(&self, samples: &[Sample]) -> f64 {
        samples.iter().map(|a| self.row_sum(a, samples)).sum()
    }

    /// Outer rows sharded across the pool, partial sums combined by addition
    fn pair_sum_parallel(&self, samples: &[Sample]) -> f64 {
        samples
            .par_iter()
            .fold(|| 0.0, |acc, a| acc + self.row_sum(a, samples))
            .reduce(|| 0.0, |left, right| left + right)
    }
}

impl Analyzer for StressScorer {
    fn name(&self) -> &str {
        "StressScorer"
    }

    fn apply(&self, table: &ReadingTable) -> Result<ReadingTable> {
        let score = self.score(table)?;
        Ok(table
            .clone()
            .with_column(Column::constant_float(columns::STRESS_SCORE, score, table.len()))?)
    }
}
