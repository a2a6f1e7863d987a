//! Tunable constants for the feature and stress stages.
//!
//! Every threshold lives here rather than in the stage code. Configs derive
//! serde with `#[serde(default)]`, so a JSON file only needs the fields it
//! overrides.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::warn;

/// Reference temperature (°C) for temperature deviation
pub const STANDARD_TEMPERATURE: f64 = 26.0;

/// Numerator of the capacity scaling applied to temperature deviation
pub const CAPACITY_SCALE: f64 = 1000.0;

/// Numerator of the per-reading crowding factor in the stress score
pub const CROWDING_NUMERATOR: f64 = 500.0;

/// How to treat a `capacity_liters` value that is zero or negative.
///
/// Both temperature scaling and the crowding factor divide by capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityPolicy {
    /// Exclude the value as if it were missing
    #[default]
    TreatAsMissing,
    /// Fail the whole call with a validation error
    Reject,
}

impl CapacityPolicy {
    /// Screen a capacity column, returning only usable (positive) values.
    ///
    /// `stage` names the consumer in log and error messages.
    pub fn screen(&self, capacities: &[Option<f64>], stage: &str) -> Result<Vec<Option<f64>>> {
        let invalid: Vec<usize> = capacities
            .iter()
            .enumerate()
            .filter(|(_, c)| matches!(c, Some(v) if *v <= 0.0))
            .map(|(row, _)| row)
            .collect();

        if let Some(&first) = invalid.first() {
            match self {
                CapacityPolicy::Reject => {
                    return Err(PipelineError::Validation(format!(
                        "{} non-positive capacity_liters value(s) for {} (first at row {})",
                        invalid.len(),
                        stage,
                        first
                    )));
                }
                CapacityPolicy::TreatAsMissing => {
                    warn!(
                        "Treating {} non-positive capacity_liters value(s) as missing for {}",
                        invalid.len(),
                        stage
                    );
                }
            }
        }

        Ok(capacities
            .iter()
            .map(|c| c.filter(|v| *v > 0.0))
            .collect())
    }
}

/// What the species step does with readings whose tank houses no species
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedTankPolicy {
    /// Keep the reading once, with unknown species columns
    #[default]
    Keep,
    /// Remove the reading from the species-expanded output
    Drop,
}

/// Combine strategy for the pairwise reduction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReductionMode {
    /// Rows sharded across the rayon pool; rounding may differ run to run
    #[default]
    Parallel,
    /// One thread, fixed summation order
    Sequential,
}

/// Which derived columns the feature stage produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureSet {
    pub tank_counts: bool,
    pub avg_ph: bool,
    pub temperature_deviation: bool,
    pub species_counts: bool,
}

impl Default for FeatureSet {
    fn default() -> Self {
        Self {
            tank_counts: true,
            avg_ph: true,
            temperature_deviation: true,
            species_counts: false,
        }
    }
}

/// Configuration for `FeatureBuilder`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub standard_temperature: f64,
    pub capacity_scale: f64,
    pub capacity_policy: CapacityPolicy,
    pub unmatched_tanks: UnmatchedTankPolicy,
    pub features: FeatureSet,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            standard_temperature: STANDARD_TEMPERATURE,
            capacity_scale: CAPACITY_SCALE,
            capacity_policy: CapacityPolicy::default(),
            unmatched_tanks: UnmatchedTankPolicy::default(),
            features: FeatureSet::default(),
        }
    }
}

impl FeatureConfig {
    /// Configure the reference temperature (default: 26.0)
    pub fn with_standard_temperature(mut self, celsius: f64) -> Self {
        self.standard_temperature = celsius;
        self
    }

    pub fn with_capacity_policy(mut self, policy: CapacityPolicy) -> Self {
        self.capacity_policy = policy;
        self
    }

    pub fn with_unmatched_tanks(mut self, policy: UnmatchedTankPolicy) -> Self {
        self.unmatched_tanks = policy;
        self
    }

    pub fn with_features(mut self, features: FeatureSet) -> Self {
        self.features = features;
        self
    }
}

/// Configuration for `StressScorer`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StressConfig {
    pub ph_weight: f64,
    pub temp_weight: f64,
    pub crowding_numerator: f64,
    pub capacity_policy: CapacityPolicy,
    pub mode: ReductionMode,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            ph_weight: 1.0,
            temp_weight: 2.0,
            crowding_numerator: CROWDING_NUMERATOR,
            capacity_policy: CapacityPolicy::default(),
            mode: ReductionMode::default(),
        }
    }
}

impl StressConfig {
    pub fn with_mode(mut self, mode: ReductionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_capacity_policy(mut self, policy: CapacityPolicy) -> Self {
        self.capacity_policy = policy;
        self
    }
}

/// Configuration for both stages, as read from a JSON file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub features: FeatureConfig,
    pub stress: StressConfig,
}

impl PipelineConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            PipelineError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            PipelineError::Configuration(format!("invalid config {}: {}", path.display(), e))
        })
    }

    /// Apply one capacity policy to both stages
    pub fn with_capacity_policy(mut self, policy: CapacityPolicy) -> Self {
        self.features.capacity_policy = policy;
        self.stress.capacity_policy = policy;
        self
    }
}
