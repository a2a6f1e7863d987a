//! Feature aggregation and pairwise stress scoring for aquarium readings.
//!
//! This crate provides:
//! - Analyzer trait and AnalyzerPipeline for composing table stages
//! - FeatureBuilder for per-tank and per-species derived columns
//! - StressScorer for the batch-wide pairwise stress score
//!
//! ## Architecture
//! Readings flow through the stages in order:
//! 1. FeatureBuilder adds derived columns (and expands rows per species
//!    when tank metadata is supplied)
//! 2. StressScorer reduces pH, temp and capacity over all ordered pairs and
//!    attaches the result as a constant `stress_score` column
//!
//! ## Example Usage
//! ```ignore
//! use pipeline::{AnalyzerPipeline, FeatureBuilder, PipelineConfig, StressScorer};
//!
//! let config = PipelineConfig::default();
//! let pipeline = AnalyzerPipeline::new()
//!     .add_analyzer(FeatureBuilder::new(config.features.clone()).with_tank_info(tank_info))
//!     .add_analyzer(StressScorer::new(config.stress.clone()));
//!
//! let enriched = pipeline.apply(&readings)?;
//! ```

pub mod analyzer_pipeline;
pub mod config;
pub mod error;
pub mod features;
pub mod stress;
pub mod traits;

// Re-export main types
pub use analyzer_pipeline::AnalyzerPipeline;
pub use config::{
    CapacityPolicy, FeatureConfig, FeatureSet, PipelineConfig, ReductionMode, StressConfig,
    UnmatchedTankPolicy,
};
pub use error::{PipelineError, Result};
pub use features::{merge_positional, ColumnBatch, FeatureBuilder};
pub use stress::StressScorer;
pub use traits::Analyzer;
