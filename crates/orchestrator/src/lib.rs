//! Orchestrator crate for the aquarium analysis pipeline.
//!
//! This crate wires the feature and stress stages together, loads and
//! writes telemetry files, and forwards stress scores to a reporting sink.

pub mod orchestrator;
pub mod sink;

pub use orchestrator::{
    run_full_pipeline, AquariumOrchestrator, RunFiles, RunOutcome, DEFAULT_PROJECT,
};
pub use sink::{JsonReportSink, MetricsSink, StressReport, TracingSink};
