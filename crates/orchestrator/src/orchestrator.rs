//! # Aquarium Orchestrator
//!
//! Coordinates one analysis run:
//! 1. Load readings and (optionally) tank info, in parallel
//! 2. Build per-tank / per-species features
//! 3. Score pairwise stress over the enriched table
//! 4. Forward the score to the reporting sink, if any
//! 5. Write the enriched table, if an output path is given
//!
//! The stages themselves live in the `pipeline` crate; this module only
//! sequences them and owns the file and reporting edges.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, instrument};

use crate::sink::{MetricsSink, StressReport};
use data_loader::{
    columns, load_readings, load_tank_info, write_readings, ReadingTable, TankInfoTable,
};
use pipeline::{AnalyzerPipeline, FeatureBuilder, PipelineConfig, StressScorer};

/// Run label used when none is supplied
pub const DEFAULT_PROJECT: &str = "AquariumProject";

/// Result of one orchestrated run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Enriched table, including the `stress_score` column
    pub table: ReadingTable,
    pub stress_score: Option<f64>,
    pub elapsed: Duration,
}

/// Runs FeatureBuilder then StressScorer and reports the result
pub struct AquariumOrchestrator {
    pipeline: AnalyzerPipeline,
    project_name: String,
    sink: Option<Box<dyn MetricsSink>>,
}

impl AquariumOrchestrator {
    /// Create an orchestrator.
    ///
    /// Species counts are enabled exactly when `tank_info` is supplied.
    pub fn new(config: PipelineConfig, tank_info: Option<Arc<TankInfoTable>>) -> Self {
        let mut features = FeatureBuilder::new(config.features);
        if let Some(tank_info) = tank_info {
            features = features.with_tank_info(tank_info);
        }

        let pipeline = AnalyzerPipeline::new()
            .add_analyzer(features)
            .add_analyzer(StressScorer::new(config.stress));

        Self {
            pipeline,
            project_name: DEFAULT_PROJECT.to_string(),
            sink: None,
        }
    }

    pub fn with_project_name(mut self, project_name: impl Into<String>) -> Self {
        self.project_name = project_name.into();
        self
    }

    pub fn with_sink(mut self, sink: impl MetricsSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    /// Run the pipeline over a materialized batch of readings.
    ///
    /// Either the full enriched table comes back or nothing does; a
    /// reporting failure also fails the run.
    #[instrument(skip_all, fields(project = %self.project_name, rows = readings.len()))]
    pub fn run(&self, readings: &ReadingTable) -> Result<RunOutcome> {
        let start_time = Instant::now();
        info!(
            "Running analyzers [{}] on {} readings",
            self.pipeline.names().join(", "),
            readings.len()
        );

        let table = self
            .pipeline
            .apply(readings)
            .context("Aquarium pipeline failed")?;

        let stress_score = table
            .float_column(columns::STRESS_SCORE)
            .and_then(|scores| scores.first().copied().flatten());
        let elapsed = start_time.elapsed();
        info!(
            "Pipeline produced {} rows, stress score {:?}, in {:.2?}",
            table.len(),
            stress_score,
            elapsed
        );

        if let Some(sink) = &self.sink {
            let report = StressReport {
                project: self.project_name.clone(),
                recorded_at: Utc::now(),
                input_rows: readings.len(),
                output_rows: table.len(),
                stress_score,
                elapsed_ms: elapsed.as_millis() as u64,
            };
            sink.record(&report)
                .with_context(|| format!("Failed to report stress score to {}", sink.name()))?;
        }

        Ok(RunOutcome {
            table,
            stress_score,
            elapsed,
        })
    }
}

/// File locations for `run_full_pipeline`
#[derive(Debug, Clone)]
pub struct RunFiles {
    pub input: PathBuf,
    pub tank_info: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub delimiter: u8,
}

impl RunFiles {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            tank_info: None,
            output: None,
            delimiter: data_loader::DEFAULT_DELIMITER,
        }
    }

    pub fn with_tank_info(mut self, path: impl Into<PathBuf>) -> Self {
        self.tank_info = Some(path.into());
        self
    }

    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }
}

fn load_inputs(files: &RunFiles) -> Result<(ReadingTable, Option<TankInfoTable>)> {
    let (readings, tank_info) = rayon::join(
        || load_readings(&files.input, files.delimiter),
        || {
            files
                .tank_info
                .as_deref()
                .map(|path: &Path| load_tank_info(path, files.delimiter))
                .transpose()
        },
    );

    let readings = readings
        .with_context(|| format!("Failed to load readings from {}", files.input.display()))?;
    let tank_info = tank_info.context("Failed to load tank info")?;
    Ok((readings, tank_info))
}

/// Load, analyze, report and (optionally) write in one call.
pub fn run_full_pipeline(
    files: &RunFiles,
    config: PipelineConfig,
    project_name: &str,
    sink: Option<Box<dyn MetricsSink>>,
) -> Result<RunOutcome> {
    let (readings, tank_info) = load_inputs(files)?;
    info!(
        "Loaded {} readings{}",
        readings.len(),
        tank_info
            .as_ref()
            .map(|t| format!(" and {} tank info rows", t.len()))
            .unwrap_or_default()
    );

    let mut orchestrator =
        AquariumOrchestrator::new(config, tank_info.map(Arc::new)).with_project_name(project_name);
    orchestrator.sink = sink;

    let outcome = orchestrator.run(&readings)?;

    if let Some(output) = &files.output {
        write_readings(&outcome.table, output, files.delimiter)
            .with_context(|| format!("Failed to write enriched table to {}", output.display()))?;
        info!("Wrote {} rows to {}", outcome.table.len(), output.display());
    }

    Ok(outcome)
}
