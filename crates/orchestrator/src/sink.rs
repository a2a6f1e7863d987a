//! Reporting sinks for stress scores.
//!
//! A sink receives one `StressReport` per pipeline run. Two are provided:
//! `TracingSink` emits a structured log event and `JsonReportSink` appends
//! one JSON line per run to a file.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Summary of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressReport {
    pub project: String,
    pub recorded_at: DateTime<Utc>,
    pub input_rows: usize,
    pub output_rows: usize,
    /// `None` when the run produced no rows to carry the score
    pub stress_score: Option<f64>,
    pub elapsed_ms: u64,
}

/// Destination for run reports
pub trait MetricsSink: Send + Sync {
    /// Returns the name of this sink (for logging/debugging)
    fn name(&self) -> &str;

    fn record(&self, report: &StressReport) -> Result<()>;
}

/// Logs each report as a structured `info` event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn name(&self) -> &str {
        "TracingSink"
    }

    fn record(&self, report: &StressReport) -> Result<()> {
        info!(
            project = %report.project,
            stress_score = ?report.stress_score,
            input_rows = report.input_rows,
            output_rows = report.output_rows,
            elapsed_ms = report.elapsed_ms,
            "stress score recorded"
        );
        Ok(())
    }
}

/// Appends each report as a JSON line
#[derive(Debug, Clone)]
pub struct JsonReportSink {
    path: PathBuf,
}

impl JsonReportSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MetricsSink for JsonReportSink {
    fn name(&self) -> &str {
        "JsonReportSink"
    }

    fn record(&self, report: &StressReport) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open report file {}", self.path.display()))?;

        let line = serde_json::to_string(report).context("Failed to serialize stress report")?;
        writeln!(file, "{}", line)
            .with_context(|| format!("Failed to write report file {}", self.path.display()))?;
        Ok(())
    }
}
