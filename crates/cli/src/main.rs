use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use data_loader::{load_readings, DEFAULT_DELIMITER};
use orchestrator::{
    run_full_pipeline, JsonReportSink, MetricsSink, RunFiles, RunOutcome, TracingSink,
    DEFAULT_PROJECT,
};
use pipeline::{
    CapacityPolicy, PipelineConfig, ReductionMode, StressConfig, StressScorer,
    UnmatchedTankPolicy,
};
use std::path::PathBuf;
use std::time::Instant;

/// Aquarium - telemetry features and pairwise stress scoring
#[derive(Parser)]
#[command(name = "aquarium")]
#[command(about = "Per-tank features and stress scores for aquarium readings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build features, score stress and optionally write the enriched table
    Run {
        /// Sensor readings (tank_id, pH, temp[, capacity_liters])
        #[arg(long)]
        input: PathBuf,

        /// Tank metadata (tank_id, fish_species); enables species counts
        #[arg(long)]
        tank_info: Option<PathBuf>,

        /// Where to write the enriched table
        #[arg(long)]
        output: Option<PathBuf>,

        /// Label attached to the stress report
        #[arg(long, default_value = DEFAULT_PROJECT)]
        project: String,

        /// JSON pipeline config; flags below override it
        #[arg(long)]
        config: Option<PathBuf>,

        /// Reference temperature for temperature deviation
        #[arg(long)]
        standard_temperature: Option<f64>,

        /// Sum stress pairs on one thread in a fixed order
        #[arg(long)]
        sequential: bool,

        /// Fail on zero or negative capacity instead of treating it as missing
        #[arg(long)]
        reject_invalid_capacity: bool,

        /// Append a JSON line per run to this file
        #[arg(long)]
        report: Option<PathBuf>,

        /// Drop readings whose tank has no species
        #[arg(long)]
        drop_unmatched: bool,
    },

    /// Print the stress score of a readings file
    Score {
        /// Sensor readings with a capacity_liters column
        #[arg(long)]
        input: PathBuf,

        /// Sum stress pairs on one thread in a fixed order
        #[arg(long)]
        sequential: bool,
    },
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            input,
            tank_info,
            output,
            project,
            config,
            standard_temperature,
            sequential,
            reject_invalid_capacity,
            report,
            drop_unmatched,
        } => {
            let mut config = match config {
                Some(path) => PipelineConfig::from_json_file(&path)
                    .with_context(|| format!("Failed to load config {}", path.display()))?,
                None => PipelineConfig::default(),
            };
            if let Some(celsius) = standard_temperature {
                config.features.standard_temperature = celsius;
            }
            if sequential {
                config.stress.mode = ReductionMode::Sequential;
            }
            if reject_invalid_capacity {
                config = config.with_capacity_policy(CapacityPolicy::Reject);
            }
            if drop_unmatched {
                config.features.unmatched_tanks = UnmatchedTankPolicy::Drop;
            }

            let mut files = RunFiles::new(input);
            if let Some(path) = tank_info {
                files = files.with_tank_info(path);
            }
            if let Some(path) = output {
                files = files.with_output(path);
            }

            let sink: Box<dyn MetricsSink> = match report {
                Some(path) => Box::new(JsonReportSink::new(path)),
                None => Box::new(TracingSink),
            };

            handle_run(&files, config, &project, sink)?
        }
        Commands::Score { input, sequential } => handle_score(input, sequential)?,
    }

    Ok(())
}

/// Handle the 'run' command
fn handle_run(
    files: &RunFiles,
    config: PipelineConfig,
    project: &str,
    sink: Box<dyn MetricsSink>,
) -> Result<()> {
    println!("Analyzing {}...", files.input.display());
    let outcome = run_full_pipeline(files, config, project, Some(sink))?;
    print_summary(project, &outcome);

    if let Some(output) = &files.output {
        println!("{} Wrote enriched table to {}", "✓".green(), output.display());
    }
    Ok(())
}

/// Handle the 'score' command
fn handle_score(input: PathBuf, sequential: bool) -> Result<()> {
    let start = Instant::now();
    let readings = load_readings(&input, DEFAULT_DELIMITER)
        .with_context(|| format!("Failed to load readings from {}", input.display()))?;

    let mode = if sequential {
        ReductionMode::Sequential
    } else {
        ReductionMode::Parallel
    };
    let score = StressScorer::new(StressConfig::default().with_mode(mode))
        .score(&readings)
        .context("Failed to score readings")?;

    tracing::debug!("Scored {} readings in {:?}", readings.len(), start.elapsed());
    println!("{}", score);
    Ok(())
}

fn print_summary(project: &str, outcome: &RunOutcome) {
    println!("{}", format!("Stress report for {}:", project).bold().blue());
    println!("{}Rows: {}", "• ".green(), outcome.table.len());
    println!("{}Columns: {}", "• ".green(), outcome.table.column_names().join(", "));
    match outcome.stress_score {
        Some(score) => println!(
            "{}Stress score: {}",
            "• ".cyan(),
            format!("{:.4}", score).bold()
        ),
        None => println!("{}Stress score: {}", "• ".cyan(), "n/a (no rows)".yellow()),
    }
    println!("{}Elapsed: {:?}", "• ".cyan(), outcome.elapsed);
}
