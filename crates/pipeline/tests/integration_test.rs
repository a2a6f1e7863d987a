//! Integration tests for the pipeline.
//!
//! These tests run FeatureBuilder and StressScorer together the way the
//! orchestrator does and check the enriched table end to end.

use approx::assert_relative_eq;
use data_loader::{columns, Reading, ReadingTable, TankInfo, TankInfoTable};
use pipeline::{
    AnalyzerPipeline, FeatureBuilder, FeatureConfig, PipelineError, ReductionMode, StressConfig,
    StressScorer,
};
use std::collections::HashMap;
use std::sync::Arc;

fn create_test_setup() -> (ReadingTable, Arc<TankInfoTable>) {
    let readings = ReadingTable::from_readings(&[
        // Tank A: 3 readings
        Reading::new("A", 7.0, 25.0, 100.0),
        Reading::new("A", 7.2, 26.0, 100.0),
        Reading::new("A", 6.8, 27.0, 100.0),
        // Tank B: 2 readings, one without pH
        Reading::new("B", 6.5, 24.0, 200.0),
        Reading {
            tank_id: "B".to_string(),
            ph: None,
            temp: Some(24.5),
            capacity_liters: Some(200.0),
        },
        // Tank C: no metadata at all
        Reading::new("C", 8.0, 29.0, 50.0),
    ]);

    let tank_info = TankInfoTable::from_entries(vec![
        TankInfo::new("A", ["Guppy", "Neon Tetra"]),
        TankInfo::new("B", ["Guppy"]),
    ]);

    (readings, Arc::new(tank_info))
}

fn full_pipeline(tank_info: Arc<TankInfoTable>) -> AnalyzerPipeline {
    AnalyzerPipeline::new()
        .add_analyzer(FeatureBuilder::new(FeatureConfig::default()).with_tank_info(tank_info))
        .add_analyzer(StressScorer::new(
            StressConfig::default().with_mode(ReductionMode::Sequential),
        ))
}

#[test]
fn test_full_pipeline_row_count() {
    let (readings, tank_info) = create_test_setup();
    let out = full_pipeline(tank_info).apply(&readings).unwrap();

    // A: 3 x 2, B: 2 x 1, C kept once without species
    assert_eq!(out.len(), 6 + 2 + 1);
    assert_eq!(
        out.column_names(),
        vec![
            columns::TANK_ID,
            columns::PH,
            columns::TEMP,
            columns::CAPACITY_LITERS,
            columns::TANK_NUM_READINGS,
            columns::AVG_PH_PER_TANK,
            columns::TEMPERATURE_DEVIATION_SCALED,
            columns::FISH_SPECIES,
            columns::FISH_SPECIES_NUM_READINGS,
            columns::STRESS_SCORE,
        ]
    );
}

#[test]
fn test_per_tank_aggregates_survive_species_expansion() {
    let (readings, tank_info) = create_test_setup();
    let out = full_pipeline(tank_info).apply(&readings).unwrap();

    let counts = out.count_column(columns::TANK_NUM_READINGS).unwrap();
    let avg_ph = out.float_column(columns::AVG_PH_PER_TANK).unwrap();
    for (row, tank) in out.tank_ids().iter().enumerate() {
        match tank.as_str() {
            "A" => {
                assert_eq!(counts[row], Some(3));
                assert_relative_eq!(avg_ph[row].unwrap(), 7.0, epsilon = 1e-12);
            }
            "B" => {
                assert_eq!(counts[row], Some(2));
                assert_relative_eq!(avg_ph[row].unwrap(), 6.5, epsilon = 1e-12);
            }
            "C" => {
                assert_eq!(counts[row], Some(1));
                assert_relative_eq!(avg_ph[row].unwrap(), 8.0, epsilon = 1e-12);
            }
            other => panic!("unexpected tank {}", other),
        }
    }
}

#[test]
fn test_species_totals() {
    let (readings, tank_info) = create_test_setup();
    let out = full_pipeline(tank_info).apply(&readings).unwrap();

    let mut totals: HashMap<Option<String>, Option<u64>> = HashMap::new();
    let species = out.text_column(columns::FISH_SPECIES).unwrap();
    let counts = out.count_column(columns::FISH_SPECIES_NUM_READINGS).unwrap();
    for (name, count) in species.iter().zip(counts) {
        totals.insert(name.clone(), *count);
    }

    assert_eq!(totals[&Some("Guppy".to_string())], Some(5));
    assert_eq!(totals[&Some("Neon Tetra".to_string())], Some(3));
    assert_eq!(totals[&None], None);
}

#[test]
fn test_stress_score_is_uniform_and_matches_direct_scoring() {
    let (readings, tank_info) = create_test_setup();
    let out = full_pipeline(tank_info).apply(&readings).unwrap();

    let scores = out.float_column(columns::STRESS_SCORE).unwrap();
    let first = scores[0].unwrap();
    assert!(scores.iter().all(|s| *s == Some(first)));

    // The scorer runs on the expanded table, so duplicated rows count.
    let direct = StressScorer::new(StressConfig::default().with_mode(ReductionMode::Sequential))
        .score(&out)
        .unwrap();
    assert_relative_eq!(first, direct);
}

#[test]
fn test_two_species_three_readings_gives_six_rows() {
    let readings = ReadingTable::from_readings(&[
        Reading::new("T", 7.0, 25.0, 100.0),
        Reading::new("T", 7.1, 25.5, 100.0),
        Reading::new("T", 7.2, 26.0, 100.0),
    ]);
    let tank_info = Arc::new(TankInfoTable::from_entries(vec![TankInfo::new(
        "T",
        ["Molly", "Platy"],
    )]));

    let out = FeatureBuilder::new(FeatureConfig::default())
        .with_tank_info(tank_info)
        .build(&readings)
        .unwrap();
    assert_eq!(out.len(), 6);
    assert!(out
        .count_column(columns::FISH_SPECIES_NUM_READINGS)
        .unwrap()
        .iter()
        .all(|c| *c == Some(3)));
}

#[test]
fn test_errors_abort_before_output() {
    let (readings, _) = create_test_setup();

    let no_species = Arc::new(TankInfoTable::without_species(vec!["A".to_string()]));
    let err = full_pipeline(no_species).apply(&readings).unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));

    let no_capacity = readings.without_capacity();
    let err = AnalyzerPipeline::new()
        .add_analyzer(FeatureBuilder::new(FeatureConfig::default()))
        .add_analyzer(StressScorer::default())
        .apply(&no_capacity)
        .unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));
}

#[test]
fn test_scorer_runs_on_raw_input() {
    let (readings, _) = create_test_setup();
    let raw = StressScorer::default().score(&readings).unwrap();
    let enriched = FeatureBuilder::new(FeatureConfig::default())
        .build(&readings)
        .unwrap();

    // Without species expansion the rows are unchanged, so is the score.
    let after = StressScorer::default().score(&enriched).unwrap();
    assert_relative_eq!(raw, after, max_relative = 1e-9);
}
