//! Feature engineering for aquarium readings.
//!
//! Derived columns, each a pure function of the input table:
//! - `tank_num_readings`: readings per tank, broadcast to every row
//! - `avg_pH_per_tank`: mean of present pH per tank, broadcast
//! - `temperature_deviation[_scaled]`: distance from the standard
//!   temperature, scaled by capacity when the schema has a capacity column
//! - `fish_species` / `fish_species_num_readings`: per-species reading
//!   totals, joined through tank metadata
//!
//! ## Composition
//! The first three steps only read the input and write disjoint columns,
//! so they run concurrently and are merged positionally. Each step stamps
//! its output with the fingerprint of the table it read; the merge refuses
//! any batch whose stamp or length doesn't match. The species step runs
//! after the merge and joins by key, because it changes the row count.

use crate::config::{FeatureConfig, UnmatchedTankPolicy};
use crate::error::{PipelineError, Result};
use crate::traits::Analyzer;
use data_loader::{columns, Column, ReadingTable, RowFingerprint, TankId, TankInfoTable};
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Columns computed by one positional step, stamped with the rows they
/// were computed from.
#[derive(Debug, Clone)]
pub struct ColumnBatch {
    pub step: &'static str,
    pub source: RowFingerprint,
    pub columns: Vec<Column>,
}

impl ColumnBatch {
    pub fn new(step: &'static str, source: &ReadingTable, columns: Vec<Column>) -> Self {
        Self {
            step,
            source: source.fingerprint(),
            columns,
        }
    }
}

/// Attach batches to `table` by row position.
///
/// Every batch must have been computed from exactly this table (same row
/// count, same row order) and every column must have one value per row.
/// Otherwise the merge fails with a validation error naming the step.
pub fn merge_positional(
    table: &ReadingTable,
    batches: impl IntoIterator<Item = ColumnBatch>,
) -> Result<ReadingTable> {
    let expected = table.fingerprint();
    let mut merged = table.clone();

    for batch in batches {
        if batch.source != expected {
            return Err(PipelineError::Validation(format!(
                "step '{}' was computed over {} rows in a different order than the {} input rows",
                batch.step, batch.source.rows, expected.rows
            )));
        }
        for column in batch.columns {
            if column.len() != expected.rows {
                return Err(PipelineError::Validation(format!(
                    "step '{}' returned {} values for '{}' but the input has {} rows",
                    batch.step,
                    column.len(),
                    column.name,
                    expected.rows
                )));
            }
            merged = merged.with_column(column)?;
        }
    }
    Ok(merged)
}

/// Readings per tank
fn tank_counts(tank_ids: &[TankId]) -> HashMap<&str, u64> {
    let mut counts = HashMap::new();
    for tank in tank_ids {
        *counts.entry(tank.as_str()).or_insert(0) += 1;
    }
    counts
}

/// Distinct species per tank, in first-seen order.
///
/// Accepts both list-valued rows and rows already exploded to one species
/// each; repeated (tank, species) pairs collapse to one.
fn species_by_tank(
    info: &TankInfoTable,
    species: &[Vec<String>],
) -> HashMap<TankId, Vec<String>> {
    let mut by_tank: HashMap<TankId, Vec<String>> = HashMap::new();
    for (tank, names) in info.tank_ids().iter().zip(species) {
        let entry = by_tank.entry(tank.clone()).or_default();
        for name in names {
            if !entry.contains(name) {
                entry.push(name.clone());
            }
        }
    }
    by_tank
}

/// Computes per-tank and per-species feature columns.
///
/// ## Performance Note
/// Count, mean pH and temperature deviation run concurrently via
/// `rayon::join`; per-species sums fan out with `par_iter`.
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    config: FeatureConfig,
    tank_info: Option<Arc<TankInfoTable>>,
}

impl FeatureBuilder {
    /// Create a FeatureBuilder without tank metadata.
    pub fn new(config: FeatureConfig) -> Self {
        Self {
            config,
            tank_info: None,
        }
    }

    /// Supply tank metadata and switch on species counts.
    pub fn with_tank_info(mut self, tank_info: Arc<TankInfoTable>) -> Self {
        self.tank_info = Some(tank_info);
        self.config.features.species_counts = true;
        self
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Compute every configured derived column.
    ///
    /// When species counts are on, the output has one row per
    /// (reading, species of its tank): a reading in a tank housing k
    /// species appears k times. Readings in tanks without species are kept
    /// once or dropped according to `unmatched_tanks`.
    ///
    /// # Errors
    /// * `Configuration` - species counts requested without tank info
    /// * `Validation` - tank info lacks `fish_species`, or a non-positive
    ///   capacity under `CapacityPolicy::Reject`
    #[instrument(skip_all, fields(rows = readings.len()))]
    pub fn build(&self, readings: &ReadingTable) -> Result<ReadingTable> {
        let features = self.config.features;

        // Everything that can fail on input shape is checked up front.
        let species = self.species_metadata()?;
        let capacity = match readings.capacity_liters() {
            Some(values) if features.temperature_deviation => Some(
                self.config
                    .capacity_policy
                    .screen(values, "temperature scaling")?,
            ),
            _ => None,
        };

        let (counts, (avg_ph, deviation)) = rayon::join(
            || features.tank_counts.then(|| self.count_per_tank(readings)),
            || {
                rayon::join(
                    || features.avg_ph.then(|| self.mean_ph_per_tank(readings)),
                    || {
                        features
                            .temperature_deviation
                            .then(|| self.temperature_deviation(readings, capacity.as_deref()))
                    },
                )
            },
        );

        let merged =
            merge_positional(readings, [counts, avg_ph, deviation].into_iter().flatten())?;
        debug!("Merged {} derived columns", merged.columns().len());

        match species {
            Some(by_tank) => self.species_readings(merged, &by_tank),
            None => Ok(merged),
        }
    }

    fn species_metadata(&self) -> Result<Option<HashMap<TankId, Vec<String>>>> {
        if !self.config.features.species_counts {
            return Ok(None);
        }
        let info = self.tank_info.as_ref().ok_or_else(|| {
            PipelineError::Configuration(
                "species readings count requested but no tank info was supplied".to_string(),
            )
        })?;
        let species = info.fish_species().ok_or_else(|| {
            PipelineError::Validation(format!(
                "tank info has no '{}' attribute",
                columns::FISH_SPECIES
            ))
        })?;
        Ok(Some(species_by_tank(info, species)))
    }

    /// Step 1: number of readings sharing each row's tank.
    pub fn count_per_tank(&self, readings: &ReadingTable) -> ColumnBatch {
        let counts = tank_counts(readings.tank_ids());
        let values = readings
            .tank_ids()
            .iter()
            .map(|tank| counts.get(tank.as_str()).copied())
            .collect();

        ColumnBatch::new(
            "count_per_tank",
            readings,
            vec![Column::count(columns::TANK_NUM_READINGS, values)],
        )
    }

    /// Step 2: mean pH of each row's tank, ignoring missing pH.
    ///
    /// Unknown when every reading in the tank lacks pH.
    pub fn mean_ph_per_tank(&self, readings: &ReadingTable) -> ColumnBatch {
        let mut sums: HashMap<&str, (f64, u64)> = HashMap::new();
        for (tank, ph) in readings.tank_ids().iter().zip(readings.ph()) {
            let entry = sums.entry(tank.as_str()).or_insert((0.0, 0));
            if let Some(ph) = ph {
                entry.0 += ph;
                entry.1 += 1;
            }
        }

        let means: HashMap<&str, Option<f64>> = sums
            .into_iter()
            .map(|(tank, (sum, n))| (tank, (n > 0).then(|| sum / n as f64)))
            .collect();
        let values = readings
            .tank_ids()
            .iter()
            .map(|tank| means.get(tank.as_str()).copied().flatten())
            .collect();

        ColumnBatch::new(
            "mean_ph_per_tank",
            readings,
            vec![Column::float(columns::AVG_PH_PER_TANK, values)],
        )
    }

    /// Step 3: `|temp - standard|`, scaled by `capacity_scale / capacity`
    /// when `capacity` is given.
    ///
    /// The branch is decided for the whole table: `capacity` is `Some`
    /// exactly when the schema has a capacity column. Pass capacities
    /// already screened by the capacity policy.
    pub fn temperature_deviation(
        &self,
        readings: &ReadingTable,
        capacity: Option<&[Option<f64>]>,
    ) -> ColumnBatch {
        let standard = self.config.standard_temperature;
        let deviation = |temp: &Option<f64>| temp.map(|t| (t - standard).abs());

        let column = match capacity {
            Some(capacity) => {
                let scale = self.config.capacity_scale;
                let values = readings
                    .temp()
                    .iter()
                    .zip(capacity)
                    .map(|(temp, cap)| match (deviation(temp), cap) {
                        (Some(dev), Some(cap)) => Some(dev * scale / cap),
                        _ => None,
                    })
                    .collect();
                Column::float(columns::TEMPERATURE_DEVIATION_SCALED, values)
            }
            None => Column::float(
                columns::TEMPERATURE_DEVIATION,
                readings.temp().iter().map(deviation).collect(),
            ),
        };

        ColumnBatch::new("temperature_deviation", readings, vec![column])
    }

    /// Step 4: expand readings to one row per species of their tank and
    /// attach the species' total reading count.
    fn species_readings(
        &self,
        table: ReadingTable,
        by_tank: &HashMap<TankId, Vec<String>>,
    ) -> Result<ReadingTable> {
        // Deduplicated (tank_id, tank_num_readings), from the merged column
        // when it exists.
        let per_tank: HashMap<&str, u64> = match table.count_column(columns::TANK_NUM_READINGS) {
            Some(counts) => table
                .tank_ids()
                .iter()
                .zip(counts)
                .filter_map(|(tank, count)| count.map(|c| (tank.as_str(), c)))
                .collect(),
            None => tank_counts(table.tank_ids()),
        };

        let mut tanks_by_species: HashMap<&str, Vec<&str>> = HashMap::new();
        for (tank, species) in by_tank {
            for name in species {
                tanks_by_species
                    .entry(name.as_str())
                    .or_default()
                    .push(tank.as_str());
            }
        }

        // Each species sums over the distinct tanks housing it.
        let species_totals: HashMap<&str, u64> = tanks_by_species
            .par_iter()
            .map(|(species, tanks)| {
                let total: u64 = tanks
                    .iter()
                    .map(|tank| per_tank.get(tank).copied().unwrap_or(0))
                    .sum();
                (*species, total)
            })
            .collect();

        let mut indices = Vec::with_capacity(table.len());
        let mut species_col = Vec::with_capacity(table.len());
        let mut totals_col = Vec::with_capacity(table.len());
        let mut unmatched = 0usize;

        for (row, tank) in table.tank_ids().iter().enumerate() {
            match by_tank.get(tank).filter(|species| !species.is_empty()) {
                Some(species) => {
                    for name in species {
                        indices.push(row);
                        species_col.push(Some(name.clone()));
                        totals_col.push(species_totals.get(name.as_str()).copied());
                    }
                }
                None => {
                    unmatched += 1;
                    if self.config.unmatched_tanks == UnmatchedTankPolicy::Keep {
                        indices.push(row);
                        species_col.push(None);
                        totals_col.push(None);
                    }
                }
            }
        }

        if unmatched > 0 {
            match self.config.unmatched_tanks {
                UnmatchedTankPolicy::Keep => warn!(
                    "{} readings belong to tanks without species; kept with unknown species",
                    unmatched
                ),
                UnmatchedTankPolicy::Drop => warn!(
                    "{} readings belong to tanks without species; dropped from species output",
                    unmatched
                ),
            }
        }
        debug!(
            "Species expansion: {} readings -> {} rows across {} species",
            table.len(),
            indices.len(),
            species_totals.len()
        );

        Ok(table
            .take_rows(&indices)
            .with_column(Column::text(columns::FISH_SPECIES, species_col))?
            .with_column(Column::count(columns::FISH_SPECIES_NUM_READINGS, totals_col))?)
    }
}

impl Analyzer for FeatureBuilder {
    fn name(&self) -> &str {
        "FeatureBuilder"
    }

    fn apply(&self, table: &ReadingTable) -> Result<ReadingTable> {
        self.build(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CapacityPolicy, FeatureSet};
    use approx::assert_relative_eq;
    use data_loader::{Reading, TankInfo};

    fn reading(tank: &str, ph: Option<f64>, temp: Option<f64>, capacity: Option<f64>) -> Reading {
        Reading {
            tank_id: tank.to_string(),
            ph,
            temp,
            capacity_liters: capacity,
        }
    }

    fn create_test_readings() -> ReadingTable {
        ReadingTable::from_readings(&[
            reading("T1", Some(7.0), Some(25.0), Some(100.0)),
            reading("T2", Some(6.0), Some(28.0), Some(200.0)),
            reading("T1", Some(8.0), Some(27.0), Some(100.0)),
            reading("T1", None, Some(26.0), Some(100.0)),
            reading("T3", None, None, None),
        ])
    }

    fn builder() -> FeatureBuilder {
        FeatureBuilder::new(FeatureConfig::default())
    }

    #[test]
    fn test_count_per_tank() {
        let readings = create_test_readings();
        let out = builder().build(&readings).unwrap();

        assert_eq!(out.len(), readings.len());
        assert_eq!(
            out.count_column(columns::TANK_NUM_READINGS).unwrap(),
            &[Some(3), Some(1), Some(3), Some(3), Some(1)]
        );
    }

    #[test]
    fn test_mean_ph_ignores_missing() {
        let out = builder().build(&create_test_readings()).unwrap();
        let avg = out.float_column(columns::AVG_PH_PER_TANK).unwrap();

        assert_relative_eq!(avg[0].unwrap(), 7.5);
        assert_relative_eq!(avg[1].unwrap(), 6.0);
        assert_eq!(avg[0], avg[3]);
        // Every pH in T3 is missing
        assert_eq!(avg[4], None);
    }

    #[test]
    fn test_scaled_temperature_deviation() {
        let out = builder().build(&create_test_readings()).unwrap();
        assert!(out.float_column(columns::TEMPERATURE_DEVIATION).is_none());

        let dev = out.float_column(columns::TEMPERATURE_DEVIATION_SCALED).unwrap();
        assert_relative_eq!(dev[0].unwrap(), 1.0 * 1000.0 / 100.0);
        assert_relative_eq!(dev[1].unwrap(), 2.0 * 1000.0 / 200.0);
        assert_relative_eq!(dev[3].unwrap(), 0.0);
        assert_eq!(dev[4], None);
    }

    #[test]
    fn test_unscaled_temperature_deviation_without_capacity_column() {
        let readings = create_test_readings().without_capacity();
        let out = builder().build(&readings).unwrap();

        assert!(out.float_column(columns::TEMPERATURE_DEVIATION_SCALED).is_none());
        let dev = out.float_column(columns::TEMPERATURE_DEVIATION).unwrap();
        assert_eq!(dev, &[Some(1.0), Some(2.0), Some(1.0), Some(0.0), None]);
    }

    #[test]
    fn test_standard_temperature_is_configurable() {
        let readings = create_test_readings().without_capacity();
        let out = FeatureBuilder::new(FeatureConfig::default().with_standard_temperature(25.0))
            .build(&readings)
            .unwrap();

        let dev = out.float_column(columns::TEMPERATURE_DEVIATION).unwrap();
        assert_eq!(dev[0], Some(0.0));
        assert_eq!(dev[1], Some(3.0));
    }

    #[test]
    fn test_non_positive_capacity_policy() {
        let readings = ReadingTable::from_readings(&[
            Reading::new("T1", 7.0, 24.0, 0.0),
            Reading::new("T1", 7.0, 24.0, 50.0),
        ]);

        let out = builder().build(&readings).unwrap();
        let dev = out.float_column(columns::TEMPERATURE_DEVIATION_SCALED).unwrap();
        assert_eq!(dev[0], None);
        assert_relative_eq!(dev[1].unwrap(), 40.0);

        let strict = FeatureBuilder::new(
            FeatureConfig::default().with_capacity_policy(CapacityPolicy::Reject),
        );
        assert!(matches!(strict.build(&readings), Err(PipelineError::Validation(_))));
    }

    #[test]
    fn test_feature_toggles() {
        let features = FeatureSet {
            tank_counts: false,
            avg_ph: true,
            temperature_deviation: false,
            species_counts: false,
        };
        let out = FeatureBuilder::new(FeatureConfig::default().with_features(features))
            .build(&create_test_readings())
            .unwrap();

        let names: Vec<&str> = out.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec![columns::AVG_PH_PER_TANK]);
    }

    #[test]
    fn test_input_is_not_modified() {
        let readings = create_test_readings();
        let before = readings.clone();
        let _ = builder().build(&readings).unwrap();
        assert_eq!(readings, before);
    }

    #[test]
    fn test_merge_rejects_misaligned_batch() {
        let readings = create_test_readings();
        let reordered = readings.take_rows(&[1, 0, 2, 3, 4]);
        let batch = builder().count_per_tank(&reordered);

        let err = merge_positional(&readings, [batch]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Validation(ref msg) if msg.contains("count_per_tank")
        ));
    }

    #[test]
    fn test_merge_rejects_swap_within_a_tank() {
        let readings = ReadingTable::from_readings(&[
            reading("T1", Some(7.0), Some(20.0), Some(100.0)),
            reading("T1", Some(7.0), Some(30.0), Some(100.0)),
        ]);
        let swapped = readings.take_rows(&[1, 0]);
        let batch = builder().temperature_deviation(&swapped, swapped.capacity_liters());

        let err = merge_positional(&readings, [batch]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Validation(ref msg) if msg.contains("temperature_deviation")
        ));
    }

    #[test]
    fn test_merge_rejects_short_column() {
        let readings = create_test_readings();
        let batch = ColumnBatch::new(
            "short",
            &readings,
            vec![Column::count("short", vec![Some(1); 2])],
        );

        assert!(matches!(
            merge_positional(&readings, [batch]),
            Err(PipelineError::Validation(_))
        ));
    }

    #[test]
    fn test_species_without_tank_info_is_configuration_error() {
        let features = FeatureSet {
            species_counts: true,
            ..FeatureSet::default()
        };
        let builder = FeatureBuilder::new(FeatureConfig::default().with_features(features));

        assert!(matches!(
            builder.build(&create_test_readings()),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn test_tank_info_without_species_is_validation_error() {
        let info = TankInfoTable::without_species(vec!["T1".to_string()]);
        let builder = builder().with_tank_info(Arc::new(info));

        assert!(matches!(
            builder.build(&create_test_readings()),
            Err(PipelineError::Validation(_))
        ));
    }

    #[test]
    fn test_species_expansion() {
        let info = TankInfoTable::from_entries(vec![
            TankInfo::new("T1", ["Guppy", "Tetra"]),
            TankInfo::new("T2", ["Guppy"]),
            TankInfo::new("T3", Vec::<String>::new()),
        ]);
        let out = builder()
            .with_tank_info(Arc::new(info))
            .build(&create_test_readings())
            .unwrap();

        // T1: 3 readings x 2 species, T2: 1 x 1, T3 kept once without species
        assert_eq!(out.len(), 8);

        let species = out.text_column(columns::FISH_SPECIES).unwrap();
        let totals = out.count_column(columns::FISH_SPECIES_NUM_READINGS).unwrap();
        for (name, total) in species.iter().zip(totals) {
            match name.as_deref() {
                Some("Guppy") => assert_eq!(*total, Some(4)),
                Some("Tetra") => assert_eq!(*total, Some(3)),
                None => assert_eq!(*total, None),
                other => panic!("unexpected species {:?}", other),
            }
        }

        // The first reading (T1) expands in the tank's species order
        assert_eq!(&out.tank_ids()[..2], &["T1", "T1"]);
        assert_eq!(species[0].as_deref(), Some("Guppy"));
        assert_eq!(species[1].as_deref(), Some("Tetra"));
    }

    #[test]
    fn test_species_counts_compute_tank_counts_internally() {
        let features = FeatureSet {
            tank_counts: false,
            avg_ph: false,
            temperature_deviation: false,
            species_counts: true,
        };
        let info = TankInfoTable::from_entries(vec![TankInfo::new("T1", ["Guppy"])]);
        let out = FeatureBuilder::new(
            FeatureConfig::default()
                .with_features(features)
                .with_unmatched_tanks(UnmatchedTankPolicy::Drop),
        )
        .with_tank_info(Arc::new(info))
        .build(&create_test_readings())
        .unwrap();

        assert_eq!(out.len(), 3);
        assert!(out.count_column(columns::TANK_NUM_READINGS).is_none());
        assert_eq!(
            out.count_column(columns::FISH_SPECIES_NUM_READINGS).unwrap(),
            &[Some(3), Some(3), Some(3)]
        );
    }

    #[test]
    fn test_exploded_tank_info_is_deduplicated() {
        // One species per row, with a repeated pair
        let info = TankInfoTable::from_entries(vec![
            TankInfo::new("T1", ["Guppy"]),
            TankInfo::new("T1", ["Tetra"]),
            TankInfo::new("T1", ["Guppy"]),
            TankInfo::new("T2", ["Guppy"]),
        ]);
        let out = FeatureBuilder::new(
            FeatureConfig::default().with_unmatched_tanks(UnmatchedTankPolicy::Drop),
        )
        .with_tank_info(Arc::new(info))
        .build(&create_test_readings())
        .unwrap();

        assert_eq!(out.len(), 3 * 2 + 1);
        let totals = out.count_column(columns::FISH_SPECIES_NUM_READINGS).unwrap();
        let species = out.text_column(columns::FISH_SPECIES).unwrap();
        let guppy: Vec<_> = species
            .iter()
            .zip(totals)
            .filter(|(s, _)| s.as_deref() == Some("Guppy"))
            .map(|(_, t)| *t)
            .collect();
        assert_eq!(guppy.len(), 4);
        assert!(guppy.iter().all(|t| *t == Some(4)));
    }
}
