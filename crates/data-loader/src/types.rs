//! Core data contracts for aquarium telemetry.
//!
//! Readings are stored column-wise: three required base columns, an
//! optional capacity column (its presence is a property of the schema, not
//! of individual rows), and an ordered list of derived columns that the
//! pipeline attaches. Tables are never mutated in place by the pipeline;
//! every stage builds a new table.

use crate::error::{DataLoadError, Result};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

// =============================================================================
// Identifiers and column names
// =============================================================================

/// Identifier of a physical tank
pub type TankId = String;

/// Canonical column names.
///
/// The loader accepts exactly these names; aliases such as `ph` or
/// `quantity_liters` are not recognized.
pub mod columns {
    pub const TANK_ID: &str = "tank_id";
    pub const PH: &str = "pH";
    pub const TEMP: &str = "temp";
    pub const CAPACITY_LITERS: &str = "capacity_liters";
    pub const FISH_SPECIES: &str = "fish_species";

    pub const TANK_NUM_READINGS: &str = "tank_num_readings";
    pub const AVG_PH_PER_TANK: &str = "avg_pH_per_tank";
    pub const TEMPERATURE_DEVIATION: &str = "temperature_deviation";
    pub const TEMPERATURE_DEVIATION_SCALED: &str = "temperature_deviation_scaled";
    pub const FISH_SPECIES_NUM_READINGS: &str = "fish_species_num_readings";
    pub const STRESS_SCORE: &str = "stress_score";

    /// Base columns that derived columns may never shadow
    pub const BASE: [&str; 4] = [TANK_ID, PH, TEMP, CAPACITY_LITERS];
}

/// Non-finite floats carry no information; they are stored as missing.
fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

// =============================================================================
// Row views
// =============================================================================

/// A single sensor observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub tank_id: TankId,
    pub ph: Option<f64>,
    pub temp: Option<f64>,
    pub capacity_liters: Option<f64>,
}

impl Reading {
    /// Reading with every numeric field present
    pub fn new(tank_id: impl Into<TankId>, ph: f64, temp: f64, capacity_liters: f64) -> Self {
        Self {
            tank_id: tank_id.into(),
            ph: Some(ph),
            temp: Some(temp),
            capacity_liters: Some(capacity_liters),
        }
    }
}

/// Metadata for one tank: the species it houses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TankInfo {
    pub tank_id: TankId,
    pub fish_species: Vec<String>,
}

impl TankInfo {
    pub fn new<S: Into<String>>(
        tank_id: impl Into<TankId>,
        species: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            tank_id: tank_id.into(),
            fish_species: species.into_iter().map(Into::into).collect(),
        }
    }
}

// =============================================================================
// Columns
// =============================================================================

/// Values of one derived column. `None` marks an unknown cell.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    Count(Vec<Option<u64>>),
    Float(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Count(v) => v.len(),
            ColumnValues::Float(v) => v.len(),
            ColumnValues::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Gather the given rows, in the given order (indices may repeat)
    fn take(&self, indices: &[usize]) -> Self {
        match self {
            ColumnValues::Count(v) => ColumnValues::Count(indices.iter().map(|&i| v[i]).collect()),
            ColumnValues::Float(v) => ColumnValues::Float(indices.iter().map(|&i| v[i]).collect()),
            ColumnValues::Text(v) => {
                ColumnValues::Text(indices.iter().map(|&i| v[i].clone()).collect())
            }
        }
    }

    /// Render one cell for delimited output; unknown cells are empty
    pub fn render(&self, row: usize) -> String {
        match self {
            ColumnValues::Count(v) => v[row].map(|c| c.to_string()).unwrap_or_default(),
            ColumnValues::Float(v) => v[row].map(|f| f.to_string()).unwrap_or_default(),
            ColumnValues::Text(v) => v[row].clone().unwrap_or_default(),
        }
    }
}

/// A named derived column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: ColumnValues,
}

impl Column {
    pub fn count(name: impl Into<String>, values: Vec<Option<u64>>) -> Self {
        Self {
            name: name.into(),
            values: ColumnValues::Count(values),
        }
    }

    /// Float column; non-finite values become unknown
    pub fn float(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            values: ColumnValues::Float(values.into_iter().map(finite).collect()),
        }
    }

    pub fn text(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self {
            name: name.into(),
            values: ColumnValues::Text(values),
        }
    }

    /// The same value repeated on `len` rows
    pub fn constant_float(name: impl Into<String>, value: f64, len: usize) -> Self {
        Self::float(name, vec![Some(value); len])
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Row count plus a digest of every base cell, row by row.
///
/// Two tables with equal fingerprints hold the same readings in the same
/// order. Swapping two readings of one tank changes the digest unless the
/// readings are identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowFingerprint {
    pub rows: usize,
    pub digest: u64,
}

// =============================================================================
// ReadingTable
// =============================================================================

/// Columnar table of readings
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingTable {
    tank_ids: Vec<TankId>,
    ph: Vec<Option<f64>>,
    temp: Vec<Option<f64>>,
    /// `None` when the schema has no capacity column at all
    capacity_liters: Option<Vec<Option<f64>>>,
    derived: Vec<Column>,
}

impl ReadingTable {
    /// Assemble a table from base columns.
    ///
    /// Fails with `ValidationError` if the columns disagree in length.
    pub fn new(
        tank_ids: Vec<TankId>,
        ph: Vec<Option<f64>>,
        temp: Vec<Option<f64>>,
        capacity_liters: Option<Vec<Option<f64>>>,
    ) -> Result<Self> {
        let rows = tank_ids.len();
        let mut lengths = vec![(columns::PH, ph.len()), (columns::TEMP, temp.len())];
        if let Some(capacity) = &capacity_liters {
            lengths.push((columns::CAPACITY_LITERS, capacity.len()));
        }
        if let Some((name, len)) = lengths.into_iter().find(|(_, len)| *len != rows) {
            return Err(DataLoadError::ValidationError(format!(
                "column '{}' has {} values but '{}' has {}",
                name,
                len,
                columns::TANK_ID,
                rows
            )));
        }

        Ok(Self {
            tank_ids,
            ph: ph.into_iter().map(finite).collect(),
            temp: temp.into_iter().map(finite).collect(),
            capacity_liters: capacity_liters.map(|c| c.into_iter().map(finite).collect()),
            derived: Vec::new(),
        })
    }

    /// Build a table with a capacity column from row views
    pub fn from_readings(readings: &[Reading]) -> Self {
        Self {
            tank_ids: readings.iter().map(|r| r.tank_id.clone()).collect(),
            ph: readings.iter().map(|r| finite(r.ph)).collect(),
            temp: readings.iter().map(|r| finite(r.temp)).collect(),
            capacity_liters: Some(readings.iter().map(|r| finite(r.capacity_liters)).collect()),
            derived: Vec::new(),
        }
    }

    /// Drop the capacity column from the schema
    pub fn without_capacity(mut self) -> Self {
        self.capacity_liters = None;
        self
    }

    pub fn len(&self) -> usize {
        self.tank_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tank_ids.is_empty()
    }

    pub fn tank_ids(&self) -> &[TankId] {
        &self.tank_ids
    }

    pub fn ph(&self) -> &[Option<f64>] {
        &self.ph
    }

    pub fn temp(&self) -> &[Option<f64>] {
        &self.temp
    }

    /// Capacity values, or `None` when the schema has no capacity column
    pub fn capacity_liters(&self) -> Option<&[Option<f64>]> {
        self.capacity_liters.as_deref()
    }

    pub fn has_capacity(&self) -> bool {
        self.capacity_liters.is_some()
    }

    /// Derived columns in attachment order
    pub fn columns(&self) -> &[Column] {
        &self.derived
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.derived.iter().find(|c| c.name == name)
    }

    pub fn count_column(&self, name: &str) -> Option<&[Option<u64>]> {
        match self.column(name).map(|c| &c.values) {
            Some(ColumnValues::Count(v)) => Some(v),
            _ => None,
        }
    }

    pub fn float_column(&self, name: &str) -> Option<&[Option<f64>]> {
        match self.column(name).map(|c| &c.values) {
            Some(ColumnValues::Float(v)) => Some(v),
            _ => None,
        }
    }

    pub fn text_column(&self, name: &str) -> Option<&[Option<String>]> {
        match self.column(name).map(|c| &c.values) {
            Some(ColumnValues::Text(v)) => Some(v),
            _ => None,
        }
    }

    /// Names of every column in output order
    pub fn column_names(&self) -> Vec<&str> {
        let mut names = vec![columns::TANK_ID, columns::PH, columns::TEMP];
        if self.has_capacity() {
            names.push(columns::CAPACITY_LITERS);
        }
        names.extend(self.derived.iter().map(|c| c.name.as_str()));
        names
    }

    /// Row view of the base columns
    pub fn row(&self, index: usize) -> Reading {
        Reading {
            tank_id: self.tank_ids[index].clone(),
            ph: self.ph[index],
            temp: self.temp[index],
            capacity_liters: self.capacity_liters.as_ref().and_then(|c| c[index]),
        }
    }

    /// Attach a derived column, replacing any existing column of that name.
    ///
    /// The column must have exactly one value per row, and it may not reuse
    /// a base column name.
    pub fn with_column(mut self, column: Column) -> Result<Self> {
        if columns::BASE.contains(&column.name.as_str()) {
            return Err(DataLoadError::ValidationError(format!(
                "derived column '{}' would shadow a base column",
                column.name
            )));
        }
        if column.len() != self.len() {
            return Err(DataLoadError::ValidationError(format!(
                "column '{}' has {} values but the table has {} rows",
                column.name,
                column.len(),
                self.len()
            )));
        }

        match self.derived.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => self.derived.push(column),
        }
        Ok(self)
    }

    /// New table made of the given rows in the given order.
    ///
    /// Indices may repeat, which is how one-to-many joins expand rows.
    /// Panics if an index is out of bounds.
    pub fn take_rows(&self, indices: &[usize]) -> Self {
        Self {
            tank_ids: indices.iter().map(|&i| self.tank_ids[i].clone()).collect(),
            ph: indices.iter().map(|&i| self.ph[i]).collect(),
            temp: indices.iter().map(|&i| self.temp[i]).collect(),
            capacity_liters: self
                .capacity_liters
                .as_ref()
                .map(|c| indices.iter().map(|&i| c[i]).collect()),
            derived: self
                .derived
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    values: c.values.take(indices),
                })
                .collect(),
        }
    }

    pub fn fingerprint(&self) -> RowFingerprint {
        let bits = |v: &Option<f64>| v.map(f64::to_bits);
        let mut hasher = DefaultHasher::new();
        self.capacity_liters.is_some().hash(&mut hasher);
        for row in 0..self.len() {
            self.tank_ids[row].hash(&mut hasher);
            bits(&self.ph[row]).hash(&mut hasher);
            bits(&self.temp[row]).hash(&mut hasher);
            if let Some(capacity) = &self.capacity_liters {
                bits(&capacity[row]).hash(&mut hasher);
            }
        }
        RowFingerprint {
            rows: self.len(),
            digest: hasher.finish(),
        }
    }

    /// Render every cell of a row in `column_names()` order
    pub fn render_row(&self, index: usize) -> Vec<String> {
        let render = |v: Option<f64>| v.map(|f| f.to_string()).unwrap_or_default();
        let mut cells = vec![
            self.tank_ids[index].clone(),
            render(self.ph[index]),
            render(self.temp[index]),
        ];
        if let Some(capacity) = &self.capacity_liters {
            cells.push(render(capacity[index]));
        }
        cells.extend(self.derived.iter().map(|c| c.values.render(index)));
        cells
    }
}

// =============================================================================
// TankInfoTable
// =============================================================================

/// Optional tank metadata.
///
/// Rows may repeat a tank (already exploded to one species per row) or list
/// several species at once; both shapes are accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct TankInfoTable {
    tank_ids: Vec<TankId>,
    /// `None` when the schema has no `fish_species` attribute
    fish_species: Option<Vec<Vec<String>>>,
}

impl TankInfoTable {
    pub fn new(tank_ids: Vec<TankId>, fish_species: Option<Vec<Vec<String>>>) -> Result<Self> {
        if let Some(species) = &fish_species {
            if species.len() != tank_ids.len() {
                return Err(DataLoadError::ValidationError(format!(
                    "column '{}' has {} values but '{}' has {}",
                    columns::FISH_SPECIES,
                    species.len(),
                    columns::TANK_ID,
                    tank_ids.len()
                )));
            }
        }
        Ok(Self {
            tank_ids,
            fish_species,
        })
    }

    pub fn from_entries(entries: Vec<TankInfo>) -> Self {
        let (tank_ids, fish_species) = entries
            .into_iter()
            .map(|e| (e.tank_id, e.fish_species))
            .unzip();
        Self {
            tank_ids,
            fish_species: Some(fish_species),
        }
    }

    /// Metadata that carries tank ids only
    pub fn without_species(tank_ids: Vec<TankId>) -> Self {
        Self {
            tank_ids,
            fish_species: None,
        }
    }

    pub fn len(&self) -> usize {
        self.tank_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tank_ids.is_empty()
    }

    pub fn tank_ids(&self) -> &[TankId] {
        &self.tank_ids
    }

    pub fn fish_species(&self) -> Option<&[Vec<String>]> {
        self.fish_species.as_deref()
    }

    pub fn has_species(&self) -> bool {
        self.fish_species.is_some()
    }
}
