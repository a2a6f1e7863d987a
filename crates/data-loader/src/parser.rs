//! Delimited-file I/O for telemetry tables.
//!
//! - readings: `tank_id`, `pH`, `temp` required, `capacity_liters` optional
//! - tank info: `tank_id` required, `fish_species` holds comma-joined names
//!
//! Files are tab-separated by default. Headers must use the canonical
//! column names in [`crate::types::columns`].

use crate::error::{DataLoadError, Result};
use crate::types::{columns, ReadingTable, TankId, TankInfoTable};
use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};
use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

/// Tab, the delimiter used by the telemetry exports
pub const DEFAULT_DELIMITER: u8 = b'\t';

/// Cell spellings that mean "no value"
const MISSING_MARKERS: [&str; 5] = ["nan", "na", "n/a", "null", "none"];

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn open_reader(path: &Path, delimiter: u8) -> Result<csv::Reader<File>> {
    let file = File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => DataLoadError::FileNotFound {
            path: path.display().to_string(),
        },
        _ => DataLoadError::IoError(e),
    })?;

    Ok(ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(file))
}

fn find_column(headers: &StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h == name)
}

fn require_column(headers: &StringRecord, name: &str, file: &str) -> Result<usize> {
    find_column(headers, name).ok_or_else(|| DataLoadError::MissingColumn {
        file: file.to_string(),
        column: name.to_string(),
    })
}

fn is_missing(cell: &str) -> bool {
    cell.is_empty() || MISSING_MARKERS.iter().any(|m| cell.eq_ignore_ascii_case(m))
}

/// 1-based line of a record, counting the header
fn record_line(record: &StringRecord, index: usize) -> usize {
    record
        .position()
        .map(|p| p.line() as usize)
        .unwrap_or(index + 2)
}

fn parse_optional_float(cell: &str, column: &str, file: &str, line: usize) -> Result<Option<f64>> {
    if is_missing(cell) {
        return Ok(None);
    }
    cell.parse::<f64>()
        .map(Some)
        .map_err(|e| DataLoadError::ParseError {
            file: file.to_string(),
            line,
            reason: format!("Invalid {}: '{}' ({})", column, cell, e),
        })
}

fn parse_tank_id(cell: &str, file: &str, line: usize) -> Result<TankId> {
    if cell.is_empty() {
        return Err(DataLoadError::ParseError {
            file: file.to_string(),
            line,
            reason: "Missing tank_id".to_string(),
        });
    }
    Ok(cell.to_string())
}

/// Split a comma-joined species cell into trimmed, non-empty names
pub fn split_species(cell: &str) -> Vec<String> {
    cell.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Load a reading table from a delimited file
pub fn load_readings(path: &Path, delimiter: u8) -> Result<ReadingTable> {
    let file = file_label(path);
    let mut reader = open_reader(path, delimiter)?;
    let headers = reader.headers()?.clone();

    let tank_idx = require_column(&headers, columns::TANK_ID, &file)?;
    let ph_idx = require_column(&headers, columns::PH, &file)?;
    let temp_idx = require_column(&headers, columns::TEMP, &file)?;
    let capacity_idx = find_column(&headers, columns::CAPACITY_LITERS);

    let mut tank_ids = Vec::new();
    let mut ph = Vec::new();
    let mut temp = Vec::new();
    let mut capacity = capacity_idx.map(|_| Vec::new());

    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let line = record_line(&record, index);
        let cell = |i: usize| record.get(i).unwrap_or("");

        tank_ids.push(parse_tank_id(cell(tank_idx), &file, line)?);
        ph.push(parse_optional_float(cell(ph_idx), columns::PH, &file, line)?);
        temp.push(parse_optional_float(cell(temp_idx), columns::TEMP, &file, line)?);
        if let (Some(idx), Some(values)) = (capacity_idx, capacity.as_mut()) {
            values.push(parse_optional_float(
                cell(idx),
                columns::CAPACITY_LITERS,
                &file,
                line,
            )?);
        }
    }

    debug!(
        "Loaded {} readings from {} (capacity column: {})",
        tank_ids.len(),
        file,
        capacity.is_some()
    );
    ReadingTable::new(tank_ids, ph, temp, capacity)
}

/// Load tank metadata from a delimited file.
///
/// A missing `fish_species` header is not an error here; the table simply
/// carries no species and the feature stage decides whether it needs them.
pub fn load_tank_info(path: &Path, delimiter: u8) -> Result<TankInfoTable> {
    let file = file_label(path);
    let mut reader = open_reader(path, delimiter)?;
    let headers = reader.headers()?.clone();

    let tank_idx = require_column(&headers, columns::TANK_ID, &file)?;
    let species_idx = find_column(&headers, columns::FISH_SPECIES);

    let mut tank_ids = Vec::new();
    let mut species = species_idx.map(|_| Vec::new());

    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let line = record_line(&record, index);

        tank_ids.push(parse_tank_id(record.get(tank_idx).unwrap_or(""), &file, line)?);
        if let (Some(idx), Some(values)) = (species_idx, species.as_mut()) {
            values.push(split_species(record.get(idx).unwrap_or("")));
        }
    }

    debug!(
        "Loaded {} tank info rows from {} (species column: {})",
        tank_ids.len(),
        file,
        species.is_some()
    );
    TankInfoTable::new(tank_ids, species)
}

/// Write a reading table, base columns first, derived columns in order.
///
/// Unknown cells are written empty.
pub fn write_readings(table: &ReadingTable, path: &Path, delimiter: u8) -> Result<()> {
    let mut writer = WriterBuilder::new().delimiter(delimiter).from_path(path)?;
    writer.write_record(table.column_names())?;
    for row in 0..table.len() {
        writer.write_record(table.render_row(row))?;
    }
    writer.flush()?;

    debug!("Wrote {} rows to {}", table.len(), path.display());
    Ok(())
}
