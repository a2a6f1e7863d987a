//! # Data Loader Crate
//!
//! Shared data contracts and delimited-file I/O for aquarium telemetry.
//!
//! ## Main Components
//!
//! - **types**: `ReadingTable`, `TankInfoTable`, derived `Column`s and row fingerprints
//! - **parser**: load readings / tank info from TSV, write enriched tables back
//! - **error**: Error types for loading and table validation
//!
//! ## Example Usage
//!
//! ```ignore
//! use data_loader::{load_readings, load_tank_info, DEFAULT_DELIMITER};
//! use std::path::Path;
//!
//! let readings = load_readings(Path::new("data/sensors.tsv"), DEFAULT_DELIMITER)?;
//! let tank_info = load_tank_info(Path::new("data/tank_info.tsv"), DEFAULT_DELIMITER)?;
//!
//! println!("{} readings across {} tank info rows", readings.len(), tank_info.len());
//! ```

// Public modules
pub mod error;
pub mod types;
pub mod parser;

// Re-export commonly used types for convenience
pub use error::{DataLoadError, Result};
pub use parser::{load_readings, load_tank_info, split_species, write_readings, DEFAULT_DELIMITER};
pub use types::{
    columns,
    Column,
    ColumnValues,
    Reading,
    ReadingTable,
    RowFingerprint,
    TankId,
    TankInfo,
    TankInfoTable,
};
