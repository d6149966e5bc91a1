//! Error types for sample loading and picking.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading a sample.
#[derive(Error, Debug)]
pub enum SampleLoadError {
    #[error("Failed to read sample file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse CSV sample {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error(
        "CSV rows have inconsistent column counts in {path}: row {row} has {found} columns, expected {expected}. \
         Fields containing the delimiter must be enclosed in quote characters (RFC 4180)"
    )]
    CsvInconsistentColumns {
        path: PathBuf,
        row: u64,
        expected: u64,
        found: u64,
    },

    #[error("Failed to parse JSON sample {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("JSON sample objects have inconsistent keys: object {index} differs from the first object")]
    JsonInconsistentKeys { index: usize },

    #[error("Sample rows have inconsistent column counts: row {row} has {found} columns, expected {expected}")]
    InconsistentColumns {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Unsupported sample layout: {0}")]
    Layout(String),

    #[error("Invalid sample option `{option}`: {reason}")]
    InvalidOption {
        option: &'static str,
        reason: String,
    },

    #[error("Failed to load sample `{name}`: {source}")]
    Named {
        name: String,
        #[source]
        source: Box<SampleLoadError>,
    },
}

/// Errors that can occur while picking from a sample.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SamplePickError {
    #[error("No such sample `{0}`")]
    NoSuchSample(String),

    #[error("Cannot pick from an empty sample")]
    Empty,

    #[error("Weight column `{0}` not found in sample")]
    ColumnNotFound(String),

    #[error("Weight column `{column}` contains non-numeric value `{value}` in row {row}")]
    NonNumeric {
        column: String,
        row: usize,
        value: String,
    },

    #[error("Weight column `{column}` contains negative value {value} in row {row}")]
    Negative {
        column: String,
        row: usize,
        value: f64,
    },

    #[error("All weights are zero in column `{0}`")]
    ZeroWeights(String),
}
