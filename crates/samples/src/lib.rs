//! Samples for eventum event templates.
//!
//! A sample is an immutable table of rows loaded from an inline list, a CSV
//! file or a JSON file. Templates pick rows from samples uniformly or weighted
//! by a numeric column.

mod config;
mod error;
mod loaders;
mod reader;
mod row;
mod sample;

pub use config::SampleConfig;
pub use error::{SampleLoadError, SamplePickError};
pub use reader::SamplesReader;
pub use row::{FieldMap, Row};
pub use sample::Sample;
