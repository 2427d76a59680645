//! IO utilities for dataset files
//!
//! Cohorts, resamples and matrices are read and written as CSV or Parquet,
//! chosen by file extension.

pub mod csv;
pub mod parquet;
pub mod paths;

use std::fmt;
use std::path::Path;

use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

pub use self::csv::{read_csv, write_csv};
pub use self::parquet::{read_parquet, write_parquet};
pub use paths::{OutputLayout, discover_datasets, discover_experiment};

/// On-disk format of a dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetFormat {
    #[default]
    Csv,
    Parquet,
}

impl DatasetFormat {
    /// File extension without the dot
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Parquet => "parquet",
        }
    }

    /// Format implied by a path's extension
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "csv" => Some(Self::Csv),
            "parquet" => Some(Self::Parquet),
            _ => None,
        }
    }
}

impl fmt::Display for DatasetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

fn format_of(path: &Path) -> Result<DatasetFormat> {
    DatasetFormat::from_path(path).ok_or_else(|| {
        PipelineError::io_error("Unsupported dataset file extension (expected .csv or .parquet)")
            .with_path(path)
    })
}

/// Read a dataset file into a single record batch
pub fn read_dataset(path: &Path) -> Result<RecordBatch> {
    match format_of(path)? {
        DatasetFormat::Csv => read_csv(path),
        DatasetFormat::Parquet => read_parquet(path),
    }
}

/// Write a record batch in the format implied by the path's extension
pub fn write_dataset(path: &Path, batch: &RecordBatch) -> Result<()> {
    match format_of(path)? {
        DatasetFormat::Csv => write_csv(path, batch),
        DatasetFormat::Parquet => write_parquet(path, batch),
    }
}
