//! Error handling for the co-occurrence pipeline.

pub mod util;

use std::io;
use std::path::{Path, PathBuf};

use arrow::error::ArrowError;
use parquet::errors::ParquetError;

/// Specialized error type for pipeline operations
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Error opening, reading or writing a file
    #[error("IO error: {message}{}", fmt_path(.path.as_deref()))]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<io::Error>,
    },

    /// Error processing Arrow data
    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    /// Error processing Parquet data
    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),

    /// Error parsing or writing JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error converting between Rust records and Arrow batches
    #[error("Record conversion error: {0}")]
    SerdeArrow(#[from] serde_arrow::Error),

    /// A dataset is missing columns the operation requires
    #[error("Dataset '{dataset}' is missing required column(s): {}", .columns.join(", "))]
    MissingColumns {
        dataset: String,
        columns: Vec<String>,
    },

    /// The pipeline configuration is invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Input data has an unexpected shape or type
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// An error wrapped with additional context
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<PipelineError>,
    },
}

fn fmt_path(path: Option<&Path>) -> String {
    path.map(|p| format!(" (path: {})", p.display()))
        .unwrap_or_default()
}

impl PipelineError {
    /// Create an IO error with a message and no underlying source
    pub fn io_error(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
            path: None,
            source: None,
        }
    }

    /// Create an IO error wrapping an underlying `io::Error`
    pub fn io_error_with_source(message: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            message: message.into(),
            path: None,
            source: Some(source),
        }
    }

    /// Create a missing-columns error for a dataset
    pub fn missing_columns(dataset: impl Into<String>, columns: Vec<String>) -> Self {
        Self::MissingColumns {
            dataset: dataset.into(),
            columns,
        }
    }

    /// Create a configuration error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Create a data error
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData(message.into())
    }

    /// Attach a file path to an IO error. Other variants gain a context line.
    #[must_use]
    pub fn with_path(self, path: &Path) -> Self {
        match self {
            Self::Io {
                message, source, ..
            } => Self::Io {
                message,
                path: Some(path.to_path_buf()),
                source,
            },
            other => other.context(format!("path: {}", path.display())),
        }
    }

    /// Wrap the error with a context message
    #[must_use]
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

impl From<io::Error> for PipelineError {
    fn from(error: io::Error) -> Self {
        Self::io_error_with_source(error.to_string(), error)
    }
}

/// Extension trait adding context to results from any pipeline operation
pub trait ResultExt<T> {
    /// Add a context message, evaluated lazily
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T, E: Into<PipelineError>> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|e| e.into().context(f()))
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
