//! Datasets flowing between pipeline stages
//!
//! Every stage output is a complete, immutable table identified by the cohort
//! it belongs to and, for resamples, the iteration index.

use std::fmt;

use arrow::array::Array;
use arrow::record_batch::RecordBatch;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::config::ColumnNames;
use crate::error::{PipelineError, Result};
use crate::utils::arrow::string_column;

/// Identity of a cohort or one of its resamples
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatasetId {
    /// Composite cohort name from the filter combination
    pub cohort: String,
    /// Resample iteration (1-based); `None` for the original cohort
    pub iteration: Option<u32>,
}

impl DatasetId {
    #[must_use]
    pub fn original(cohort: impl Into<String>) -> Self {
        Self {
            cohort: cohort.into(),
            iteration: None,
        }
    }

    #[must_use]
    pub fn resample(cohort: impl Into<String>, iteration: u32) -> Self {
        Self {
            cohort: cohort.into(),
            iteration: Some(iteration),
        }
    }

    #[must_use]
    pub const fn is_resample(&self) -> bool {
        self.iteration.is_some()
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.iteration {
            Some(i) => write!(f, "{} (iteration {i})", self.cohort),
            None => write!(f, "{}", self.cohort),
        }
    }
}

/// A cohort or resample together with its records
#[derive(Debug, Clone)]
pub struct Dataset {
    pub id: DatasetId,
    pub batch: RecordBatch,
}

impl Dataset {
    #[must_use]
    pub fn new(id: DatasetId, batch: RecordBatch) -> Self {
        Self { id, batch }
    }

    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batch.num_rows() == 0
    }

    /// Number of distinct non-null participant ids
    pub fn participant_count(&self, columns: &ColumnNames) -> Result<usize> {
        if self.is_empty() {
            return Ok(0);
        }
        let ids = string_column(&self.batch, &columns.participant_id)?;
        let distinct: FxHashSet<&str> = (0..ids.len())
            .filter(|&i| ids.is_valid(i))
            .map(|i| ids.value(i))
            .collect();
        Ok(distinct.len())
    }
}

/// Pipeline stage a unit of work belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Filter,
    Resample,
    Aggregate,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filter => write!(f, "filter"),
            Self::Resample => write!(f, "resample"),
            Self::Aggregate => write!(f, "aggregate"),
            Self::Persist => write!(f, "persist"),
        }
    }
}

/// A unit of work that failed without stopping its siblings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitFailure {
    pub unit: DatasetId,
    pub stage: Stage,
    pub error: String,
}

impl UnitFailure {
    #[must_use]
    pub fn new(unit: DatasetId, stage: Stage, error: &PipelineError) -> Self {
        Self {
            unit,
            stage,
            error: error.to_string(),
        }
    }
}

impl fmt::Display for UnitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed for {}: {}", self.stage, self.unit, self.error)
    }
}

/// Outcome of one independent unit of work
pub type UnitOutcome<T> = std::result::Result<T, UnitFailure>;
