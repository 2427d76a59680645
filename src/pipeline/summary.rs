//! Run summary written next to the pipeline outputs

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::dataset::UnitFailure;
use crate::error::util::ensure_parent_directory;
use crate::error::{PipelineError, Result};
use crate::filter::FilterReport;

/// Per-cohort result counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CohortSummary {
    pub name: String,
    pub records: usize,
    pub participants: usize,
    pub resamples: usize,
    pub matrices: usize,
    pub failures: usize,
}

/// Everything a finished run reports
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub experiment_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub iterations: u32,
    pub seed: Option<u64>,
    pub filter: FilterReport,
    pub cohorts: Vec<CohortSummary>,
    pub matrices: usize,
    pub failures: Vec<UnitFailure>,
}

impl RunSummary {
    /// Wall-clock duration of the run
    #[must_use]
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Write the summary as pretty-printed JSON
    pub fn write_json(&self, path: &Path) -> Result<()> {
        ensure_parent_directory(path)?;
        let file = File::create(path).map_err(|e| {
            PipelineError::io_error_with_source("Failed to create run summary", e).with_path(path)
        })?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)
            .map_err(|e| PipelineError::from(e).with_path(path))?;
        Ok(())
    }

    /// Log a short human-readable account of the run
    pub fn log(&self) {
        log::info!(
            "Experiment {} finished in {}s: {} cohort(s), {} matrices, {} failed unit(s)",
            self.experiment_name,
            self.elapsed().num_seconds(),
            self.cohorts.len(),
            self.matrices,
            self.failures.len()
        );
        for cohort in &self.cohorts {
            log::info!(
                "  {}: {} records, {} participants, {} resamples, {} matrices",
                cohort.name,
                cohort.records,
                cohort.participants,
                cohort.resamples,
                cohort.matrices
            );
        }
        for failure in &self.failures {
            log::error!("  {failure}");
        }
    }
}
