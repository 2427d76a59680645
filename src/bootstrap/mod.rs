//! Bootstrap resampler
//!
//! Produces independent resamples of a cohort in which each participant's
//! diagnosis codes are permuted across that participant's own records. The
//! resamples form the null distribution for the co-occurrence matrices.

pub mod seed;
pub mod shuffle;

use std::fmt;
use std::time::Instant;

use arrow::record_batch::RecordBatch;
use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::ColumnNames;
use crate::dataset::{Dataset, DatasetId, Stage, UnitFailure, UnitOutcome};
use crate::error::{PipelineError, Result};
use crate::utils::arrow::{project_columns, require_columns};
use crate::utils::logging::log_warning;

pub use seed::SeedSequence;
pub use shuffle::{participant_groups, shuffle_within_participants};

/// Default number of resamples per cohort
pub const DEFAULT_ITERATIONS: u32 = 100;

/// Resampling settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Resamples per cohort
    pub iterations: u32,
    /// Columns carried into each resample
    pub fields_to_keep: Vec<String>,
    /// Base seed; `None` draws from OS entropy
    pub seed: Option<u64>,
    /// Whether resamples are written to disk
    pub persist: bool,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        let columns = ColumnNames::default();
        Self {
            iterations: DEFAULT_ITERATIONS,
            fields_to_keep: vec![columns.participant_id, columns.diagnosis_code],
            seed: None,
            persist: true,
        }
    }
}

impl BootstrapConfig {
    #[must_use]
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    #[must_use]
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields_to_keep = fields.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    /// Generator source for this configuration
    #[must_use]
    pub fn seeds(&self) -> SeedSequence {
        SeedSequence::new(self.seed)
    }
}

impl fmt::Display for BootstrapConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} iterations, fields [{}]",
            self.iterations,
            self.fields_to_keep.join(", ")
        )?;
        match self.seed {
            Some(seed) => write!(f, ", seed {seed}"),
            None => write!(f, ", unseeded"),
        }
    }
}

/// Keep the configured fields of a cohort
///
/// The participant id and diagnosis code columns are always kept. Configured
/// fields the cohort does not have are skipped with a warning.
pub fn project_fields(
    batch: &RecordBatch,
    fields: &[String],
    columns: &ColumnNames,
    dataset: &str,
) -> Result<RecordBatch> {
    require_columns(batch, dataset, &columns.core())?;

    let schema = batch.schema();
    let mut keep: Vec<&str> = Vec::with_capacity(fields.len() + 2);
    for field in fields {
        if schema.index_of(field).is_err() {
            log_warning(
                &format!("Cohort {dataset} has no field '{field}'; skipping it"),
                None,
            );
        } else if !keep.contains(&field.as_str()) {
            keep.push(field);
        }
    }
    for core in columns.core() {
        if !keep.contains(&core) {
            log_warning(
                &format!("fields_to_keep omits '{core}'; keeping it for resampling"),
                None,
            );
            keep.push(core);
        }
    }

    project_columns(batch, &keep)
}

/// Produce one resample of an already projected cohort
pub fn resample_once(
    projected: &RecordBatch,
    cohort: &str,
    iteration: u32,
    columns: &ColumnNames,
    seeds: &SeedSequence,
) -> Result<Dataset> {
    let mut rng = seeds.rng_for(cohort, iteration);
    let batch = shuffle_within_participants(projected, columns, &mut rng)?;
    Ok(Dataset::new(DatasetId::resample(cohort, iteration), batch))
}

/// Produce every resample of a cohort
///
/// Iterations are numbered from 1 and run in parallel. Each iteration is an
/// independent unit: a failure is reported for that iteration and the others
/// still complete. A cohort that cannot be projected fails every iteration.
pub fn resample_cohort(
    cohort: &Dataset,
    config: &BootstrapConfig,
    columns: &ColumnNames,
    seeds: &SeedSequence,
) -> Vec<UnitOutcome<Dataset>> {
    let name = cohort.id.cohort.as_str();
    let unit_failure = |iteration: u32, error: PipelineError| {
        let unit = DatasetId::resample(name, iteration);
        UnitFailure::new(unit.clone(), Stage::Resample, &error.context(unit.to_string()))
    };

    if config.iterations == 0 {
        debug!("No resamples requested for cohort {name}");
        return Vec::new();
    }

    let projected = match project_fields(&cohort.batch, &config.fields_to_keep, columns, name) {
        Ok(projected) => projected,
        Err(e) => {
            let message = e.to_string();
            return (1..=config.iterations)
                .map(|i| unit_failure(i, PipelineError::invalid_data(message.clone())))
                .map(Err)
                .collect();
        }
    };

    let start = Instant::now();
    info!(
        "Resampling cohort {name}: {} iterations over {} records",
        config.iterations,
        projected.num_rows()
    );

    let outcomes: Vec<UnitOutcome<Dataset>> = (1..=config.iterations)
        .into_par_iter()
        .map(|iteration| {
            resample_once(&projected, name, iteration, columns, seeds)
                .map_err(|e| unit_failure(iteration, e))
        })
        .collect();

    let failed = outcomes.iter().filter(|o| o.is_err()).count();
    info!(
        "Resampled cohort {name}: {} succeeded, {failed} failed in {:?}",
        outcomes.len() - failed,
        start.elapsed()
    );
    outcomes
}
