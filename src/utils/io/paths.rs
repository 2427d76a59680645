//! Output directory layout and dataset discovery
//!
//! ```text
//! <output_dir>/<experiment>/
//!     filtered_data/<cohort>_filtered.<ext>
//!     bootstrapped_data/<cohort>/<cohort>_<i>.<ext>
//!     connection_matrices/original/<cohort>_disease_connection_matrix.csv
//!     connection_matrices/bootstrap/<cohort>/<cohort>_bootstrap_<i>_disease_connection_matrix.csv
//!     run_summary.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use itertools::Itertools;

use crate::dataset::DatasetId;
use crate::error::util::validate_directory;
use crate::error::{PipelineError, Result};
use crate::utils::io::DatasetFormat;
use crate::utils::logging::{log_operation_complete, log_operation_start, log_warning};

pub const FILTERED_DIR: &str = "filtered_data";
pub const BOOTSTRAP_DIR: &str = "bootstrapped_data";
pub const MATRICES_DIR: &str = "connection_matrices";
pub const SUMMARY_FILE: &str = "run_summary.json";

/// Suffix of filtered cohort file stems
pub const FILTERED_SUFFIX: &str = "_filtered";
const MATRIX_SUFFIX: &str = "_disease_connection_matrix";

/// Paths of every artifact of one experiment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
    format: DatasetFormat,
}

impl OutputLayout {
    #[must_use]
    pub fn new(output_dir: &Path, experiment: &str, format: DatasetFormat) -> Self {
        Self {
            root: output_dir.join(experiment),
            format,
        }
    }

    /// Layout rooted directly at `root`
    #[must_use]
    pub fn at(root: impl Into<PathBuf>, format: DatasetFormat) -> Self {
        Self {
            root: root.into(),
            format,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn filtered_dir(&self) -> PathBuf {
        self.root.join(FILTERED_DIR)
    }

    #[must_use]
    pub fn bootstrap_dir(&self) -> PathBuf {
        self.root.join(BOOTSTRAP_DIR)
    }

    #[must_use]
    pub fn matrices_dir(&self) -> PathBuf {
        self.root.join(MATRICES_DIR)
    }

    #[must_use]
    pub fn summary_file(&self) -> PathBuf {
        self.root.join(SUMMARY_FILE)
    }

    /// Where a cohort or resample is persisted
    #[must_use]
    pub fn dataset_file(&self, id: &DatasetId) -> PathBuf {
        let ext = self.format.extension();
        match id.iteration {
            None => self
                .filtered_dir()
                .join(format!("{}{FILTERED_SUFFIX}.{ext}", id.cohort)),
            Some(i) => self
                .bootstrap_dir()
                .join(&id.cohort)
                .join(format!("{}_{i}.{ext}", id.cohort)),
        }
    }

    /// Where the matrix of a cohort or resample is persisted
    #[must_use]
    pub fn matrix_file(&self, id: &DatasetId) -> PathBuf {
        let matrices = self.matrices_dir();
        match id.iteration {
            None => matrices
                .join("original")
                .join(format!("{}{MATRIX_SUFFIX}.csv", id.cohort)),
            Some(i) => matrices
                .join("bootstrap")
                .join(&id.cohort)
                .join(format!("{}_bootstrap_{i}{MATRIX_SUFFIX}.csv", id.cohort)),
        }
    }
}

fn dataset_stem(path: &Path) -> Option<&str> {
    DatasetFormat::from_path(path)?;
    path.file_stem()?.to_str()
}

/// Parse `<cohort>_<i>` inside a directory named `<cohort>`
fn resample_iteration(stem: &str, cohort: &str) -> Option<u32> {
    stem.strip_prefix(cohort)?
        .strip_prefix('_')?
        .parse::<u32>()
        .ok()
        .filter(|&i| i > 0)
}

fn read_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    fs::read_dir(dir)
        .map_err(|e| PipelineError::io_error_with_source("Failed to read directory", e).with_path(dir))?
        .map(|entry| {
            entry
                .map(|e| e.path())
                .map_err(|e| PipelineError::io_error_with_source("Failed to read directory entry", e).with_path(dir))
        })
        .collect()
}

/// Enumerate the dataset files of a directory
///
/// Top-level `.csv`/`.parquet` files are cohorts, named by their stem with
/// any `_filtered` suffix removed. A subdirectory `<cohort>` holding
/// `<cohort>_<i>` files contributes resample `i` of that cohort. Anything
/// else is skipped with a warning. The result is sorted by dataset id.
pub fn discover_datasets(dir: &Path) -> Result<Vec<(DatasetId, PathBuf)>> {
    log_operation_start("Discovering datasets in", dir);
    validate_directory(dir, "dataset discovery")?;

    let mut found = Vec::new();
    for path in read_entries(dir)? {
        if path.is_dir() {
            let Some(cohort) = path.file_name().and_then(|n| n.to_str()).map(str::to_owned) else {
                continue;
            };
            for file in read_entries(&path)? {
                let iteration = dataset_stem(&file).and_then(|stem| resample_iteration(stem, &cohort));
                match iteration {
                    Some(i) => found.push((DatasetId::resample(&cohort, i), file)),
                    None => log_warning("Skipping file that is not a resample of its directory", Some(&file)),
                }
            }
        } else if let Some(stem) = dataset_stem(&path) {
            let cohort = stem.strip_suffix(FILTERED_SUFFIX).unwrap_or(stem);
            found.push((DatasetId::original(cohort), path.clone()));
        } else {
            log_warning("Skipping non-dataset file", Some(&path));
        }
    }

    let duplicates: Vec<&DatasetId> = found
        .iter()
        .map(|(id, _)| id)
        .duplicates()
        .collect();
    if let Some(id) = duplicates.first() {
        return Err(PipelineError::invalid_data(format!(
            "dataset {id} is present in more than one file format"
        ))
        .with_path(dir));
    }

    found.sort();
    log_operation_complete("found", dir, found.len(), None);
    Ok(found)
}

/// Enumerate datasets of an experiment directory written by the pipeline
///
/// Reads `filtered_data` and `bootstrapped_data` when present; a directory
/// with neither is treated as a plain dataset directory.
pub fn discover_experiment(root: &Path) -> Result<Vec<(DatasetId, PathBuf)>> {
    let layout = OutputLayout::at(root, DatasetFormat::default());
    let filtered = layout.filtered_dir();
    let bootstrapped = layout.bootstrap_dir();
    if !filtered.is_dir() && !bootstrapped.is_dir() {
        return discover_datasets(root);
    }

    let mut found = Vec::new();
    if filtered.is_dir() {
        found.extend(
            discover_datasets(&filtered)?
                .into_iter()
                .filter(|(id, _)| !id.is_resample()),
        );
    }
    if bootstrapped.is_dir() {
        found.extend(
            discover_datasets(&bootstrapped)?
                .into_iter()
                .filter(|(id, _)| id.is_resample()),
        );
    }
    found.sort();
    Ok(found)
}
