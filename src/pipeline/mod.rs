//! Pipeline orchestration
//!
//! Runs the record filter, the bootstrap resampler and the co-occurrence
//! aggregator in order. Each resample and each aggregation is an independent
//! unit of work: a failing unit is recorded and its siblings continue.

pub mod summary;

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use log::info;
use rayon::prelude::*;

use crate::async_io::load_datasets;
use crate::bootstrap::resample_cohort;
use crate::codes::DiseaseCodeSet;
use crate::config::{ColumnNames, PipelineConfig};
use crate::cooccurrence::{Aggregation, CooccurrenceMatrix, aggregate_all};
use crate::dataset::{Dataset, DatasetId, Stage, UnitFailure};
use crate::error::util::ensure_directory;
use crate::error::{PipelineError, Result};
use crate::filter::{FilterOutput, FilterReport, filter_records};
use crate::utils::io::{DatasetFormat, OutputLayout, discover_experiment, read_dataset, write_csv, write_dataset};
use crate::utils::logging::{add_group_progress_bar, create_multi_progress, finish_progress_bar};

pub use summary::{CohortSummary, RunSummary};

/// Input tables of one run
#[derive(Debug, Clone)]
pub struct PipelineInputs {
    pub episodes: RecordBatch,
    pub attributes: RecordBatch,
    pub code_set: DiseaseCodeSet,
}

impl PipelineInputs {
    #[must_use]
    pub fn new(episodes: RecordBatch, attributes: RecordBatch, code_set: DiseaseCodeSet) -> Self {
        Self {
            episodes,
            attributes,
            code_set,
        }
    }

    /// Load the inputs named by a configuration
    pub fn load(config: &PipelineConfig) -> Result<Self> {
        let episodes = read_dataset(&config.episodes_path).map_err(|e| e.context("episodes"))?;
        let attributes = read_dataset(&config.attributes_path).map_err(|e| e.context("attributes"))?;
        let code_set = DiseaseCodeSet::from_json_file(&config.codes_path)?;
        Ok(Self::new(episodes, attributes, code_set))
    }
}

/// Result of a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub filter: FilterReport,
    /// Filtered cohorts in combination order
    pub cohorts: Vec<Dataset>,
    /// Successful resamples; left empty by on-disk runs
    pub resamples: Vec<Dataset>,
    /// Aggregation of every cohort and resample that succeeded
    pub aggregations: BTreeMap<DatasetId, Aggregation>,
    pub failures: Vec<UnitFailure>,
    /// Successful resamples per cohort
    resample_counts: BTreeMap<String, usize>,
}

impl PipelineRun {
    fn new(filter: FilterReport) -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            finished_at: now,
            filter,
            cohorts: Vec::new(),
            resamples: Vec::new(),
            aggregations: BTreeMap::new(),
            failures: Vec::new(),
            resample_counts: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn cohort(&self, name: &str) -> Option<&Dataset> {
        self.cohorts.iter().find(|c| c.id.cohort == name)
    }

    #[must_use]
    pub fn matrix(&self, id: &DatasetId) -> Option<&CooccurrenceMatrix> {
        self.aggregations.get(id).map(|a| &a.matrix)
    }

    /// Resample matrices of a cohort in iteration order
    pub fn resample_matrices<'a>(&'a self, cohort: &'a str) -> impl Iterator<Item = (u32, &'a CooccurrenceMatrix)> + 'a {
        self.aggregations
            .iter()
            .filter(move |(id, _)| id.cohort == cohort)
            .filter_map(|(id, a)| id.iteration.map(|i| (i, &a.matrix)))
    }

    /// Summarize the run
    #[must_use]
    pub fn summary(&self, config: &PipelineConfig) -> RunSummary {
        let cohorts = self
            .filter
            .cohorts
            .iter()
            .map(|report| CohortSummary {
                name: report.name.clone(),
                records: report.records,
                participants: report.participants,
                resamples: self.resample_counts.get(&report.name).copied().unwrap_or(0),
                matrices: self
                    .aggregations
                    .keys()
                    .filter(|id| id.cohort == report.name)
                    .count(),
                failures: self
                    .failures
                    .iter()
                    .filter(|f| f.unit.cohort == report.name)
                    .count(),
            })
            .collect();

        RunSummary {
            experiment_name: config.experiment_name.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            iterations: config.bootstrap.iterations,
            seed: config.bootstrap.seed,
            filter: self.filter.clone(),
            cohorts,
            matrices: self.aggregations.len(),
            failures: self.failures.clone(),
        }
    }
}

/// Three-stage co-occurrence pipeline
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    pool: rayon::ThreadPool,
}

fn persist(path: &Path, batch: &RecordBatch, id: &DatasetId) -> std::result::Result<(), UnitFailure> {
    write_dataset(path, batch).map_err(|e| UnitFailure::new(id.clone(), Stage::Persist, &e))
}

fn persist_matrix(layout: &OutputLayout, id: &DatasetId, matrix: &CooccurrenceMatrix) -> std::result::Result<(), UnitFailure> {
    matrix
        .to_record_batch()
        .and_then(|batch| write_csv(&layout.matrix_file(id), &batch))
        .map_err(|e| UnitFailure::new(id.clone(), Stage::Persist, &e))
}

impl Pipeline {
    /// Validate the configuration and size the worker pool
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.thread_count())
            .thread_name(|i| format!("cooccur-worker-{i}"))
            .build()
            .map_err(|e| PipelineError::invalid_config(format!("failed to build thread pool: {e}")))?;
        Ok(Self { config, pool })
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage on in-memory inputs without touching the filesystem
    pub fn run_in_memory(&self, inputs: &PipelineInputs) -> Result<PipelineRun> {
        self.pool.install(|| self.execute(inputs, None))
    }

    /// Load inputs from disk, run every stage and persist the results
    pub fn run(&self) -> Result<PipelineRun> {
        info!("{}", self.config);
        let inputs = PipelineInputs::load(&self.config)?;
        let layout = OutputLayout::new(
            &self.config.output_dir,
            &self.config.experiment_name,
            self.config.output_format,
        );
        ensure_directory(layout.root())?;

        let run = self.pool.install(|| self.execute(&inputs, Some(&layout)))?;
        let summary = run.summary(&self.config);
        summary.write_json(&layout.summary_file())?;
        summary.log();
        Ok(run)
    }

    fn execute(&self, inputs: &PipelineInputs, layout: Option<&OutputLayout>) -> Result<PipelineRun> {
        let start = Instant::now();
        let started_at = Utc::now();
        let columns = &self.config.columns;
        let bootstrap = &self.config.bootstrap;

        let FilterOutput { cohorts, report } = filter_records(
            &inputs.episodes,
            &inputs.attributes,
            &inputs.code_set,
            self.config.method,
            self.config.demographics.as_ref(),
            columns,
        )?;

        let mut run = PipelineRun::new(report);
        run.started_at = started_at;
        let seeds = bootstrap.seeds();
        let (mp, main_pb) = create_multi_progress(cohorts.len() as u64, Some("Processing cohorts"));

        for cohort in cohorts {
            let name = cohort.id.cohort.clone();
            let cohort_pb = add_group_progress_bar(&mp, u64::from(bootstrap.iterations) + 1, Some(&name));

            if let Some(layout) = layout {
                if let Err(failure) = persist(&layout.dataset_file(&cohort.id), &cohort.batch, &cohort.id) {
                    run.failures.push(failure);
                }
            }

            let mut resamples = Vec::with_capacity(bootstrap.iterations as usize);
            for outcome in resample_cohort(&cohort, bootstrap, columns, &seeds) {
                match outcome {
                    Ok(resample) => resamples.push(resample),
                    Err(failure) => run.failures.push(failure),
                }
            }
            run.resample_counts.insert(name.clone(), resamples.len());

            if let (Some(layout), true) = (layout, bootstrap.persist) {
                let failures: Vec<UnitFailure> = resamples
                    .par_iter()
                    .filter_map(|r| persist(&layout.dataset_file(&r.id), &r.batch, &r.id).err())
                    .collect();
                run.failures.extend(failures);
            }

            let mut datasets = Vec::with_capacity(resamples.len() + 1);
            datasets.push(cohort);
            datasets.extend(resamples);

            for outcome in aggregate_all(&datasets, columns) {
                match outcome {
                    Ok((id, aggregation)) => {
                        if let Some(layout) = layout {
                            if let Err(failure) = persist_matrix(layout, &id, &aggregation.matrix) {
                                run.failures.push(failure);
                            }
                        }
                        run.aggregations.insert(id, aggregation);
                    }
                    Err(failure) => run.failures.push(failure),
                }
                cohort_pb.inc(1);
            }

            let mut datasets = datasets.into_iter();
            if let Some(cohort) = datasets.next() {
                run.cohorts.push(cohort);
            }
            if layout.is_none() {
                run.resamples.extend(datasets);
            }

            finish_progress_bar(&cohort_pb, Some(&format!("{name} done")));
            main_pb.inc(1);
        }

        finish_progress_bar(&main_pb, Some("All cohorts processed"));
        run.failures.sort_by(|a, b| a.unit.cmp(&b.unit));
        run.finished_at = Utc::now();
        info!(
            "Pipeline finished in {:?}: {} matrices, {} failed unit(s)",
            start.elapsed(),
            run.aggregations.len(),
            run.failures.len()
        );
        Ok(run)
    }
}

/// Matrices computed from a directory of dataset files
#[derive(Debug, Clone, Default)]
pub struct DirectoryAggregation {
    pub aggregations: BTreeMap<DatasetId, Aggregation>,
    pub failures: Vec<UnitFailure>,
}

/// Aggregate every dataset file found in `input_dir`
///
/// `input_dir` may be an experiment directory written by [`Pipeline::run`]
/// or a plain directory of dataset files. Matrices are written under
/// `output_dir` when given, using the experiment layout.
pub async fn aggregate_directory(
    input_dir: &Path,
    output_dir: Option<&Path>,
    columns: &ColumnNames,
) -> Result<DirectoryAggregation> {
    let entries = discover_experiment(input_dir)?;
    if entries.is_empty() {
        log::warn!("No dataset files found in {}", input_dir.display());
    }

    let mut result = DirectoryAggregation::default();
    let mut datasets = Vec::with_capacity(entries.len());
    for outcome in load_datasets(entries).await {
        match outcome {
            Ok(dataset) => datasets.push(dataset),
            Err(failure) => result.failures.push(failure),
        }
    }

    let owned_columns = columns.clone();
    let outcomes = tokio::task::spawn_blocking(move || aggregate_all(&datasets, &owned_columns))
        .await
        .map_err(|e| PipelineError::invalid_data(format!("aggregation task failed: {e}")))?;

    let layout = output_dir.map(|dir| OutputLayout::at(dir, DatasetFormat::Csv));
    if let Some(layout) = &layout {
        ensure_directory(layout.root())?;
    }
    for outcome in outcomes {
        match outcome {
            Ok((id, aggregation)) => {
                if let Some(layout) = &layout {
                    if let Err(failure) = persist_matrix(layout, &id, &aggregation.matrix) {
                        result.failures.push(failure);
                    }
                }
                result.aggregations.insert(id, aggregation);
            }
            Err(failure) => result.failures.push(failure),
        }
    }

    info!(
        "Aggregated {} dataset(s) from {} ({} failed)",
        result.aggregations.len(),
        input_dir.display(),
        result.failures.len()
    );
    Ok(result)
}
