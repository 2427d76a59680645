//! Hospital-episode disease co-occurrence pipeline.
//!
//! Filters episode records into demographic cohorts, builds within-participant
//! bootstrap resamples of each cohort and counts disease co-occurrence per
//! participant for every cohort and resample.

pub mod async_io;
pub mod bootstrap;
pub mod codes;
pub mod config;
pub mod cooccurrence;
pub mod dataset;
pub mod error;
pub mod filter;
pub mod pipeline;
pub mod utils;

// Core types
pub use config::{ColumnNames, PipelineConfig};
pub use dataset::{Dataset, DatasetId, Stage, UnitFailure, UnitOutcome};
pub use error::{PipelineError, Result};

// Arrow types
pub use arrow::record_batch::RecordBatch;

// Stages
pub use bootstrap::{BootstrapConfig, SeedSequence, resample_cohort, shuffle_within_participants};
pub use codes::{CodeSelection, DiseaseCodeSet, UNKNOWN_CODE, simplify_code};
pub use cooccurrence::{Aggregation, CooccurrenceMatrix, DifferenceMatrix, aggregate};
pub use filter::{
    Bucket, CodeFilterMethod, DemographicDimension, DemographicFilterSpec, FilterOutput,
    FilterReport, filter_records,
};
pub use pipeline::{Pipeline, PipelineInputs, PipelineRun, RunSummary, aggregate_directory};

// IO
pub use utils::io::{DatasetFormat, OutputLayout, discover_datasets, read_dataset, write_dataset};
