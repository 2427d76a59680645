//! Co-occurrence aggregator
//!
//! Turns every cohort and resample into a disease by disease matrix of
//! participant counts. Aggregation is a pure function of its input dataset.

pub mod aggregate;
pub mod matrix;

use log::info;
use rayon::prelude::*;

use crate::config::ColumnNames;
use crate::dataset::{Dataset, DatasetId, Stage, UnitFailure, UnitOutcome};

pub use aggregate::{Aggregation, AggregationStats, aggregate, aggregate_batch};
pub use matrix::{CooccurrenceMatrix, CooccurrencePair, DifferenceMatrix, LABEL_COLUMN};

/// Aggregate several datasets in parallel, one unit per dataset
///
/// Outcomes are returned in input order; a failing dataset does not affect
/// the others.
pub fn aggregate_all(
    datasets: &[Dataset],
    columns: &ColumnNames,
) -> Vec<UnitOutcome<(DatasetId, Aggregation)>> {
    info!("Aggregating {} dataset(s)", datasets.len());
    datasets
        .par_iter()
        .map(|dataset| {
            aggregate(dataset, columns)
                .map(|aggregation| (dataset.id.clone(), aggregation))
                .map_err(|e| UnitFailure::new(dataset.id.clone(), Stage::Aggregate, &e))
        })
        .collect()
}
