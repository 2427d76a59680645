//! Core filtering functionality for episode tables
//!
//! Filters produce boolean masks over a record batch; masks are combined
//! before a single `filter_record_batch` call materializes the result.

use std::collections::HashSet;
use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray};
use arrow::compute::{and, filter as arrow_filter};
use arrow::record_batch::RecordBatch;

use crate::error::{PipelineError, Result};

/// Filter a record batch based on a boolean mask
///
/// # Arguments
/// * `batch` - The record batch to filter
/// * `mask` - The boolean mask indicating which rows to keep
///
/// # Returns
/// A new record batch with only rows where mask is true, with the input schema
pub fn filter_record_batch(batch: &RecordBatch, mask: &BooleanArray) -> Result<RecordBatch> {
    if batch.num_rows() != mask.len() {
        return Err(PipelineError::invalid_data(format!(
            "Mask length ({}) doesn't match batch row count ({})",
            mask.len(),
            batch.num_rows()
        )));
    }

    let filtered_columns: Vec<ArrayRef> = batch
        .columns()
        .iter()
        .map(|col| arrow_filter(col, mask))
        .collect::<arrow::error::Result<_>>()
        .map_err(|e| PipelineError::from(e).context("Failed to apply boolean filter to columns"))?;

    Ok(RecordBatch::try_new(batch.schema(), filtered_columns)?)
}

/// Trait for objects that select rows of a record batch
pub trait BatchFilter: std::fmt::Debug + Send + Sync {
    /// Evaluate the filter to a mask with one non-null entry per row
    fn mask(&self, batch: &RecordBatch) -> Result<BooleanArray>;

    /// Returns the set of column names required by this filter
    fn required_columns(&self) -> HashSet<String>;

    /// Filter a record batch
    fn filter(&self, batch: &RecordBatch) -> Result<RecordBatch> {
        let mask = self.mask(batch)?;
        filter_record_batch(batch, &mask)
    }
}

/// A filter that always includes all rows
#[derive(Debug, Clone, Default)]
pub struct IncludeAllFilter;

impl BatchFilter for IncludeAllFilter {
    fn mask(&self, batch: &RecordBatch) -> Result<BooleanArray> {
        Ok(BooleanArray::from(vec![true; batch.num_rows()]))
    }

    fn required_columns(&self) -> HashSet<String> {
        HashSet::new()
    }
}

/// A filter that combines multiple filters with a logical AND
#[derive(Debug, Clone)]
pub struct AndFilter {
    filters: Vec<Arc<dyn BatchFilter>>,
}

impl AndFilter {
    /// Create a new AND filter
    #[must_use]
    pub fn new(filters: Vec<Arc<dyn BatchFilter>>) -> Self {
        Self { filters }
    }
}

impl BatchFilter for AndFilter {
    fn mask(&self, batch: &RecordBatch) -> Result<BooleanArray> {
        let Some((first, rest)) = self.filters.split_first() else {
            return IncludeAllFilter.mask(batch);
        };

        let mut combined = first.mask(batch)?;
        for filter in rest {
            if combined.true_count() == 0 {
                break;
            }
            combined = and(&combined, &filter.mask(batch)?)?;
        }
        Ok(combined)
    }

    fn required_columns(&self) -> HashSet<String> {
        self.filters
            .iter()
            .flat_map(|filter| filter.required_columns())
            .collect()
    }
}
