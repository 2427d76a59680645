//! Participant-level co-occurrence counting

use std::collections::BTreeSet;

use arrow::array::Array;
use arrow::record_batch::RecordBatch;
use rustc_hash::FxHashMap;
use serde::Serialize;
use smallvec::SmallVec;

use crate::codes::{UNKNOWN_CODE, disease_label};
use crate::config::ColumnNames;
use crate::cooccurrence::matrix::CooccurrenceMatrix;
use crate::dataset::Dataset;
use crate::error::Result;
use crate::utils::arrow::{require_columns, string_column};

/// Counts gathered while aggregating one dataset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregationStats {
    /// Records read
    pub records: usize,
    /// Distinct participants counted
    pub participants: usize,
    /// Records whose code could not be simplified
    pub unknown_codes: usize,
    /// Records repeating a disease their participant already has
    pub repeated_codes: usize,
    /// Records without a participant id, not counted
    pub missing_participant: usize,
}

/// A matrix together with the counts behind it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregation {
    pub matrix: CooccurrenceMatrix,
    pub stats: AggregationStats,
}

/// Aggregate a dataset into its co-occurrence matrix
pub fn aggregate(dataset: &Dataset, columns: &ColumnNames) -> Result<Aggregation> {
    aggregate_batch(&dataset.batch, columns, &dataset.id.to_string())
}

/// Aggregate a record batch into its co-occurrence matrix
///
/// Each participant contributes at most one to any cell: codes are reduced
/// to distinct simplified labels per participant before pairs are counted.
/// `dataset` names the input in errors.
pub fn aggregate_batch(batch: &RecordBatch, columns: &ColumnNames, dataset: &str) -> Result<Aggregation> {
    require_columns(batch, dataset, &columns.core())?;
    let ids = string_column(batch, &columns.participant_id)?;
    let codes = string_column(batch, &columns.diagnosis_code)?;

    let mut stats = AggregationStats {
        records: batch.num_rows(),
        ..AggregationStats::default()
    };

    let mut participant_of: FxHashMap<&str, usize> = FxHashMap::default();
    let mut diseases: Vec<SmallVec<[&str; 8]>> = Vec::new();

    for row in 0..batch.num_rows() {
        if ids.is_null(row) {
            stats.missing_participant += 1;
            continue;
        }
        let raw = codes.is_valid(row).then(|| codes.value(row));
        let label = disease_label(raw);
        if label == UNKNOWN_CODE {
            stats.unknown_codes += 1;
        }

        let participant = *participant_of.entry(ids.value(row)).or_insert_with(|| {
            diseases.push(SmallVec::new());
            diseases.len() - 1
        });
        let held = &mut diseases[participant];
        if held.contains(&label) {
            stats.repeated_codes += 1;
        } else {
            held.push(label);
        }
    }
    stats.participants = diseases.len();

    if stats.missing_participant > 0 {
        log::warn!(
            "{dataset}: {} records without a participant id were not counted",
            stats.missing_participant
        );
    }
    if stats.unknown_codes > 0 {
        log::debug!(
            "{dataset}: {} records counted under {UNKNOWN_CODE}",
            stats.unknown_codes
        );
    }

    let labels: BTreeSet<&str> = diseases.iter().flatten().copied().collect();
    let mut matrix = CooccurrenceMatrix::zeros(labels);

    for held in &diseases {
        let mut positions: SmallVec<[usize; 8]> = held
            .iter()
            .filter_map(|label| matrix.position(label))
            .collect();
        positions.sort_unstable();
        for (k, &a) in positions.iter().enumerate() {
            for &b in &positions[k..] {
                matrix.increment(a, b);
            }
        }
    }

    Ok(Aggregation { matrix, stats })
}
