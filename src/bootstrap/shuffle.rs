//! Within-participant permutation of diagnosis codes

use arrow::array::{Array, UInt32Array};
use arrow::compute::take;
use arrow::record_batch::RecordBatch;
use rand::Rng;
use rand::seq::SliceRandom;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::config::ColumnNames;
use crate::error::{PipelineError, Result};
use crate::utils::arrow::{get_column_by_name, replace_column, string_column};

/// Row indices of one participant, in original row order
type ParticipantRows = SmallVec<[u32; 16]>;

/// Group row indices by participant in order of first appearance
///
/// Rows with a null participant id form one group of their own.
pub fn participant_groups(batch: &RecordBatch, columns: &ColumnNames) -> Result<Vec<ParticipantRows>> {
    let ids = string_column(batch, &columns.participant_id)?;
    let mut group_of: FxHashMap<Option<&str>, usize> = FxHashMap::default();
    let mut groups: Vec<ParticipantRows> = Vec::new();

    for row in 0..ids.len() {
        let key = ids.is_valid(row).then(|| ids.value(row));
        let index = *group_of.entry(key).or_insert_with(|| {
            groups.push(SmallVec::new());
            groups.len() - 1
        });
        let row = u32::try_from(row)
            .map_err(|_| PipelineError::invalid_data(format!("row index {row} exceeds u32 range")))?;
        groups[index].push(row);
    }

    Ok(groups)
}

/// Permute each participant's diagnosis codes across that participant's rows
///
/// Every other column keeps its row order, so participant ids, record ids
/// and attributes stay in place. Code multiplicities per participant are
/// preserved, nulls included.
pub fn shuffle_within_participants<R: Rng + ?Sized>(
    batch: &RecordBatch,
    columns: &ColumnNames,
    rng: &mut R,
) -> Result<RecordBatch> {
    let codes = get_column_by_name(batch, &columns.diagnosis_code)?;
    let groups = participant_groups(batch, columns)?;

    let mut source_rows = vec![0_u32; batch.num_rows()];
    for rows in &groups {
        let mut permuted = rows.clone();
        permuted.shuffle(rng);
        for (target, source) in rows.iter().zip(permuted) {
            source_rows[*target as usize] = source;
        }
    }

    let indices = UInt32Array::from(source_rows);
    let shuffled = take(codes.as_ref(), &indices, None)?;
    replace_column(batch, &columns.diagnosis_code, shuffled)
}
