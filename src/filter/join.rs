//! Inner join of episode records to participant attributes
//!
//! Records whose participant has no attribute row are dropped and counted.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, UInt32Array};
use arrow::compute::take;
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;

use crate::config::ColumnNames;
use crate::error::{PipelineError, Result};
use crate::utils::arrow::string_column;

/// Suffix given to attribute columns whose name already exists in the episode table
pub const ATTRIBUTE_COLLISION_SUFFIX: &str = "_attr";

/// Counts gathered while joining episodes to attributes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JoinStats {
    /// Episode records entering the join
    pub input_records: usize,
    /// Records with a matching attribute row
    pub joined_records: usize,
    /// Records dropped because their participant has no attribute row
    pub unmatched_records: usize,
    /// Distinct participants without an attribute row
    pub unmatched_participants: usize,
    /// Attribute rows ignored because their participant id was already seen
    pub duplicate_attribute_rows: usize,
}

/// Name an attribute column carries after the join
///
/// Attribute columns sharing a name with an episode column get
/// [`ATTRIBUTE_COLLISION_SUFFIX`] appended.
#[must_use]
pub fn joined_attribute_name(episode_schema: &Schema, name: &str) -> String {
    if episode_schema.index_of(name).is_ok() {
        format!("{name}{ATTRIBUTE_COLLISION_SUFFIX}")
    } else {
        name.to_string()
    }
}

fn to_u32(index: usize) -> Result<u32> {
    u32::try_from(index)
        .map_err(|_| PipelineError::invalid_data(format!("row index {index} exceeds u32 range")))
}

/// Join `episodes` to `attributes` by participant id
///
/// Participant ids are compared in their string form so integer and string
/// typed tables join correctly. The first attribute row wins for duplicated
/// ids. Output columns are the episode columns followed by the attribute
/// columns other than the participant id.
pub fn join_attributes(
    episodes: &RecordBatch,
    attributes: &RecordBatch,
    columns: &ColumnNames,
) -> Result<(RecordBatch, JoinStats)> {
    let episode_ids = string_column(episodes, &columns.participant_id)?;
    let attribute_ids = string_column(attributes, &columns.participant_id)?;

    let mut stats = JoinStats {
        input_records: episodes.num_rows(),
        ..JoinStats::default()
    };

    let mut attribute_rows: FxHashMap<&str, u32> = FxHashMap::default();
    for row in 0..attribute_ids.len() {
        if !attribute_ids.is_valid(row) {
            continue;
        }
        if attribute_rows.contains_key(attribute_ids.value(row)) {
            stats.duplicate_attribute_rows += 1;
        } else {
            attribute_rows.insert(attribute_ids.value(row), to_u32(row)?);
        }
    }

    let mut episode_take = Vec::with_capacity(episodes.num_rows());
    let mut attribute_take = Vec::with_capacity(episodes.num_rows());
    let mut unmatched: FxHashSet<Option<&str>> = FxHashSet::default();

    for row in 0..episode_ids.len() {
        let id = episode_ids.is_valid(row).then(|| episode_ids.value(row));
        match id.and_then(|id| attribute_rows.get(id)) {
            Some(&attribute_row) => {
                episode_take.push(to_u32(row)?);
                attribute_take.push(attribute_row);
            }
            None => {
                stats.unmatched_records += 1;
                unmatched.insert(id);
            }
        }
    }
    stats.joined_records = episode_take.len();
    stats.unmatched_participants = unmatched.len();

    if stats.duplicate_attribute_rows > 0 {
        log::warn!(
            "Attribute table has {} duplicate participant rows; the first row per participant is used",
            stats.duplicate_attribute_rows
        );
    }
    if stats.unmatched_records > 0 {
        log::warn!(
            "{} episode records from {} participants have no attribute row and were excluded",
            stats.unmatched_records,
            stats.unmatched_participants
        );
    }

    let episode_indices = UInt32Array::from(episode_take);
    let attribute_indices = UInt32Array::from(attribute_take);

    let episode_schema = episodes.schema();
    let attribute_schema = attributes.schema();

    let mut fields: Vec<Field> = Vec::with_capacity(episodes.num_columns() + attributes.num_columns());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(fields.capacity());

    for (field, column) in episode_schema.fields().iter().zip(episodes.columns()) {
        fields.push(field.as_ref().clone());
        arrays.push(take(column.as_ref(), &episode_indices, None)?);
    }

    for (field, column) in attribute_schema.fields().iter().zip(attributes.columns()) {
        if field.name() == &columns.participant_id {
            continue;
        }
        let name = joined_attribute_name(&episode_schema, field.name());
        if &name != field.name() {
            log::warn!(
                "Attribute column '{}' also exists in episodes; joined as '{name}'",
                field.name()
            );
        }
        fields.push(Field::new(name, field.data_type().clone(), field.is_nullable()));
        arrays.push(take(column.as_ref(), &attribute_indices, None)?);
    }

    let joined = RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?;
    Ok((joined, stats))
}
