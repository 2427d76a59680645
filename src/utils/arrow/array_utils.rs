//! Utilities for working with Arrow arrays.
//!
//! Column lookup, type normalization and projection helpers shared by the
//! filter, resampler and aggregator.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, Float64Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;

use crate::error::{PipelineError, Result};

/// Check that every named column exists, reporting all missing ones at once
///
/// # Arguments
/// * `batch` - The record batch to check
/// * `dataset` - Identity of the dataset, used in the error
/// * `columns` - Required column names
pub fn require_columns(batch: &RecordBatch, dataset: &str, columns: &[&str]) -> Result<()> {
    let schema = batch.schema();
    let missing: Vec<String> = columns
        .iter()
        .filter(|name| schema.index_of(name).is_err())
        .map(|name| (*name).to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::missing_columns(dataset, missing))
    }
}

/// Get the index of a column by name
pub fn get_column_index(batch: &RecordBatch, column_name: &str) -> Result<usize> {
    batch
        .schema()
        .index_of(column_name)
        .map_err(|_| PipelineError::invalid_data(format!("Column '{column_name}' not found")))
}

/// Get a column by name
pub fn get_column_by_name(batch: &RecordBatch, column_name: &str) -> Result<ArrayRef> {
    let idx = get_column_index(batch, column_name)?;
    Ok(Arc::clone(batch.column(idx)))
}

/// Downcast an array reference to a concrete array type
pub fn downcast_array<'a, A: Array + 'static>(
    array: &'a ArrayRef,
    column_name: &str,
    type_name: &str,
) -> Result<&'a A> {
    array.as_any().downcast_ref::<A>().ok_or_else(|| {
        PipelineError::invalid_data(format!("Column '{column_name}' is not a {type_name} array"))
    })
}

/// Get a column as strings, casting from numeric or dictionary types when needed
///
/// Participant ids may be inferred as integers in one table and strings in
/// another; comparing both sides as Utf8 keeps joins type-agnostic.
pub fn string_column(batch: &RecordBatch, column_name: &str) -> Result<StringArray> {
    let column = get_column_by_name(batch, column_name)?;
    let utf8 = if column.data_type() == &DataType::Utf8 {
        column
    } else {
        cast(&column, &DataType::Utf8)
            .map_err(|e| PipelineError::from(e).context(format!("column '{column_name}'")))?
    };
    Ok(downcast_array::<StringArray>(&utf8, column_name, "string")?.clone())
}

/// Get a column as `f64` values for numeric range checks
pub fn float_column(batch: &RecordBatch, column_name: &str) -> Result<Float64Array> {
    let column = get_column_by_name(batch, column_name)?;
    let floats = cast(&column, &DataType::Float64)
        .map_err(|e| PipelineError::from(e).context(format!("column '{column_name}'")))?;
    Ok(downcast_array::<Float64Array>(&floats, column_name, "float")?.clone())
}

/// Get a column as booleans
pub fn boolean_column(batch: &RecordBatch, column_name: &str) -> Result<BooleanArray> {
    let column = get_column_by_name(batch, column_name)?;
    let bools = cast(&column, &DataType::Boolean)
        .map_err(|e| PipelineError::from(e).context(format!("column '{column_name}'")))?;
    Ok(downcast_array::<BooleanArray>(&bools, column_name, "boolean")?.clone())
}

/// Keep only the named columns, in the given order
pub fn project_columns(batch: &RecordBatch, columns: &[&str]) -> Result<RecordBatch> {
    let indices = columns
        .iter()
        .map(|name| get_column_index(batch, name))
        .collect::<Result<Vec<_>>>()?;
    Ok(batch.project(&indices)?)
}

/// Replace one column's values, keeping the field name and nullability
pub fn replace_column(batch: &RecordBatch, column_name: &str, values: ArrayRef) -> Result<RecordBatch> {
    let idx = get_column_index(batch, column_name)?;
    let schema = batch.schema();

    let fields: Vec<Field> = schema
        .fields()
        .iter()
        .enumerate()
        .map(|(i, field)| {
            if i == idx {
                field
                    .as_ref()
                    .clone()
                    .with_data_type(values.data_type().clone())
                    .with_nullable(field.is_nullable() || values.null_count() > 0)
            } else {
                field.as_ref().clone()
            }
        })
        .collect();

    let mut columns = batch.columns().to_vec();
    columns[idx] = values;

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}
