//! CSV dataset files
//!
//! Column types are inferred from the file, so identifiers may arrive as
//! integers; downstream code normalizes them with the arrow utilities.

use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use arrow::compute::concat_batches;
use arrow::csv::reader::Format;
use arrow::csv::{ReaderBuilder, WriterBuilder};
use arrow::record_batch::RecordBatch;

use crate::error::util::{ensure_parent_directory, safe_open_file};
use crate::error::{PipelineError, Result};
use crate::utils::logging::{log_operation_complete, log_operation_start};

/// Rows scanned for schema inference
pub const SCHEMA_INFERENCE_ROWS: usize = 10_000;

/// Rows per batch while reading
pub const CSV_BATCH_SIZE: usize = 16_384;

/// Read a CSV file with a header row into one record batch
pub fn read_csv(path: &Path) -> Result<RecordBatch> {
    let start = Instant::now();
    log_operation_start("Reading CSV file", path);

    let mut file = safe_open_file(path, "CSV dataset")?;
    let format = Format::default().with_header(true);
    let (schema, _) = format
        .infer_schema(&mut file, Some(SCHEMA_INFERENCE_ROWS))
        .map_err(|e| PipelineError::from(e).with_path(path))?;
    file.seek(SeekFrom::Start(0))
        .map_err(|e| PipelineError::io_error_with_source("Failed to rewind CSV file", e).with_path(path))?;

    let schema = Arc::new(schema);
    let reader = ReaderBuilder::new(Arc::clone(&schema))
        .with_format(format)
        .with_batch_size(CSV_BATCH_SIZE)
        .build(file)
        .map_err(|e| PipelineError::from(e).with_path(path))?;

    let batches = reader
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| PipelineError::from(e).with_path(path))?;
    let batch = concat_batches(&schema, &batches)?;

    log_operation_complete("read", path, batch.num_rows(), Some(start.elapsed()));
    Ok(batch)
}

/// Write a record batch as CSV with a header row
pub fn write_csv(path: &Path, batch: &RecordBatch) -> Result<()> {
    ensure_parent_directory(path)?;
    let file = File::create(path)
        .map_err(|e| PipelineError::io_error_with_source("Failed to create CSV file", e).with_path(path))?;
    let mut writer = WriterBuilder::new().with_header(true).build(file);
    writer
        .write(batch)
        .map_err(|e| PipelineError::from(e).with_path(path))?;
    log::debug!("Wrote {} rows to {}", batch.num_rows(), path.display());
    Ok(())
}
