//! Parquet dataset files

use std::fs::File;
use std::path::Path;
use std::time::Instant;

use arrow::compute::concat_batches;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::error::util::{ensure_parent_directory, safe_open_file};
use crate::error::{PipelineError, Result};
use crate::utils::logging::{log_operation_complete, log_operation_start};

/// Default batch size for Parquet reading
pub const DEFAULT_BATCH_SIZE: usize = 16_384;

/// Batch size from `PARQUET_BATCH_SIZE`, if set and valid
#[must_use]
pub fn get_batch_size() -> Option<usize> {
    std::env::var("PARQUET_BATCH_SIZE")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|&size| size > 0)
}

/// Read a Parquet file into one record batch
pub fn read_parquet(path: &Path) -> Result<RecordBatch> {
    let start = Instant::now();
    log_operation_start("Reading parquet file", path);

    let file = safe_open_file(path, "Parquet dataset")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| PipelineError::from(e).with_path(path))?;
    let schema = builder.schema().clone();
    let reader = builder
        .with_batch_size(get_batch_size().unwrap_or(DEFAULT_BATCH_SIZE))
        .build()
        .map_err(|e| PipelineError::from(e).with_path(path))?;

    let batches = reader
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| PipelineError::from(e).with_path(path))?;
    let batch = concat_batches(&schema, &batches)?;

    log_operation_complete("read", path, batch.num_rows(), Some(start.elapsed()));
    Ok(batch)
}

/// Write a record batch as a Snappy-compressed Parquet file
pub fn write_parquet(path: &Path, batch: &RecordBatch) -> Result<()> {
    ensure_parent_directory(path)?;
    let file = File::create(path).map_err(|e| {
        PipelineError::io_error_with_source("Failed to create parquet file", e).with_path(path)
    })?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
        .map_err(|e| PipelineError::from(e).with_path(path))?;
    writer
        .write(batch)
        .map_err(|e| PipelineError::from(e).with_path(path))?;
    writer
        .close()
        .map_err(|e| PipelineError::from(e).with_path(path))?;
    log::debug!("Wrote {} rows to {}", batch.num_rows(), path.display());
    Ok(())
}
