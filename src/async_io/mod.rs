//! Asynchronous dataset loading
//!
//! Loads many dataset files concurrently, one unit per file. Parquet files
//! are streamed with the async reader; CSV parsing runs on the blocking pool.

use std::path::{Path, PathBuf};
use std::time::Instant;

use arrow::compute::concat_batches;
use arrow::record_batch::RecordBatch;
use futures::stream::{self, StreamExt, TryStreamExt};
use parquet::arrow::async_reader::ParquetRecordBatchStreamBuilder;
use tokio::fs::File;

use crate::dataset::{Dataset, DatasetId, Stage, UnitFailure, UnitOutcome};
use crate::error::{PipelineError, Result};
use crate::utils::io::parquet::{DEFAULT_BATCH_SIZE, get_batch_size};
use crate::utils::io::{DatasetFormat, read_csv};
use crate::utils::logging::{log_operation_complete, log_operation_start};

/// Read a Parquet file asynchronously into one record batch
pub async fn read_parquet_async(path: &Path) -> Result<RecordBatch> {
    let start = Instant::now();
    log_operation_start("Reading parquet file asynchronously", path);

    let file = File::open(path).await.map_err(|e| {
        PipelineError::io_error_with_source("Failed to open parquet file", e).with_path(path)
    })?;
    let builder = ParquetRecordBatchStreamBuilder::new(file)
        .await
        .map_err(|e| PipelineError::from(e).with_path(path))?;
    let schema = builder.schema().clone();
    let stream = builder
        .with_batch_size(get_batch_size().unwrap_or(DEFAULT_BATCH_SIZE))
        .build()
        .map_err(|e| PipelineError::from(e).with_path(path))?;

    let batches = stream
        .try_collect::<Vec<_>>()
        .await
        .map_err(|e| PipelineError::from(e).with_path(path))?;
    let batch = concat_batches(&schema, &batches)?;

    log_operation_complete("read", path, batch.num_rows(), Some(start.elapsed()));
    Ok(batch)
}

/// Read a CSV or Parquet dataset file without blocking the runtime
pub async fn read_dataset_async(path: &Path) -> Result<RecordBatch> {
    match DatasetFormat::from_path(path) {
        Some(DatasetFormat::Parquet) => read_parquet_async(path).await,
        Some(DatasetFormat::Csv) => {
            let owned = path.to_path_buf();
            tokio::task::spawn_blocking(move || read_csv(&owned))
                .await
                .map_err(|e| {
                    PipelineError::io_error(format!("CSV reader task failed: {e}")).with_path(path)
                })?
        }
        None => Err(PipelineError::io_error("Unsupported dataset file extension").with_path(path)),
    }
}

/// Load every listed dataset concurrently
///
/// At most `num_cpus` files are read at once. A file that fails to load is
/// reported as a unit failure; the returned outcomes follow the input order.
pub async fn load_datasets(entries: Vec<(DatasetId, PathBuf)>) -> Vec<UnitOutcome<Dataset>> {
    let concurrency = num_cpus::get();
    log::info!(
        "Loading {} dataset file(s) with up to {concurrency} concurrent reads",
        entries.len()
    );

    let mut outcomes: Vec<(usize, UnitOutcome<Dataset>)> = stream::iter(entries.into_iter().enumerate())
        .map(|(position, (id, path))| async move {
            let outcome = match read_dataset_async(&path).await {
                Ok(batch) => Ok(Dataset::new(id, batch)),
                Err(e) => Err(UnitFailure::new(id, Stage::Aggregate, &e)),
            };
            (position, outcome)
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    outcomes.sort_by_key(|(position, _)| *position);
    outcomes.into_iter().map(|(_, outcome)| outcome).collect()
}
