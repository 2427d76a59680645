use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use hesin_cooccur::config::ColumnNames;
use hesin_cooccur::{Pipeline, PipelineConfig, aggregate_directory};
use log::{error, info};

#[cfg(feature = "snmalloc")]
#[global_allocator]
static ALLOC: snmalloc_rs::SnMalloc = snmalloc_rs::SnMalloc;

/// Disease co-occurrence matrices from hospital episode records
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Filter, resample and aggregate as described by a configuration file
    Run {
        /// Pipeline configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,
        /// Override the configured seed
        #[arg(long)]
        seed: Option<u64>,
        /// Override the configured number of resamples
        #[arg(long)]
        iterations: Option<u32>,
    },
    /// Compute matrices for every dataset file in a directory
    Aggregate {
        /// Experiment directory or directory of dataset files
        #[arg(short, long)]
        input_dir: PathBuf,
        /// Where matrices are written
        #[arg(short, long)]
        output_dir: PathBuf,
        /// Optional configuration supplying column names
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

/// Exit status reported when any unit of work failed
const UNIT_FAILURE_EXIT: u8 = 2;

fn exit_status(failed_units: usize) -> ExitCode {
    if failed_units == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(UNIT_FAILURE_EXIT)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let failed_units = match Cli::parse().command {
        Command::Run {
            config,
            seed,
            iterations,
        } => {
            let mut pipeline_config = PipelineConfig::from_json_file(&config)
                .with_context(|| format!("loading configuration {}", config.display()))?;
            if let Some(seed) = seed {
                pipeline_config.bootstrap.seed = Some(seed);
            }
            if let Some(iterations) = iterations {
                pipeline_config.bootstrap.iterations = iterations;
            }

            let pipeline = Pipeline::new(pipeline_config)?;
            let run = tokio::task::spawn_blocking(move || pipeline.run()).await??;
            if !run.failures.is_empty() {
                error!("{} unit(s) failed; see run_summary.json", run.failures.len());
            }
            run.failures.len()
        }
        Command::Aggregate {
            input_dir,
            output_dir,
            config,
        } => {
            let columns = match config {
                Some(path) => PipelineConfig::from_json_file(&path)?.columns,
                None => ColumnNames::default(),
            };
            let result = aggregate_directory(&input_dir, Some(&output_dir), &columns).await?;
            info!(
                "Wrote {} matrices to {}",
                result.aggregations.len(),
                output_dir.display()
            );
            for failure in &result.failures {
                error!("{failure}");
            }
            result.failures.len()
        }
    };

    log::logger().flush();
    Ok(exit_status(failed_units))
}
