//! Record filter stage
//!
//! Selects episode records by disease code set and demographic buckets and
//! partitions the result into named cohorts, one per bucket combination.

pub mod code;
pub mod core;
pub mod demographic;
pub mod join;

use std::sync::Arc;

use arrow::datatypes::Schema;
use arrow::record_batch::RecordBatch;
use log::info;
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use serde::Serialize;

use crate::codes::DiseaseCodeSet;
use crate::config::ColumnNames;
use crate::dataset::{Dataset, DatasetId};
use crate::error::{PipelineError, Result};
use crate::utils::arrow::{require_columns, string_column};

pub use code::{CodeFilter, CodeFilterMethod, CodeMaskStats, code_mask};
pub use self::core::{AndFilter, BatchFilter, IncludeAllFilter, filter_record_batch};
pub use demographic::{
    Bucket, BucketFilter, BucketPredicate, DemographicDimension, DemographicFilterSpec,
    ExactValue, FilterCombination,
};
pub use join::{JoinStats, join_attributes, joined_attribute_name};

/// Cohort name used when no demographic filter is configured
pub const UNFILTERED_COHORT: &str = "all";

/// Per-cohort counts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CohortReport {
    pub name: String,
    pub records: usize,
    pub participants: usize,
}

/// Everything the filter stage counted along the way
#[derive(Debug, Clone, Default, Serialize)]
pub struct FilterReport {
    pub input_records: usize,
    /// Records sharing a record id with an earlier record
    pub duplicate_record_ids: usize,
    pub code: CodeMaskStats,
    pub join: JoinStats,
    pub cohorts: Vec<CohortReport>,
}

/// Cohorts produced by the filter stage, in combination order
#[derive(Debug, Clone)]
pub struct FilterOutput {
    pub cohorts: Vec<Dataset>,
    pub report: FilterReport,
}

fn count_duplicate_ids(batch: &RecordBatch, column: &str) -> Result<usize> {
    let ids = string_column(batch, column)?;
    let mut seen = FxHashSet::default();
    Ok(ids.iter().flatten().filter(|id| !seen.insert(*id)).count())
}

/// Build the filter selecting one bucket combination
///
/// Bucket fields are looked up under their joined names, so an attribute
/// shadowed by an episode column of the same name is still the one tested.
fn combination_filter(combination: &FilterCombination, episode_schema: &Schema) -> AndFilter {
    AndFilter::new(
        combination
            .choices
            .iter()
            .map(|(field, bucket)| {
                Arc::new(BucketFilter::new(
                    joined_attribute_name(episode_schema, field),
                    bucket.predicate.clone(),
                )) as Arc<dyn BatchFilter>
            })
            .collect(),
    )
}

fn cohort_report(dataset: &Dataset, columns: &ColumnNames) -> Result<CohortReport> {
    Ok(CohortReport {
        name: dataset.id.cohort.clone(),
        records: dataset.num_rows(),
        participants: dataset.participant_count(columns)?,
    })
}

/// Run the filter stage
///
/// # Arguments
/// * `episodes` - Raw episode records
/// * `attributes` - One row per participant with demographic fields
/// * `code_set` - Disease codes to match
/// * `method` - Keep or drop matching records
/// * `demographics` - Bucket specification; `None` yields one cohort named `all`
/// * `columns` - Column naming of both tables
///
/// Every combination is emitted, including those matching no records.
pub fn filter_records(
    episodes: &RecordBatch,
    attributes: &RecordBatch,
    code_set: &DiseaseCodeSet,
    method: CodeFilterMethod,
    demographics: Option<&DemographicFilterSpec>,
    columns: &ColumnNames,
) -> Result<FilterOutput> {
    require_columns(
        episodes,
        "episodes",
        &[
            columns.record_id.as_str(),
            columns.participant_id.as_str(),
            columns.diagnosis_code.as_str(),
        ],
    )?;
    let mut attribute_columns = vec![columns.participant_id.as_str()];
    if let Some(spec) = demographics {
        attribute_columns.extend(spec.fields());
    }
    require_columns(attributes, "attributes", &attribute_columns)?;

    let combinations = demographics.map(DemographicFilterSpec::combinations).transpose()?;

    let duplicate_record_ids = count_duplicate_ids(episodes, &columns.record_id)?;
    if duplicate_record_ids > 0 {
        log::warn!(
            "{duplicate_record_ids} episode records share a '{}' value with an earlier record",
            columns.record_id
        );
    }

    info!(
        "Filtering {} episode records with {} disease codes (method: {method})",
        episodes.num_rows(),
        code_set.len()
    );
    let (mask, code_stats) = code_mask(episodes, &columns.diagnosis_code, code_set, method)?;
    let coded = filter_record_batch(episodes, &mask)?;
    info!(
        "Code filter retained {} of {} records ({} matched, {} with unknown codes)",
        code_stats.retained, code_stats.records, code_stats.matched, code_stats.unknown_codes
    );

    let (joined, join_stats) = join_attributes(&coded, attributes, columns)?;
    info!(
        "Joined {} records to participant attributes",
        join_stats.joined_records
    );

    let cohorts: Vec<Dataset> = match combinations {
        None => vec![Dataset::new(DatasetId::original(UNFILTERED_COHORT), joined)],
        Some(combinations) => {
            info!("Applying {} filter combination(s)", combinations.len());
            combinations
                .par_iter()
                .map(|combination| {
                    let cohort = combination_filter(combination, episodes.schema_ref())
                        .filter(&joined)
                        .map_err(|e| e.context(format!("cohort '{}'", combination.name)))?;
                    Ok(Dataset::new(DatasetId::original(&combination.name), cohort))
                })
                .collect::<Result<Vec<_>>>()?
        }
    };

    let cohort_reports = cohorts
        .iter()
        .map(|cohort| cohort_report(cohort, columns))
        .collect::<Result<Vec<_>>>()?;
    for report in &cohort_reports {
        info!(
            "Cohort {}: {} records, {} participants",
            report.name, report.records, report.participants
        );
        if report.records == 0 {
            log::warn!("Cohort {} matched no records", report.name);
        }
    }

    Ok(FilterOutput {
        cohorts,
        report: FilterReport {
            input_records: episodes.num_rows(),
            duplicate_record_ids,
            code: code_stats,
            join: join_stats,
            cohorts: cohort_reports,
        },
    })
}

impl FilterOutput {
    /// Look up a cohort by name
    #[must_use]
    pub fn cohort(&self, name: &str) -> Option<&Dataset> {
        self.cohorts.iter().find(|c| c.id.cohort == name)
    }

    /// Consume the output, failing if no cohort was produced
    pub fn into_cohorts(self) -> Result<Vec<Dataset>> {
        if self.cohorts.is_empty() {
            return Err(PipelineError::invalid_config("filter produced no cohorts"));
        }
        Ok(self.cohorts)
    }
}
