//! Demographic bucket predicates
//!
//! A filter specification maps each demographic field to named buckets. The
//! cartesian product of one bucket per field defines the cohorts.

use std::collections::HashSet;
use std::fmt;

use arrow::array::{Array, BooleanArray};
use arrow::record_batch::RecordBatch;
use itertools::Itertools;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::filter::core::BatchFilter;
use crate::utils::arrow::{boolean_column, float_column, string_column};

/// Separator between bucket names in a cohort name
pub const COHORT_NAME_SEPARATOR: &str = "_";

/// An exact value a categorical bucket compares against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExactValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for ExactValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
        }
    }
}

/// Membership test for one bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BucketPredicate {
    /// Inclusive numeric range `[min, max]`
    Range { min: f64, max: f64 },
    /// Exact equality
    Exact { value: ExactValue },
}

impl fmt::Display for BucketPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Range { min, max } => write!(f, "{min} <= value <= {max}"),
            Self::Exact { value } => write!(f, "== {value}"),
        }
    }
}

/// A named bucket within a demographic dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub name: String,
    #[serde(flatten)]
    pub predicate: BucketPredicate,
}

impl Bucket {
    #[must_use]
    pub fn range(name: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            name: name.into(),
            predicate: BucketPredicate::Range { min, max },
        }
    }

    #[must_use]
    pub fn exact(name: impl Into<String>, value: ExactValue) -> Self {
        Self {
            name: name.into(),
            predicate: BucketPredicate::Exact { value },
        }
    }
}

/// One attribute field and its buckets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemographicDimension {
    pub field: String,
    pub buckets: Vec<Bucket>,
}

impl DemographicDimension {
    #[must_use]
    pub fn new(field: impl Into<String>, buckets: Vec<Bucket>) -> Self {
        Self {
            field: field.into(),
            buckets,
        }
    }
}

/// Ordered demographic dimensions; order fixes cohort naming
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DemographicFilterSpec {
    pub dimensions: Vec<DemographicDimension>,
}

/// One cohort definition: a bucket choice for every dimension
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCombination {
    pub name: String,
    pub choices: Vec<(String, Bucket)>,
}

impl DemographicFilterSpec {
    #[must_use]
    pub fn new(dimensions: Vec<DemographicDimension>) -> Self {
        Self { dimensions }
    }

    /// Attribute fields the specification reads
    #[must_use]
    pub fn fields(&self) -> Vec<&str> {
        self.dimensions.iter().map(|d| d.field.as_str()).collect()
    }

    /// Expand the specification into every bucket combination
    ///
    /// Names are bucket names joined in dimension order. Two combinations
    /// producing the same name is a configuration error.
    pub fn combinations(&self) -> Result<Vec<FilterCombination>> {
        if self.dimensions.is_empty() {
            return Err(PipelineError::invalid_config(
                "demographic filter has no dimensions",
            ));
        }

        for dimension in &self.dimensions {
            if dimension.buckets.is_empty() {
                return Err(PipelineError::invalid_config(format!(
                    "demographic field '{}' has no buckets",
                    dimension.field
                )));
            }
            for bucket in &dimension.buckets {
                if bucket.name.is_empty() {
                    return Err(PipelineError::invalid_config(format!(
                        "bucket of field '{}' has an empty name",
                        dimension.field
                    )));
                }
                if let BucketPredicate::Range { min, max } = bucket.predicate {
                    if min.is_nan() || max.is_nan() || min > max {
                        return Err(PipelineError::invalid_config(format!(
                            "bucket '{}' of field '{}' has invalid range [{min}, {max}]",
                            bucket.name, dimension.field
                        )));
                    }
                }
            }
        }

        let combinations: Vec<FilterCombination> = self
            .dimensions
            .iter()
            .map(|dimension| {
                dimension
                    .buckets
                    .iter()
                    .map(move |bucket| (dimension.field.clone(), bucket.clone()))
            })
            .multi_cartesian_product()
            .map(|choices| FilterCombination {
                name: choices
                    .iter()
                    .map(|(_, bucket)| bucket.name.as_str())
                    .join(COHORT_NAME_SEPARATOR),
                choices,
            })
            .collect();

        let mut seen = FxHashSet::default();
        for combination in &combinations {
            if !seen.insert(combination.name.as_str()) {
                return Err(PipelineError::invalid_config(format!(
                    "cohort name '{}' is produced by more than one bucket combination",
                    combination.name
                )));
            }
        }

        Ok(combinations)
    }
}

/// Batch filter evaluating one bucket predicate on one column
#[derive(Debug, Clone)]
pub struct BucketFilter {
    field: String,
    predicate: BucketPredicate,
}

impl BucketFilter {
    #[must_use]
    pub fn new(field: impl Into<String>, predicate: BucketPredicate) -> Self {
        Self {
            field: field.into(),
            predicate,
        }
    }
}

fn numeric_equals(batch: &RecordBatch, field: &str, target: f64) -> Result<BooleanArray> {
    let values = float_column(batch, field)?;
    Ok((0..values.len())
        .map(|i| Some(values.is_valid(i) && values.value(i) == target))
        .collect())
}

impl BatchFilter for BucketFilter {
    fn mask(&self, batch: &RecordBatch) -> Result<BooleanArray> {
        let rows = 0..batch.num_rows();
        let mask = match &self.predicate {
            BucketPredicate::Range { min, max } => {
                let values = float_column(batch, &self.field)?;
                rows.map(|i| Some(values.is_valid(i) && (*min..=*max).contains(&values.value(i))))
                    .collect()
            }
            BucketPredicate::Exact {
                value: ExactValue::Int(target),
            } => numeric_equals(batch, &self.field, *target as f64)?,
            BucketPredicate::Exact {
                value: ExactValue::Float(target),
            } => numeric_equals(batch, &self.field, *target)?,
            BucketPredicate::Exact {
                value: ExactValue::Text(target),
            } => {
                let values = string_column(batch, &self.field)?;
                rows.map(|i| Some(values.is_valid(i) && values.value(i) == target))
                    .collect()
            }
            BucketPredicate::Exact {
                value: ExactValue::Bool(target),
            } => {
                let values = boolean_column(batch, &self.field)?;
                rows.map(|i| Some(values.is_valid(i) && values.value(i) == *target))
                    .collect()
            }
        };
        Ok(mask)
    }

    fn required_columns(&self) -> HashSet<String> {
        HashSet::from([self.field.clone()])
    }
}
