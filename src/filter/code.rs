//! Disease code predicate
//!
//! Selects episode records whose diagnosis code is (`keep`) or is not
//! (`drop`) in a disease code set.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use arrow::array::{Array, BooleanArray};
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};

use crate::codes::{DiseaseCodeSet, simplify_code};
use crate::error::{PipelineError, Result};
use crate::filter::core::BatchFilter;
use crate::utils::arrow::string_column;

/// Whether records matching the code set are retained or excluded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeFilterMethod {
    /// Retain only matching records
    #[default]
    Keep,
    /// Retain only non-matching records
    Drop,
}

impl fmt::Display for CodeFilterMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Keep => write!(f, "keep"),
            Self::Drop => write!(f, "drop"),
        }
    }
}

impl FromStr for CodeFilterMethod {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "keep" => Ok(Self::Keep),
            "drop" => Ok(Self::Drop),
            other => Err(PipelineError::invalid_config(format!(
                "Unknown code filter method '{other}' (expected 'keep' or 'drop')"
            ))),
        }
    }
}

/// Counts gathered while evaluating the code predicate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CodeMaskStats {
    /// Records evaluated
    pub records: usize,
    /// Records whose code is in the set
    pub matched: usize,
    /// Records with a null, empty or unsimplifiable code
    pub unknown_codes: usize,
    /// Records passing the predicate under the configured method
    pub retained: usize,
}

/// Evaluate the code predicate for every row of `batch`
///
/// Unknown codes never match, so they are excluded under `keep` and retained
/// under `drop`.
pub fn code_mask(
    batch: &RecordBatch,
    code_column: &str,
    code_set: &DiseaseCodeSet,
    method: CodeFilterMethod,
) -> Result<(BooleanArray, CodeMaskStats)> {
    let codes = string_column(batch, code_column)?;
    let mut stats = CodeMaskStats {
        records: codes.len(),
        ..CodeMaskStats::default()
    };

    let mask: BooleanArray = (0..codes.len())
        .map(|i| {
            let raw = codes.is_valid(i).then(|| codes.value(i));
            if raw.and_then(simplify_code).is_none() {
                stats.unknown_codes += 1;
            }
            let matched = raw.is_some_and(|code| code_set.contains_code(code));
            if matched {
                stats.matched += 1;
            }
            let keep = match method {
                CodeFilterMethod::Keep => matched,
                CodeFilterMethod::Drop => !matched,
            };
            if keep {
                stats.retained += 1;
            }
            Some(keep)
        })
        .collect();

    Ok((mask, stats))
}

/// Batch filter applying a code set under a keep/drop method
#[derive(Debug, Clone)]
pub struct CodeFilter {
    code_set: Arc<DiseaseCodeSet>,
    method: CodeFilterMethod,
    column: String,
}

impl CodeFilter {
    #[must_use]
    pub fn new(code_set: Arc<DiseaseCodeSet>, method: CodeFilterMethod, column: impl Into<String>) -> Self {
        Self {
            code_set,
            method,
            column: column.into(),
        }
    }
}

impl BatchFilter for CodeFilter {
    fn mask(&self, batch: &RecordBatch) -> Result<BooleanArray> {
        code_mask(batch, &self.column, &self.code_set, self.method).map(|(mask, _)| mask)
    }

    fn required_columns(&self) -> HashSet<String> {
        HashSet::from([self.column.clone()])
    }
}
