//! Diagnosis code normalization and disease code sets
//!
//! ICD-10 style codes may carry a sub-code after a separator (`I10.9`,
//! `E11 2`). Disease identity throughout the pipeline is the simplified code:
//! the part before the first `.` or whitespace.

use std::path::Path;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::error::util::safe_read_to_string;

/// Label used for codes that cannot be simplified (null, empty, or starting with a separator)
pub const UNKNOWN_CODE: &str = "UNKNOWN";

fn is_separator(c: char) -> bool {
    c == '.' || c.is_whitespace()
}

/// The full form of a code: trimmed, `None` when empty
#[must_use]
pub fn full_code(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Simplify a code to the portion before its first separator
///
/// Returns `None` when nothing precedes the separator, e.g. `""` or `".5"`.
#[must_use]
pub fn simplify_code(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    let end = trimmed.find(is_separator).unwrap_or(trimmed.len());
    let simplified = &trimmed[..end];
    (!simplified.is_empty()).then_some(simplified)
}

/// The disease label a raw (possibly null) code aggregates under
#[must_use]
pub fn disease_label(raw: Option<&str>) -> &str {
    raw.and_then(simplify_code).unwrap_or(UNKNOWN_CODE)
}

#[derive(Debug, Deserialize, Serialize)]
struct CodeSetFile {
    #[serde(default)]
    name: Option<String>,
    codes: Vec<String>,
}

/// A named, ordered set of disease codes used as an inclusion or exclusion predicate
#[derive(Debug, Clone, Default)]
pub struct DiseaseCodeSet {
    name: Option<String>,
    codes: Vec<String>,
    lookup: FxHashSet<String>,
}

impl DiseaseCodeSet {
    /// Build a code set, keeping the first occurrence of each code in order
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = FxHashSet::default();
        let mut ordered = Vec::new();
        let mut lookup = FxHashSet::default();

        for code in codes {
            let code: String = code.into();
            let Some(full) = full_code(&code) else {
                continue;
            };
            if !seen.insert(full.to_string()) {
                continue;
            }
            ordered.push(full.to_string());
            lookup.insert(full.to_string());
            if let Some(simplified) = simplify_code(full) {
                lookup.insert(simplified.to_string());
            }
        }

        Self {
            name: None,
            codes: ordered,
            lookup,
        }
    }

    /// Attach a display name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Load a code set from a JSON file of the form `{"codes": ["I10", ...]}`
    ///
    /// The set is named after the file's `name` field, or its stem.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = safe_read_to_string(path, "disease code set")?;
        let file: CodeSetFile = serde_json::from_str(&content)
            .map_err(|e| PipelineError::from(e).context(format!("code set {}", path.display())))?;

        let name = file.name.or_else(|| {
            path.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
        });
        let set = Self::new(file.codes);
        if set.is_empty() {
            log::warn!("Code set {} contains no usable codes", path.display());
        }

        Ok(match name {
            Some(name) => set.with_name(name),
            None => set,
        })
    }

    /// Whether a record's code matches the set
    ///
    /// A record matches when its full or simplified form equals any configured
    /// code in full or simplified form. Unknown codes never match.
    #[must_use]
    pub fn contains_code(&self, raw: &str) -> bool {
        let Some(full) = full_code(raw) else {
            return false;
        };
        if self.lookup.contains(full) {
            return true;
        }
        simplify_code(full).is_some_and(|simplified| self.lookup.contains(simplified))
    }

    /// Configured codes in their original order
    #[must_use]
    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// A selection of disease labels, matching each code and its dotted sub-codes
#[derive(Debug, Clone)]
pub struct CodeSelection {
    codes: Vec<String>,
}

impl CodeSelection {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            codes: codes
                .into_iter()
                .filter_map(|c| {
                    let code: String = c.into();
                    full_code(&code).map(str::to_string)
                })
                .collect(),
        }
    }

    /// Whether a matrix label is selected: equal to a code, or `code.` followed by a sub-code
    #[must_use]
    pub fn matches_label(&self, label: &str) -> bool {
        self.codes.iter().any(|code| {
            label == code
                || label
                    .strip_prefix(code.as_str())
                    .is_some_and(|rest| rest.starts_with('.'))
        })
    }

    /// Selected codes that match none of the given labels
    #[must_use]
    pub fn unmatched<'a>(&'a self, labels: &[String]) -> Vec<&'a str> {
        self.codes
            .iter()
            .filter(|code| {
                let single = Self {
                    codes: vec![(*code).clone()],
                };
                !labels.iter().any(|label| single.matches_label(label))
            })
            .map(String::as_str)
            .collect()
    }
}

impl From<&DiseaseCodeSet> for CodeSelection {
    fn from(set: &DiseaseCodeSet) -> Self {
        Self::new(set.codes().iter().cloned())
    }
}
