//! Disease co-occurrence matrix
//!
//! A square, symmetric matrix over sorted disease labels. Cell `[a][b]`
//! counts participants having both diseases; the diagonal `[a][a]` counts
//! participants having disease `a`.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, StringArray, UInt64Array};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, FieldRef, Schema};
use arrow::record_batch::RecordBatch;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::codes::CodeSelection;
use crate::error::{PipelineError, Result};
use crate::utils::arrow::downcast_array;

/// Name of the row label column in the tabular form
pub const LABEL_COLUMN: &str = "label";

/// One non-zero cell of the upper triangle, diagonal included
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooccurrencePair {
    pub disease_a: String,
    pub disease_b: String,
    pub participants: u64,
}

impl CooccurrencePair {
    fn fields() -> Vec<FieldRef> {
        vec![
            Arc::new(Field::new("disease_a", DataType::Utf8, false)),
            Arc::new(Field::new("disease_b", DataType::Utf8, false)),
            Arc::new(Field::new("participants", DataType::UInt64, false)),
        ]
    }
}

/// Symmetric participant-count matrix
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CooccurrenceMatrix {
    labels: Vec<String>,
    index: FxHashMap<String, usize>,
    /// Row-major, `labels.len()` squared
    counts: Vec<u64>,
}

fn index_labels(labels: &[String]) -> FxHashMap<String, usize> {
    labels
        .iter()
        .enumerate()
        .map(|(i, label)| (label.clone(), i))
        .collect()
}

impl CooccurrenceMatrix {
    /// All-zero matrix over the given labels, sorted and deduplicated
    #[must_use]
    pub fn zeros<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels
            .into_iter()
            .map(Into::into)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let n = labels.len();
        Self {
            index: index_labels(&labels),
            labels,
            counts: vec![0; n * n],
        }
    }

    /// Build from sorted unique labels and row-major counts
    pub fn from_parts(labels: Vec<String>, counts: Vec<u64>) -> Result<Self> {
        if labels.windows(2).any(|w| w[0] >= w[1]) {
            return Err(PipelineError::invalid_data(
                "matrix labels must be sorted and unique",
            ));
        }
        let n = labels.len();
        if counts.len() != n * n {
            return Err(PipelineError::invalid_data(format!(
                "matrix with {n} labels needs {} counts, got {}",
                n * n,
                counts.len()
            )));
        }
        Ok(Self {
            index: index_labels(&labels),
            labels,
            counts,
        })
    }

    /// Sorted disease labels
    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[must_use]
    pub fn position(&self, label: &str) -> Option<usize> {
        self.index.get(label).copied()
    }

    /// Count for a label pair; `None` when either label is absent
    #[must_use]
    pub fn get(&self, a: &str, b: &str) -> Option<u64> {
        let (i, j) = (self.position(a)?, self.position(b)?);
        Some(self.counts[i * self.dimension() + j])
    }

    /// Count at a row/column position
    #[must_use]
    pub fn count_at(&self, i: usize, j: usize) -> Option<u64> {
        let n = self.dimension();
        (i < n && j < n).then(|| self.counts[i * n + j])
    }

    /// Add one participant to a cell and its mirror
    pub(crate) fn increment(&mut self, i: usize, j: usize) {
        let n = self.dimension();
        self.counts[i * n + j] += 1;
        if i != j {
            self.counts[j * n + i] += 1;
        }
    }

    #[must_use]
    pub fn is_symmetric(&self) -> bool {
        let n = self.dimension();
        (0..n).all(|i| (i + 1..n).all(|j| self.counts[i * n + j] == self.counts[j * n + i]))
    }

    /// Row `i` as a slice
    #[must_use]
    pub fn row(&self, i: usize) -> Option<&[u64]> {
        let n = self.dimension();
        (i < n).then(|| &self.counts[i * n..(i + 1) * n])
    }

    /// Re-index onto `labels`, zero-filling labels this matrix lacks
    ///
    /// Labels present here but absent from `labels` are dropped.
    #[must_use]
    pub fn align_to(&self, labels: &[String]) -> Self {
        let mut aligned = Self::zeros(labels.iter().cloned());
        let n = aligned.dimension();
        let positions: Vec<Option<usize>> = aligned
            .labels
            .iter()
            .map(|label| self.position(label))
            .collect();
        for (i, pi) in positions.iter().enumerate() {
            let Some(pi) = pi else { continue };
            for (j, pj) in positions.iter().enumerate() {
                if let Some(pj) = pj {
                    aligned.counts[i * n + j] = self.counts[pi * self.dimension() + pj];
                }
            }
        }
        aligned
    }

    /// Sorted union of the labels of several matrices
    #[must_use]
    pub fn union_labels(matrices: &[&Self]) -> Vec<String> {
        matrices
            .iter()
            .flat_map(|m| m.labels.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Keep only labels matching a code selection
    #[must_use]
    pub fn restrict_to(&self, selection: &CodeSelection) -> Self {
        let kept: Vec<String> = self
            .labels
            .iter()
            .filter(|label| selection.matches_label(label))
            .cloned()
            .collect();
        self.align_to(&kept)
    }

    /// Element-wise `self - other` over the labels both matrices share
    #[must_use]
    pub fn difference(&self, other: &Self) -> DifferenceMatrix {
        let common: Vec<String> = self
            .labels
            .iter()
            .filter(|label| other.index.contains_key(label.as_str()))
            .cloned()
            .collect();
        let left = self.align_to(&common);
        let right = other.align_to(&common);
        let values = left
            .counts
            .iter()
            .zip(&right.counts)
            .map(|(a, b)| *a as i64 - *b as i64)
            .collect();
        DifferenceMatrix {
            labels: common,
            values,
        }
    }

    /// Tabular form: a `label` column followed by one `UInt64` column per label
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let n = self.dimension();
        let mut fields = Vec::with_capacity(n + 1);
        let mut columns: Vec<ArrayRef> = Vec::with_capacity(n + 1);

        fields.push(Field::new(LABEL_COLUMN, DataType::Utf8, false));
        columns.push(Arc::new(StringArray::from_iter_values(&self.labels)));

        for (j, label) in self.labels.iter().enumerate() {
            fields.push(Field::new(label, DataType::UInt64, false));
            let column: UInt64Array = (0..n).map(|i| self.counts[i * n + j]).collect();
            columns.push(Arc::new(column));
        }

        Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
    }

    /// Read back the tabular form written by [`Self::to_record_batch`]
    ///
    /// Count columns of any integer type are accepted, as CSV inference
    /// yields `Int64`.
    pub fn from_record_batch(batch: &RecordBatch) -> Result<Self> {
        let schema = batch.schema();
        let Some((label_field, count_fields)) = schema.fields().split_first() else {
            return Err(PipelineError::invalid_data("matrix table has no columns"));
        };
        if label_field.name() != LABEL_COLUMN {
            return Err(PipelineError::missing_columns(
                "co-occurrence matrix",
                vec![LABEL_COLUMN.to_string()],
            ));
        }

        let row_labels = cast(batch.column(0), &DataType::Utf8)?;
        let row_labels = downcast_array::<StringArray>(&row_labels, LABEL_COLUMN, "string")?;
        let labels: Vec<String> = count_fields.iter().map(|f| f.name().clone()).collect();

        if row_labels.len() != labels.len()
            || (0..row_labels.len()).any(|i| row_labels.is_null(i) || row_labels.value(i) != labels[i])
        {
            return Err(PipelineError::invalid_data(
                "matrix row labels do not match its column labels",
            ));
        }

        let n = labels.len();
        let mut counts = vec![0_u64; n * n];
        for (j, column) in batch.columns().iter().skip(1).enumerate() {
            let values = cast(column, &DataType::UInt64)?;
            let values = downcast_array::<UInt64Array>(&values, &labels[j], "unsigned integer")?;
            if values.null_count() > 0 {
                return Err(PipelineError::invalid_data(format!(
                    "matrix column '{}' has missing counts",
                    labels[j]
                )));
            }
            for (i, value) in values.values().iter().enumerate() {
                counts[i * n + j] = *value;
            }
        }

        Self::from_parts(labels, counts)
    }

    /// Non-zero upper-triangle cells, diagonal included, in label order
    #[must_use]
    pub fn pairs(&self) -> Vec<CooccurrencePair> {
        let n = self.dimension();
        (0..n)
            .flat_map(|i| (i..n).map(move |j| (i, j)))
            .filter(|&(i, j)| self.counts[i * n + j] > 0)
            .map(|(i, j)| CooccurrencePair {
                disease_a: self.labels[i].clone(),
                disease_b: self.labels[j].clone(),
                participants: self.counts[i * n + j],
            })
            .collect()
    }

    /// Long-format table of [`Self::pairs`]
    pub fn to_pairs(&self) -> Result<RecordBatch> {
        let pairs = self.pairs();
        Ok(serde_arrow::to_record_batch(&CooccurrencePair::fields(), &pairs)?)
    }
}

impl fmt::Display for CooccurrenceMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{0}x{0} co-occurrence matrix", self.dimension())
    }
}

/// Signed difference of two matrices over their common labels
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DifferenceMatrix {
    labels: Vec<String>,
    values: Vec<i64>,
}

impl DifferenceMatrix {
    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn get(&self, a: &str, b: &str) -> Option<i64> {
        let i = self.labels.binary_search_by(|l| l.as_str().cmp(a)).ok()?;
        let j = self.labels.binary_search_by(|l| l.as_str().cmp(b)).ok()?;
        Some(self.values[i * self.dimension() + j])
    }
}
