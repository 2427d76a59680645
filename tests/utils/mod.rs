#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use arrow::array::{Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use hesin_cooccur::filter::{Bucket, DemographicDimension, DemographicFilterSpec, ExactValue};

static DIR_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// A fresh, empty directory under the system temp dir
#[must_use]
pub fn temp_dir(label: &str) -> PathBuf {
    let n = DIR_COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!(
        "hesin_cooccur_{label}_{}_{n}",
        std::process::id()
    ));
    if dir.exists() {
        std::fs::remove_dir_all(&dir).unwrap();
    }
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Remove a test directory, ignoring errors
pub fn cleanup(dir: &Path) {
    let _ = std::fs::remove_dir_all(dir);
}

/// Episode table: `(record_id, participant_id, code)`
#[must_use]
pub fn episodes(rows: &[(i64, i64, Option<&str>)]) -> RecordBatch {
    let schema = Schema::new(vec![
        Field::new("ins_index", DataType::Int64, false),
        Field::new("eid", DataType::Int64, false),
        Field::new("diag_icd10", DataType::Utf8, true),
    ]);
    RecordBatch::try_new(
        Arc::new(schema),
        vec![
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.0))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.1))),
            Arc::new(rows.iter().map(|r| r.2).collect::<StringArray>()),
        ],
    )
    .unwrap()
}

/// Attribute table: `(participant_id, age, sex)`
#[must_use]
pub fn attributes(rows: &[(i64, i64, i64)]) -> RecordBatch {
    let schema = Schema::new(vec![
        Field::new("eid", DataType::Int64, false),
        Field::new("age", DataType::Int64, true),
        Field::new("sex", DataType::Int64, true),
    ]);
    RecordBatch::try_new(
        Arc::new(schema),
        vec![
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.0))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.1))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.2))),
        ],
    )
    .unwrap()
}

/// Two participants, one code each, used by the end-to-end scenario
#[must_use]
pub fn scenario_episodes() -> RecordBatch {
    episodes(&[
        (1, 1, Some("I10")),
        (2, 1, Some("I10")),
        (3, 2, Some("I10")),
        (4, 2, Some("J45")),
    ])
}

#[must_use]
pub fn scenario_attributes() -> RecordBatch {
    attributes(&[(1, 45, 0), (2, 65, 1)])
}

/// Age buckets `young` [40, 50] and `old` [61, 69]
#[must_use]
pub fn age_spec() -> DemographicFilterSpec {
    DemographicFilterSpec::new(vec![DemographicDimension::new(
        "age",
        vec![Bucket::range("young", 40.0, 50.0), Bucket::range("old", 61.0, 69.0)],
    )])
}

/// Age buckets crossed with sex
#[must_use]
pub fn age_sex_spec() -> DemographicFilterSpec {
    let mut spec = age_spec();
    spec.dimensions.push(DemographicDimension::new(
        "sex",
        vec![
            Bucket::exact("female", ExactValue::Int(0)),
            Bucket::exact("male", ExactValue::Int(1)),
        ],
    ));
    spec
}

/// Values of a column rendered as strings, nulls as `None`
#[must_use]
pub fn column_strings(batch: &RecordBatch, name: &str) -> Vec<Option<String>> {
    let column = batch.column(batch.schema().index_of(name).unwrap());
    let strings = arrow::compute::cast(column, &DataType::Utf8).unwrap();
    let strings = strings.as_any().downcast_ref::<StringArray>().unwrap();
    (0..strings.len())
        .map(|i| strings.is_valid(i).then(|| strings.value(i).to_string()))
        .collect()
}

/// Write a disease code set file
pub fn write_codes(dir: &Path, codes: &[&str]) -> PathBuf {
    let path = dir.join("codes.json");
    let json = serde_json::json!({ "name": "test_codes", "codes": codes });
    std::fs::write(&path, json.to_string()).unwrap();
    path
}
