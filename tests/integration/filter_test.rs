use std::sync::Arc;

use arrow::array::{ArrayRef, Int64Array};
use arrow::datatypes::{DataType, Field};
use hesin_cooccur::filter::{CodeFilterMethod, DemographicDimension, DemographicFilterSpec, filter_records};
use hesin_cooccur::{Bucket, ColumnNames, DiseaseCodeSet, PipelineError};

use crate::utils::{age_sex_spec, age_spec, attributes, column_strings, episodes};

fn bucket_episodes() -> arrow::record_batch::RecordBatch {
    episodes(&[
        (1, 1, Some("I10")),
        (2, 1, Some("E11.9")),
        (3, 2, Some("I10.1")),
        (4, 3, Some("I10")),
        (5, 3, Some("J45")),
        (6, 4, Some("I10")),
    ])
}

fn bucket_attributes() -> arrow::record_batch::RecordBatch {
    // participant 3 is 55 and falls in no bucket
    attributes(&[(1, 45, 0), (2, 65, 1), (3, 55, 0), (4, 40, 1)])
}

#[test]
fn test_bucket_scenario_partitions_by_age() {
    let code_set = DiseaseCodeSet::new(["I10"]);
    let output = filter_records(
        &bucket_episodes(),
        &bucket_attributes(),
        &code_set,
        CodeFilterMethod::Keep,
        Some(&age_spec()),
        &ColumnNames::default(),
    )
    .unwrap();

    let names: Vec<&str> = output.cohorts.iter().map(|c| c.id.cohort.as_str()).collect();
    assert_eq!(names, vec!["young", "old"]);

    let young = output.cohort("young").unwrap();
    assert_eq!(
        column_strings(&young.batch, "ins_index"),
        vec![Some("1".to_string()), Some("6".to_string())]
    );
    let old = output.cohort("old").unwrap();
    assert_eq!(column_strings(&old.batch, "eid"), vec![Some("2".to_string())]);

    // every record in a cohort satisfies both predicates
    for cohort in &output.cohorts {
        for code in column_strings(&cohort.batch, "diag_icd10").into_iter().flatten() {
            assert!(code_set.contains_code(&code));
        }
    }
}

#[test]
fn test_buckets_read_attribute_when_episodes_share_column_name() {
    // episodes carry their own `age` column that must not drive the buckets
    let base = episodes(&[(1, 1, Some("I10")), (2, 2, Some("I10"))]);
    let mut fields: Vec<Field> = base.schema().fields().iter().map(|f| f.as_ref().clone()).collect();
    fields.push(Field::new("age", DataType::Int64, false));
    let mut columns: Vec<ArrayRef> = base.columns().to_vec();
    columns.push(Arc::new(Int64Array::from(vec![99, 99])));
    let episodes = arrow::record_batch::RecordBatch::try_new(
        Arc::new(arrow::datatypes::Schema::new(fields)),
        columns,
    )
    .unwrap();

    let output = filter_records(
        &episodes,
        &attributes(&[(1, 45, 0), (2, 65, 1)]),
        &DiseaseCodeSet::new(["I10"]),
        CodeFilterMethod::Keep,
        Some(&age_spec()),
        &ColumnNames::default(),
    )
    .unwrap();

    let young = output.cohort("young").unwrap();
    assert_eq!(column_strings(&young.batch, "eid"), vec![Some("1".to_string())]);
    assert_eq!(column_strings(&young.batch, "age_attr"), vec![Some("45".to_string())]);
    let old = output.cohort("old").unwrap();
    assert_eq!(column_strings(&old.batch, "eid"), vec![Some("2".to_string())]);
}

#[test]
fn test_drop_method_excludes_matching_codes() {
    let output = filter_records(
        &bucket_episodes(),
        &bucket_attributes(),
        &DiseaseCodeSet::new(["I10"]),
        CodeFilterMethod::Drop,
        None,
        &ColumnNames::default(),
    )
    .unwrap();

    assert_eq!(output.cohorts.len(), 1);
    let all = &output.cohorts[0];
    assert_eq!(all.id.cohort, "all");
    assert_eq!(
        column_strings(&all.batch, "diag_icd10"),
        vec![Some("E11.9".to_string()), Some("J45".to_string())]
    );
    assert_eq!(output.report.code.retained, 2);
}

#[test]
fn test_cartesian_product_emits_empty_cohorts() {
    let output = filter_records(
        &bucket_episodes(),
        &bucket_attributes(),
        &DiseaseCodeSet::new(["I10"]),
        CodeFilterMethod::Keep,
        Some(&age_sex_spec()),
        &ColumnNames::default(),
    )
    .unwrap();

    let counts: Vec<(&str, usize)> = output
        .cohorts
        .iter()
        .map(|c| (c.id.cohort.as_str(), c.num_rows()))
        .collect();
    assert_eq!(
        counts,
        vec![("young_female", 1), ("young_male", 1), ("old_female", 0), ("old_male", 1)]
    );

    let empty = output.cohort("old_female").unwrap();
    assert!(empty.is_empty());
    assert_eq!(empty.batch.schema(), output.cohort("old_male").unwrap().batch.schema());
}

#[test]
fn test_unmatched_participants_are_reported() {
    let output = filter_records(
        &bucket_episodes(),
        &attributes(&[(1, 45, 0)]),
        &DiseaseCodeSet::new(["I10", "J45"]),
        CodeFilterMethod::Keep,
        None,
        &ColumnNames::default(),
    )
    .unwrap();

    assert_eq!(output.report.join.joined_records, 1);
    assert_eq!(output.report.join.unmatched_records, 4);
    assert_eq!(output.report.join.unmatched_participants, 3);
}

#[test]
fn test_missing_attribute_field_is_fatal_and_named() {
    let spec = DemographicFilterSpec::new(vec![DemographicDimension::new(
        "bmi",
        vec![Bucket::range("normal", 18.5, 25.0)],
    )]);
    let err = filter_records(
        &bucket_episodes(),
        &bucket_attributes(),
        &DiseaseCodeSet::new(["I10"]),
        CodeFilterMethod::Keep,
        Some(&spec),
        &ColumnNames::default(),
    )
    .unwrap_err();

    match err {
        PipelineError::MissingColumns { dataset, columns } => {
            assert_eq!(dataset, "attributes");
            assert_eq!(columns, vec!["bmi".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_duplicate_record_ids_are_counted() {
    let data = episodes(&[(1, 1, Some("I10")), (1, 1, Some("J45")), (2, 2, Some("I10"))]);
    let output = filter_records(
        &data,
        &bucket_attributes(),
        &DiseaseCodeSet::new(["I10"]),
        CodeFilterMethod::Keep,
        None,
        &ColumnNames::default(),
    )
    .unwrap();
    assert_eq!(output.report.duplicate_record_ids, 1);
    assert_eq!(output.cohorts[0].num_rows(), 2);
}
