use hesin_cooccur::bootstrap::{BootstrapConfig, resample_cohort};
use hesin_cooccur::cooccurrence::{CooccurrenceMatrix, aggregate, aggregate_all};
use hesin_cooccur::{CodeSelection, ColumnNames, Dataset, DatasetId, UNKNOWN_CODE};

use crate::utils::{episodes, scenario_episodes};

fn assert_matrix_invariants(matrix: &CooccurrenceMatrix) {
    assert!(matrix.is_symmetric());
    let n = matrix.dimension();
    for i in 0..n {
        for j in 0..n {
            let cell = matrix.count_at(i, j).unwrap();
            assert!(cell <= matrix.count_at(i, i).unwrap().min(matrix.count_at(j, j).unwrap()));
        }
    }
    let labels = matrix.labels();
    assert!(labels.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_scenario_matrix() {
    let dataset = Dataset::new(DatasetId::original("all"), scenario_episodes());
    let matrix = aggregate(&dataset, &ColumnNames::default()).unwrap().matrix;
    assert_eq!(matrix.labels(), &["I10", "J45"]);
    assert_eq!(matrix.get("I10", "I10"), Some(2));
    assert_eq!(matrix.get("I10", "J45"), Some(1));
    assert_eq!(matrix.get("J45", "I10"), Some(1));
    assert_eq!(matrix.get("J45", "J45"), Some(1));
}

#[test]
fn test_aggregation_is_idempotent() {
    let dataset = Dataset::new(
        DatasetId::original("all"),
        episodes(&[
            (1, 1, Some("I10.9")),
            (2, 1, Some("E11")),
            (3, 2, Some("E11.2")),
            (4, 3, None),
            (5, 3, Some("K21")),
        ]),
    );
    let columns = ColumnNames::default();
    let first = aggregate(&dataset, &columns).unwrap();
    let second = aggregate(&dataset, &columns).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.matrix.labels(), &["E11", "I10", "K21", UNKNOWN_CODE]);
    assert_matrix_invariants(&first.matrix);
}

#[test]
fn test_resample_matrices_keep_invariants_and_diagonal() {
    let cohort = Dataset::new(
        DatasetId::original("all"),
        episodes(&[
            (1, 1, Some("I10")),
            (2, 1, Some("E11")),
            (3, 1, Some("I10")),
            (4, 2, Some("J45")),
            (5, 2, Some("I10")),
            (6, 3, Some("E11")),
        ]),
    );
    let columns = ColumnNames::default();
    let original = aggregate(&cohort, &columns).unwrap().matrix;
    let config = BootstrapConfig::new(10).with_seed(3);
    let resamples: Vec<Dataset> = resample_cohort(&cohort, &config, &columns, &config.seeds())
        .into_iter()
        .map(Result::unwrap)
        .collect();

    for outcome in aggregate_all(&resamples, &columns) {
        let (id, aggregation) = outcome.unwrap();
        assert!(id.is_resample());
        assert_matrix_invariants(&aggregation.matrix);
        // permuting codes within a participant never changes who has which disease
        assert_eq!(aggregation.matrix, original);
    }
}

#[test]
fn test_empty_dataset_yields_zero_by_zero_matrix() {
    let dataset = Dataset::new(DatasetId::original("old_female"), episodes(&[]));
    let aggregation = aggregate(&dataset, &ColumnNames::default()).unwrap();
    assert!(aggregation.matrix.is_empty());
    assert_eq!(aggregation.matrix.to_record_batch().unwrap().num_columns(), 1);
}

#[test]
fn test_difference_and_restriction() {
    let columns = ColumnNames::default();
    let a = aggregate(
        &Dataset::new(DatasetId::original("a"), scenario_episodes()),
        &columns,
    )
    .unwrap()
    .matrix;
    let b = aggregate(
        &Dataset::new(
            DatasetId::original("b"),
            episodes(&[(1, 1, Some("I10")), (2, 2, Some("K21"))]),
        ),
        &columns,
    )
    .unwrap()
    .matrix;

    let diff = a.difference(&b);
    assert_eq!(diff.labels(), &["I10"]);
    assert_eq!(diff.get("I10", "I10"), Some(1));

    let union = CooccurrenceMatrix::union_labels(&[&a, &b]);
    assert_eq!(union, vec!["I10", "J45", "K21"]);
    let aligned = b.align_to(&union);
    assert_eq!(aligned.get("J45", "J45"), Some(0));
    assert_eq!(aligned.get("K21", "K21"), Some(1));

    let restricted = a.restrict_to(&CodeSelection::new(["J45"]));
    assert_eq!(restricted.labels(), &["J45"]);
}
