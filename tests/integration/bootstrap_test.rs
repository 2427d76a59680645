use std::collections::BTreeMap;

use hesin_cooccur::bootstrap::{BootstrapConfig, SeedSequence, resample_cohort};
use hesin_cooccur::{ColumnNames, Dataset, DatasetId};

use crate::utils::{column_strings, episodes};

fn cohort() -> Dataset {
    let batch = episodes(&[
        (1, 1, Some("I10")),
        (2, 1, Some("E11")),
        (3, 2, Some("J45")),
        (4, 1, None),
        (5, 2, Some("I10")),
        (6, 3, Some("K21")),
        (7, 2, Some("J45")),
        (8, 1, Some("M54")),
    ]);
    Dataset::new(DatasetId::original("young_male"), batch)
}

/// Sorted codes per participant
fn code_multisets(dataset: &Dataset) -> BTreeMap<String, Vec<Option<String>>> {
    let ids = column_strings(&dataset.batch, "eid");
    let codes = column_strings(&dataset.batch, "diag_icd10");
    let mut out: BTreeMap<String, Vec<Option<String>>> = BTreeMap::new();
    for (id, code) in ids.into_iter().zip(codes) {
        out.entry(id.unwrap()).or_default().push(code);
    }
    for codes in out.values_mut() {
        codes.sort();
    }
    out
}

#[test]
fn test_resamples_preserve_participant_code_multisets() {
    let config = BootstrapConfig::new(25).with_seed(2024);
    let original = cohort();
    let expected = code_multisets(&original);

    let outcomes = resample_cohort(&original, &config, &ColumnNames::default(), &config.seeds());
    assert_eq!(outcomes.len(), 25);
    for outcome in outcomes {
        let resample = outcome.unwrap();
        assert_eq!(resample.num_rows(), original.num_rows());
        assert_eq!(code_multisets(&resample), expected);
        assert_eq!(
            column_strings(&resample.batch, "eid"),
            column_strings(&original.batch, "eid")
        );
    }
}

#[test]
fn test_resamples_differ_across_iterations() {
    let config = BootstrapConfig::new(20).with_seed(7);
    let outcomes = resample_cohort(&cohort(), &config, &ColumnNames::default(), &config.seeds());
    let orders: Vec<Vec<Option<String>>> = outcomes
        .iter()
        .map(|o| column_strings(&o.as_ref().unwrap().batch, "diag_icd10"))
        .collect();
    let distinct = orders
        .iter()
        .collect::<std::collections::BTreeSet<_>>()
        .len();
    assert!(distinct > 1, "all 20 resamples were identical");
}

#[test]
fn test_same_seed_reproduces_resamples() {
    let config = BootstrapConfig::new(5).with_seed(99);
    let columns = ColumnNames::default();
    let first = resample_cohort(&cohort(), &config, &columns, &SeedSequence::seeded(99));
    let second = resample_cohort(&cohort(), &config, &columns, &SeedSequence::seeded(99));
    for (a, b) in first.into_iter().zip(second) {
        assert_eq!(a.unwrap().batch, b.unwrap().batch);
    }
}

/// Code order of participant 1 (four records, all codes distinct) in every resample
fn participant_orders(seeds: &SeedSequence) -> Vec<Vec<Option<String>>> {
    let config = BootstrapConfig::new(20);
    resample_cohort(&cohort(), &config, &ColumnNames::default(), seeds)
        .into_iter()
        .map(|outcome| {
            let resample = outcome.unwrap();
            let ids = column_strings(&resample.batch, "eid");
            let codes = column_strings(&resample.batch, "diag_icd10");
            ids.into_iter()
                .zip(codes)
                .filter(|(id, _)| id.as_deref() == Some("1"))
                .map(|(_, code)| code)
                .collect()
        })
        .collect()
}

#[test]
fn test_different_seeds_give_different_assignments() {
    let first = participant_orders(&SeedSequence::seeded(1));
    let second = participant_orders(&SeedSequence::seeded(2));
    assert_eq!(first.len(), second.len());
    assert_ne!(first, second, "seeds 1 and 2 produced identical resamples");
}

#[test]
fn test_unseeded_runs_give_different_assignments() {
    // 20 resamples of 24 possible orders each; a full match is vanishingly unlikely
    let first = participant_orders(&SeedSequence::entropy());
    let second = participant_orders(&SeedSequence::entropy());
    assert_eq!(first.len(), 20);
    assert_ne!(first, second, "two unseeded runs produced identical resamples");
}

#[test]
fn test_resample_keeps_only_configured_fields() {
    let config = BootstrapConfig::new(1)
        .with_seed(1)
        .with_fields(["eid", "diag_icd10"]);
    let outcomes = resample_cohort(&cohort(), &config, &ColumnNames::default(), &config.seeds());
    let resample = outcomes.into_iter().next().unwrap().unwrap();
    assert_eq!(resample.batch.num_columns(), 2);
    assert_eq!(resample.id, DatasetId::resample("young_male", 1));
}

#[test]
fn test_empty_cohort_resamples_are_empty() {
    let empty = Dataset::new(DatasetId::original("old_female"), episodes(&[]));
    let config = BootstrapConfig::new(3).with_seed(5);
    let outcomes = resample_cohort(&empty, &config, &ColumnNames::default(), &config.seeds());
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.iter().all(|o| o.as_ref().unwrap().is_empty()));
}
