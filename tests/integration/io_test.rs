use hesin_cooccur::async_io::load_datasets;
use hesin_cooccur::cooccurrence::{CooccurrenceMatrix, aggregate};
use hesin_cooccur::utils::io::{discover_experiment, read_csv, write_csv};
use hesin_cooccur::{
    ColumnNames, Dataset, DatasetFormat, DatasetId, OutputLayout, discover_datasets, read_dataset,
    write_dataset,
};

use crate::utils::{cleanup, column_strings, scenario_episodes, temp_dir};

#[test]
fn test_csv_and_parquet_round_trip() {
    let dir = temp_dir("round_trip");
    let batch = scenario_episodes();

    for name in ["cohort.csv", "cohort.parquet"] {
        let path = dir.join(name);
        write_dataset(&path, &batch).unwrap();
        let back = read_dataset(&path).unwrap();
        assert_eq!(back.num_rows(), batch.num_rows());
        for column in ["ins_index", "eid", "diag_icd10"] {
            assert_eq!(column_strings(&back, column), column_strings(&batch, column));
        }
    }

    cleanup(&dir);
}

#[test]
fn test_matrix_survives_csv() {
    let dir = temp_dir("matrix_csv");
    let matrix = aggregate(
        &Dataset::new(DatasetId::original("all"), scenario_episodes()),
        &ColumnNames::default(),
    )
    .unwrap()
    .matrix;

    let path = dir.join("all_disease_connection_matrix.csv");
    write_csv(&path, &matrix.to_record_batch().unwrap()).unwrap();
    let back = CooccurrenceMatrix::from_record_batch(&read_csv(&path).unwrap()).unwrap();
    assert_eq!(back, matrix);

    cleanup(&dir);
}

#[test]
fn test_discover_datasets_follows_layout() {
    let dir = temp_dir("discover");
    let layout = OutputLayout::at(&dir, DatasetFormat::Csv);
    let batch = scenario_episodes();
    let ids = [
        DatasetId::original("young"),
        DatasetId::original("old"),
        DatasetId::resample("young", 1),
        DatasetId::resample("young", 2),
        DatasetId::resample("old", 1),
    ];
    for id in &ids {
        write_dataset(&layout.dataset_file(id), &batch).unwrap();
    }
    std::fs::write(layout.filtered_dir().join("notes.txt"), "ignored").unwrap();

    let originals = discover_datasets(&layout.filtered_dir()).unwrap();
    assert_eq!(
        originals.iter().map(|(id, _)| id.clone()).collect::<Vec<_>>(),
        vec![DatasetId::original("old"), DatasetId::original("young")]
    );

    let all = discover_experiment(&dir).unwrap();
    let mut expected = ids.to_vec();
    expected.sort();
    assert_eq!(all.iter().map(|(id, _)| id.clone()).collect::<Vec<_>>(), expected);

    cleanup(&dir);
}

#[tokio::test]
async fn test_async_load_reports_broken_file_as_unit_failure() {
    let dir = temp_dir("async_load");
    let good = dir.join("good.parquet");
    let bad = dir.join("bad.parquet");
    write_dataset(&good, &scenario_episodes()).unwrap();
    std::fs::write(&bad, "not a parquet file").unwrap();

    let outcomes = load_datasets(vec![
        (DatasetId::original("bad"), bad),
        (DatasetId::original("good"), good),
    ])
    .await;

    assert_eq!(outcomes.len(), 2);
    let failure = outcomes[0].as_ref().unwrap_err();
    assert_eq!(failure.unit, DatasetId::original("bad"));
    let loaded = outcomes[1].as_ref().unwrap();
    assert_eq!(loaded.num_rows(), 4);

    cleanup(&dir);
}
