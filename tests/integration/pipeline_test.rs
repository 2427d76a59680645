use hesin_cooccur::cooccurrence::aggregate_all;
use hesin_cooccur::pipeline::{Pipeline, PipelineInputs, aggregate_directory};
use hesin_cooccur::{
    BootstrapConfig, ColumnNames, Dataset, DatasetFormat, DatasetId, DiseaseCodeSet,
    OutputLayout, PipelineConfig, Stage, write_dataset,
};

use crate::utils::{
    age_spec, cleanup, scenario_attributes, scenario_episodes, temp_dir, write_codes,
};

fn scenario_inputs() -> PipelineInputs {
    PipelineInputs::new(
        scenario_episodes(),
        scenario_attributes(),
        DiseaseCodeSet::new(["I10", "J45"]),
    )
}

#[test]
fn test_end_to_end_in_memory() {
    let config = PipelineConfig::new("scenario").with_bootstrap(BootstrapConfig::new(4).with_seed(11));
    let pipeline = Pipeline::new(config).unwrap();
    let run = pipeline.run_in_memory(&scenario_inputs()).unwrap();

    assert!(run.failures.is_empty());
    assert_eq!(run.cohorts.len(), 1);
    assert_eq!(run.resamples.len(), 4);

    let matrix = run.matrix(&DatasetId::original("all")).unwrap();
    assert_eq!(matrix.get("I10", "I10"), Some(2));
    assert_eq!(matrix.get("I10", "J45"), Some(1));
    assert_eq!(matrix.get("J45", "I10"), Some(1));
    assert_eq!(matrix.get("J45", "J45"), Some(1));

    let iterations: Vec<u32> = run.resample_matrices("all").map(|(i, _)| i).collect();
    assert_eq!(iterations, vec![1, 2, 3, 4]);
    for (_, resample) in run.resample_matrices("all") {
        assert_eq!(resample, matrix);
    }
}

#[test]
fn test_demographic_cohorts_in_memory() {
    let config = PipelineConfig::new("buckets")
        .with_demographics(age_spec())
        .with_bootstrap(BootstrapConfig::new(2).with_seed(1));
    let pipeline = Pipeline::new(config).unwrap();
    let run = pipeline.run_in_memory(&scenario_inputs()).unwrap();

    let young = run.matrix(&DatasetId::original("young")).unwrap();
    assert_eq!(young.labels(), &["I10"]);
    assert_eq!(young.get("I10", "I10"), Some(1));

    let old = run.matrix(&DatasetId::original("old")).unwrap();
    assert_eq!(old.get("I10", "J45"), Some(1));

    let summary = run.summary(pipeline.config());
    assert_eq!(summary.cohorts.len(), 2);
    assert_eq!(summary.matrices, 6);
}

#[test]
fn test_failing_dataset_does_not_stop_siblings() {
    let good = Dataset::new(DatasetId::resample("all", 1), scenario_episodes());
    let broken = Dataset::new(
        DatasetId::resample("all", 2),
        scenario_episodes().project(&[0, 1]).unwrap(),
    );
    let outcomes = aggregate_all(&[good, broken], &ColumnNames::default());

    assert!(outcomes[0].is_ok());
    let failure = outcomes[1].as_ref().unwrap_err();
    assert_eq!(failure.unit, DatasetId::resample("all", 2));
    assert_eq!(failure.stage, Stage::Aggregate);
    assert!(failure.error.contains("diag_icd10"));
    assert!(failure.error.contains("iteration 2"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let mut config = PipelineConfig::new("bad");
    config.threads = Some(0);
    assert!(Pipeline::new(config).is_err());
}

#[test]
fn test_run_writes_layout_and_summary() {
    let dir = temp_dir("pipeline_run");
    let episodes_path = dir.join("hesin_diag.csv");
    let attributes_path = dir.join("participants.parquet");
    write_dataset(&episodes_path, &scenario_episodes()).unwrap();
    write_dataset(&attributes_path, &scenario_attributes()).unwrap();
    let codes_path = write_codes(&dir, &["I10", "J45"]);

    let config = PipelineConfig::new("exp")
        .with_inputs(&episodes_path, &attributes_path, &codes_path)
        .with_output_dir(dir.join("out"))
        .with_bootstrap(BootstrapConfig::new(2).with_seed(5));
    let run = Pipeline::new(config).unwrap().run().unwrap();
    assert!(run.failures.is_empty());
    assert!(run.resamples.is_empty());

    let layout = OutputLayout::new(&dir.join("out"), "exp", DatasetFormat::Csv);
    assert!(layout.dataset_file(&DatasetId::original("all")).is_file());
    for i in 1..=2 {
        assert!(layout.dataset_file(&DatasetId::resample("all", i)).is_file());
        assert!(layout.matrix_file(&DatasetId::resample("all", i)).is_file());
    }
    assert!(layout.matrix_file(&DatasetId::original("all")).is_file());

    let summary: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(layout.summary_file()).unwrap()).unwrap();
    assert_eq!(summary["experiment_name"], "exp");
    assert_eq!(summary["matrices"], 3);
    assert_eq!(summary["seed"], 5);

    cleanup(&dir);
}

#[tokio::test]
async fn test_aggregate_directory_matches_pipeline_matrices() {
    let dir = temp_dir("aggregate_dir");
    let episodes_path = dir.join("hesin_diag.csv");
    let attributes_path = dir.join("participants.csv");
    write_dataset(&episodes_path, &scenario_episodes()).unwrap();
    write_dataset(&attributes_path, &scenario_attributes()).unwrap();
    let codes_path = write_codes(&dir, &["I10", "J45"]);

    let config = PipelineConfig::new("exp")
        .with_inputs(&episodes_path, &attributes_path, &codes_path)
        .with_output_dir(dir.join("out"))
        .with_bootstrap(BootstrapConfig::new(3).with_seed(8));
    let pipeline = Pipeline::new(config).unwrap();
    let run = tokio::task::spawn_blocking(move || pipeline.run())
        .await
        .unwrap()
        .unwrap();

    let matrices_out = dir.join("recomputed");
    let result = aggregate_directory(
        &dir.join("out").join("exp"),
        Some(&matrices_out),
        &ColumnNames::default(),
    )
    .await
    .unwrap();

    assert!(result.failures.is_empty());
    assert_eq!(result.aggregations.len(), 4);
    for (id, aggregation) in &result.aggregations {
        assert_eq!(Some(&aggregation.matrix), run.matrix(id));
    }
    let layout = OutputLayout::at(&matrices_out, DatasetFormat::Csv);
    assert!(layout.matrix_file(&DatasetId::resample("all", 3)).is_file());

    cleanup(&dir);
}
