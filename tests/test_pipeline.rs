//! End-to-end offline run followed by serving from the persisted artifacts

mod common;

use churn_pipeline::artifacts;
use churn_pipeline::evaluation::EvaluationRecord;
use churn_pipeline::ingestion::{IngestionOutcome, LocalFileSource};
use churn_pipeline::pipeline::{StageName, StageReport, TrainingPipeline};
use churn_pipeline::prediction::{FieldValue, ModelPredictor, Record, RequestState};
use churn_pipeline::tracking::LocalTracker;
use churn_pipeline::training::BestModelArtifact;
use churn_pipeline::transformation::BalanceOutcome;
use churn_pipeline::PipelineError;
use tempfile::TempDir;

fn customer(gender: &str, tenure: i64, contract: &str) -> Record {
    let mut record = Record::new();
    record.insert("gender".to_string(), FieldValue::Text(gender.to_string()));
    record.insert("SeniorCitizen".to_string(), FieldValue::Integer(0));
    record.insert("tenure".to_string(), FieldValue::Integer(tenure));
    record.insert("Contract".to_string(), FieldValue::Text(contract.to_string()));
    record.insert("MonthlyCharges".to_string(), FieldValue::Float(70.35));
    record
}

#[test]
fn test_full_run_then_predict() {
    let dir = TempDir::new().unwrap();
    let manager = common::manager(dir.path());
    let source = common::source_file(dir.path());

    let mut pipeline = TrainingPipeline::new(manager.clone())
        .with_source(Box::new(LocalFileSource::new(&source)));
    let report = pipeline.run().unwrap();

    assert!(matches!(report.ingestion, IngestionOutcome::Downloaded { .. }));
    assert!(report.validation_message.contains("tenure validated along with datatype"));

    let t = &report.transformation;
    assert_eq!(t.input_rows, 205);
    assert_eq!(t.duplicates_removed, 5);
    assert_eq!(t.test_rows, 50);
    assert!(matches!(t.balance, BalanceOutcome::Balanced { .. }));

    // 1 logistic + 2 trees + 1 knn
    assert_eq!(report.training.trials.len(), 4);
    let best_recall = report
        .training
        .trials
        .iter()
        .map(|trial| trial.metrics.recall)
        .fold(f64::MIN, f64::max);
    assert_eq!(report.training.best_recall, best_recall);

    let artifact = BestModelArtifact::load(&report.training.model_path).unwrap();
    assert_eq!(artifact.target_column, "Churn");
    assert_eq!(
        artifact.feature_names,
        vec!["gender", "SeniorCitizen", "tenure", "Contract", "MonthlyCharges"]
    );

    let metrics_path = manager.model_evaluation_config().unwrap().metric_file_name;
    let saved: EvaluationRecord = artifacts::load_json(&metrics_path).unwrap();
    assert!((saved.recall - report.evaluation.recall).abs() < 1e-12);
    assert!((saved.fbeta - report.evaluation.fbeta).abs() < 1e-12);
    assert!((0.0..=1.0).contains(&saved.recall));

    let tracking = manager.tracking_config().unwrap();
    let runs = LocalTracker::new(&tracking.local_dir, &tracking.experiment_name)
        .load_runs()
        .unwrap();
    assert_eq!(runs.len(), 4);

    let predictor = ModelPredictor::new(manager.model_prediction_config().unwrap());
    let outcome = predictor.predict(&customer("Female", 2, "Month-to-month"));
    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(outcome.state, RequestState::Predicted);
    let label = outcome.label.unwrap();
    assert!(label == "Yes" || label == "No");
    assert_eq!(outcome.churn, Some(label == "Yes"));
}

#[test]
fn test_unseen_category_fails_softly() {
    let dir = TempDir::new().unwrap();
    let manager = common::manager(dir.path());
    let source = common::source_file(dir.path());
    TrainingPipeline::new(manager.clone())
        .with_source(Box::new(LocalFileSource::new(&source)))
        .run()
        .unwrap();

    let predictor = ModelPredictor::new(manager.model_prediction_config().unwrap());
    let outcome = predictor.predict(&customer("Female", 2, "Three year"));
    assert!(!outcome.success);
    assert_eq!(outcome.state, RequestState::Failed);
    assert!(outcome.label.is_none());
    assert!(outcome.message.contains("Three year"), "{}", outcome.message);
}

#[test]
fn test_stale_status_marker_does_not_gate_requests() {
    let dir = TempDir::new().unwrap();
    let manager = common::manager(dir.path());
    let source = common::source_file(dir.path());
    TrainingPipeline::new(manager.clone())
        .with_source(Box::new(LocalFileSource::new(&source)))
        .run()
        .unwrap();

    let config = manager.model_prediction_config().unwrap();
    artifacts::write_status(&config.status_file, false).unwrap();
    assert!(!artifacts::read_status(&config.status_file).unwrap());

    let predictor = ModelPredictor::new(config);
    let outcome = predictor.predict(&customer("Male", 40, "One year"));
    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(outcome.state, RequestState::Predicted);
}

#[test]
fn test_concurrent_requests_keep_their_own_gate() {
    let dir = TempDir::new().unwrap();
    let manager = common::manager(dir.path());
    let source = common::source_file(dir.path());
    TrainingPipeline::new(manager.clone())
        .with_source(Box::new(LocalFileSource::new(&source)))
        .run()
        .unwrap();

    let predictor = ModelPredictor::new(manager.model_prediction_config().unwrap());
    let valid = customer("Female", 12, "Month-to-month");
    let mut rejected = customer("Male", 3, "One year");
    rejected.remove("tenure");

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let predictor = &predictor;
                let record = if i % 2 == 0 { &valid } else { &rejected };
                scope.spawn(move || (i, predictor.predict(record)))
            })
            .collect();

        for handle in handles {
            let (i, outcome) = handle.join().unwrap();
            if i % 2 == 0 {
                assert!(outcome.success, "request {}: {}", i, outcome.message);
                assert_eq!(outcome.state, RequestState::Predicted);
            } else {
                assert!(!outcome.success, "request {} should be rejected", i);
                assert_eq!(outcome.state, RequestState::Rejected);
                assert!(outcome.message.contains("tenure not validated"), "{}", outcome.message);
            }
        }
    });
}

#[test]
fn test_predict_without_model() {
    let dir = TempDir::new().unwrap();
    let manager = common::manager(dir.path());
    let source = common::source_file(dir.path());
    let mut pipeline = TrainingPipeline::new(manager.clone())
        .with_source(Box::new(LocalFileSource::new(&source)));
    for stage in [StageName::Ingestion, StageName::Validation, StageName::Transformation] {
        pipeline.run_stage(stage).unwrap();
    }

    let predictor = ModelPredictor::new(manager.model_prediction_config().unwrap());
    let outcome = predictor.predict(&customer("Male", 40, "Two year"));
    assert!(!outcome.success);
    assert!(outcome.message.contains("train the model first"));
}

#[test]
fn test_stages_one_by_one() {
    let dir = TempDir::new().unwrap();
    let manager = common::manager(dir.path());
    let source = common::source_file(dir.path());
    let mut pipeline = TrainingPipeline::new(manager.clone())
        .with_source(Box::new(LocalFileSource::new(&source)));

    // evaluation before training has nothing to score
    assert!(matches!(
        pipeline.run_stage(StageName::Evaluation),
        Err(PipelineError::EvaluationError(_))
    ));

    assert!(matches!(
        pipeline.run_stage(StageName::Ingestion).unwrap(),
        StageReport::Ingestion(IngestionOutcome::Downloaded { .. })
    ));
    // second fetch is skipped
    assert!(matches!(
        pipeline.run_stage(StageName::Ingestion).unwrap(),
        StageReport::Ingestion(IngestionOutcome::AlreadyPresent { .. })
    ));
    match pipeline.run_stage(StageName::Validation).unwrap() {
        StageReport::Validation { passed, .. } => assert!(passed),
        other => panic!("unexpected report {:?}", other),
    }
    assert!(matches!(
        pipeline.run_stage(StageName::Transformation).unwrap(),
        StageReport::Transformation(_)
    ));
    assert!(matches!(
        pipeline.run_stage(StageName::Training).unwrap(),
        StageReport::Training(_)
    ));
    assert!(matches!(
        pipeline.run_stage(StageName::Evaluation).unwrap(),
        StageReport::Evaluation(_)
    ));
}

#[test]
fn test_failed_validation_stops_run() {
    let dir = TempDir::new().unwrap();
    let manager = common::manager(dir.path());

    let mut broken = common::customer_frame().drop("tenure").unwrap();
    let source = dir.path().join("source").join("broken.csv");
    artifacts::write_csv(&mut broken, &source).unwrap();

    let err = TrainingPipeline::new(manager.clone())
        .with_source(Box::new(LocalFileSource::new(&source)))
        .run()
        .unwrap_err();
    assert!(matches!(err, PipelineError::TransformationError(_)));

    let status = manager.data_validation_config().unwrap().status_file;
    assert!(!artifacts::read_status(&status).unwrap());
    let train = manager.data_transformation_config().unwrap().train_data_file;
    assert!(!train.exists());
}
