//! Offline validation against the declared schema

mod common;

use polars::prelude::*;
use std::fs;
use tempfile::TempDir;

use churn_pipeline::artifacts;
use churn_pipeline::validation::{ColumnCheck, DataValidation};

fn validate(frame: &mut DataFrame) -> (TempDir, churn_pipeline::validation::ValidationReport) {
    let dir = TempDir::new().unwrap();
    let manager = common::manager(dir.path());
    let config = manager.data_validation_config().unwrap();
    artifacts::write_csv(frame, &config.local_data_file).unwrap();
    let report = DataValidation::new(config).validate_all_columns().unwrap();
    (dir, report)
}

#[test]
fn test_conforming_dataset_passes() {
    let (dir, report) = validate(&mut common::customer_frame());
    assert!(report.passed());
    assert_eq!(
        report.message(),
        "gender validated along with datatype\n\
         SeniorCitizen validated along with datatype\n\
         tenure validated along with datatype\n\
         Contract validated along with datatype\n\
         MonthlyCharges validated along with datatype\n\
         Churn validated along with datatype\n"
    );

    let root = dir.path().join("artifacts/data_validation");
    assert_eq!(
        fs::read_to_string(root.join("status.txt")).unwrap(),
        "Validation status: true"
    );
    assert_eq!(
        fs::read_to_string(root.join("status_message.txt")).unwrap(),
        report.message()
    );
}

#[test]
fn test_missing_column_fails_gate() {
    let mut frame = common::customer_frame().drop("tenure").unwrap();
    let (dir, report) = validate(&mut frame);
    assert!(!report.passed());
    assert!(report.message().contains("tenure not validated"));
    let failures: Vec<&str> = report.failures().map(|c| c.column.as_str()).collect();
    assert_eq!(failures, vec!["tenure"]);

    let status = dir.path().join("artifacts/data_validation/status.txt");
    assert!(!artifacts::read_status(&status).unwrap());
}

#[test]
fn test_wrong_type_fails_gate() {
    let mut frame = common::customer_frame();
    let as_text: Vec<String> = frame
        .column("tenure")
        .unwrap()
        .as_materialized_series()
        .i64()
        .unwrap()
        .into_iter()
        .map(|v| format!("{} months", v.unwrap()))
        .collect();
    frame.with_column(Column::new("tenure".into(), as_text)).unwrap();

    let (_dir, report) = validate(&mut frame);
    assert!(!report.passed());
    let tenure = report.columns().iter().find(|c| c.column == "tenure").unwrap();
    assert_eq!(tenure.check, ColumnCheck::TypeMismatch);
    assert!(report.message().contains("tenure validated without datatype"));
}

#[test]
fn test_extra_columns_are_ignored() {
    // customerID is not declared
    let (_dir, report) = validate(&mut common::customer_frame());
    assert!(report.columns().iter().all(|c| c.column != "customerID"));
}
