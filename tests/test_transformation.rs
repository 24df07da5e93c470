//! Transformation properties: balancing touches only the training
//! partition, splits are reproducible, deduplication is idempotent

mod common;

use polars::prelude::*;
use std::fs;
use tempfile::TempDir;

use churn_pipeline::artifacts;
use churn_pipeline::training::frame_to_xy;
use churn_pipeline::transformation::{
    drop_duplicates, minority_proportion, split_train_test, BalanceOutcome, DataTransformation,
};

/// Customer table where one row in twenty churns
fn rare_churn_frame() -> DataFrame {
    let mut frame = common::customer_frame();
    let churn: Vec<&str> = (0..frame.height())
        .map(|i| if (i % 200) % 20 == 0 { "Yes" } else { "No" })
        .collect();
    frame.with_column(Column::new("Churn".into(), churn)).unwrap();
    frame
}

#[test]
fn test_balancing_leaves_test_partition_alone() {
    let dir = TempDir::new().unwrap();
    let manager = common::manager(dir.path());
    let config = manager.data_transformation_config().unwrap();
    artifacts::write_csv(&mut rare_churn_frame(), &config.local_data_file).unwrap();
    let stage = DataTransformation::new(config.clone());

    let filtered = stage.filter_to_schema().unwrap();
    let deduped = stage.drop_duplicates(&filtered).unwrap();
    let (encoded, _) = stage.encode_categoricals(&deduped).unwrap();
    let (train, _) = stage.split_train_test(&encoded).unwrap();
    let test_before = fs::read(&config.test_data_file).unwrap();

    let (_, y_before, _) = frame_to_xy(&train, "Churn").unwrap();
    assert!(minority_proportion(&y_before) < 0.1);

    let outcome = stage.balance_if_needed().unwrap();
    match outcome {
        BalanceOutcome::Balanced { before, after, synthetic_rows } => {
            assert!(before < 0.1);
            assert!((after - 0.5).abs() < 1e-12);
            assert!(synthetic_rows > 0);
        }
        other => panic!("expected balancing, got {:?}", other),
    }

    assert_eq!(fs::read(&config.test_data_file).unwrap(), test_before);
    let balanced = artifacts::read_csv(&config.train_data_file).unwrap();
    let (_, y_after, _) = frame_to_xy(&balanced, "Churn").unwrap();
    assert!((minority_proportion(&y_after) - 0.5).abs() < 1e-12);
    assert!(balanced.height() > train.height());
}

#[test]
fn test_split_is_reproducible() {
    let dir = TempDir::new().unwrap();
    let manager = common::manager(dir.path());
    let config = manager.data_transformation_config().unwrap();
    let stage = DataTransformation::new(config.clone());
    let (frame, _) = drop_duplicates(&common::customer_frame()).unwrap();

    let (train, test) = stage.split_train_test(&frame).unwrap();
    assert_eq!(test.height(), 50);
    assert_eq!(train.height() + test.height(), frame.height());
    let train_a = fs::read(&config.train_data_file).unwrap();
    let test_a = fs::read(&config.test_data_file).unwrap();

    stage.split_train_test(&frame).unwrap();
    assert_eq!(fs::read(&config.train_data_file).unwrap(), train_a);
    assert_eq!(fs::read(&config.test_data_file).unwrap(), test_a);

    let (_, test_other_seed) = split_train_test(&frame, 0.25, 8).unwrap();
    assert!(!test.equals(&test_other_seed));
}

#[test]
fn test_dedup_rewrites_filtered_artifact() {
    let dir = TempDir::new().unwrap();
    let manager = common::manager(dir.path());
    let config = manager.data_transformation_config().unwrap();
    artifacts::write_csv(&mut common::customer_frame(), &config.local_data_file).unwrap();
    let stage = DataTransformation::new(config.clone());

    let filtered = stage.filter_to_schema().unwrap();
    assert_eq!(artifacts::read_csv(&config.filtered_data_file).unwrap().height(), 205);
    let deduped = stage.drop_duplicates(&filtered).unwrap();
    assert_eq!(deduped.height(), 200);
    assert_eq!(artifacts::read_csv(&config.filtered_data_file).unwrap().height(), 200);
}

#[test]
fn test_dedup_is_idempotent() {
    let (once, removed) = drop_duplicates(&common::customer_frame()).unwrap();
    assert_eq!(removed, 5);
    let (twice, removed_again) = drop_duplicates(&once).unwrap();
    assert_eq!(removed_again, 0);
    assert!(once.equals(&twice));
}
