//! Shared fixtures for the integration tests

#![allow(dead_code)]

use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

use churn_pipeline::artifacts;
use churn_pipeline::config::ConfigurationManager;

pub const CONTRACTS: [&str; 3] = ["Month-to-month", "One year", "Two year"];

/// Synthetic customer table: 200 distinct customers followed by 5 exact
/// duplicates. Short month-to-month customers churn (about 11%).
pub fn customer_frame() -> DataFrame {
    let rows: Vec<usize> = (0..200).chain(0..5).collect();
    let id: Vec<String> = rows.iter().map(|i| format!("{:04}-CUST", i)).collect();
    let gender: Vec<&str> = rows.iter().map(|i| if i % 2 == 0 { "Male" } else { "Female" }).collect();
    let senior: Vec<i64> = rows.iter().map(|i| (i % 7 == 0) as i64).collect();
    let tenure: Vec<i64> = rows.iter().map(|i| ((i * 37) % 72) as i64).collect();
    let contract: Vec<&str> = rows.iter().map(|i| CONTRACTS[i % 3]).collect();
    let charges: Vec<f64> = rows.iter().map(|i| 20.25 + ((i * 53) % 100) as f64).collect();
    let churn: Vec<&str> = rows
        .iter()
        .map(|i| if i % 3 == 0 && (i * 37) % 72 < 24 { "Yes" } else { "No" })
        .collect();

    df!(
        "customerID" => &id,
        "gender" => &gender,
        "SeniorCitizen" => &senior,
        "tenure" => &tenure,
        "Contract" => &contract,
        "MonthlyCharges" => &charges,
        "Churn" => &churn,
    )
    .unwrap()
}

pub fn write_customers(path: &Path) {
    artifacts::write_csv(&mut customer_frame(), path).unwrap();
}

pub const SCHEMA: &str = r#"
COLUMNS:
  gender: object
  SeniorCitizen: int64
  tenure: int64
  Contract: object
  MonthlyCharges: float64
TARGET_COLUMN:
  name: Churn
  type: object
"#;

pub const PARAMS: &str = r#"
data_transformation:
  test_size: 0.25
  random_state: 42
  smote_threshold: 0.7
  encoding: label_encoding
  smote_k_neighbors: 3
model_evaluation:
  fbeta_beta: 2.0
models:
  logistic_regression:
    model_class: sklearn.linear_model.LogisticRegression
    params:
      C: [1.0]
  decision_tree:
    model_class: sklearn.tree.DecisionTreeClassifier
    params:
      max_depth: [3, 6]
  knn:
    model_class: sklearn.neighbors.KNeighborsClassifier
    params:
      n_neighbors: [3]
"#;

pub fn config_yaml(root: &Path) -> String {
    let r = root.display();
    format!(
        r#"
artifacts_root: {r}/artifacts
data_ingestion:
  root_dir: {r}/artifacts/data_ingestion
  kaggle_dataset: blastchar/telco-customer-churn
  file: churn.csv
  local_data_file: {r}/artifacts/data_ingestion/data/churn.csv
  data_dir: {r}/artifacts/data_ingestion/data
data_validation:
  root_dir: {r}/artifacts/data_validation
  local_data_file: {r}/artifacts/data_ingestion/data/churn.csv
  status_file: {r}/artifacts/data_validation/status.txt
  status_message_file: {r}/artifacts/data_validation/status_message.txt
data_transformation:
  root_dir: {r}/artifacts/data_transformation
  local_data_file: {r}/artifacts/data_ingestion/data/churn.csv
  filtered_data_file: {r}/artifacts/data_transformation/filtered.csv
  encoded_data_file: {r}/artifacts/data_transformation/encoded.csv
  encoder_file: {r}/artifacts/data_transformation/encoders.json
  train_data_file: {r}/artifacts/data_transformation/train.csv
  test_data_file: {r}/artifacts/data_transformation/test.csv
model_trainer:
  root_dir: {r}/artifacts/model_trainer
  train_data_path: {r}/artifacts/data_transformation/train.csv
  test_data_path: {r}/artifacts/data_transformation/test.csv
  model_name: model.json
model_evaluation:
  root_dir: {r}/artifacts/model_evaluation
  test_data_path: {r}/artifacts/data_transformation/test.csv
  model_path: {r}/artifacts/model_trainer/model.json
  metric_file_name: {r}/artifacts/model_evaluation/metrics.json
model_prediction:
  root_dir: {r}/artifacts/model_prediction
  encoder_file: {r}/artifacts/data_transformation/encoders.json
  status_file: {r}/artifacts/model_prediction/status.txt
  model_path: {r}/artifacts/model_trainer/model.json
tracking:
  backend: local
  experiment_name: churn-test
  local_dir: {r}/artifacts/mlruns
"#
    )
}

/// Write the three documents under `root` and load them
pub fn manager(root: &Path) -> ConfigurationManager {
    let config = root.join("config.yaml");
    let params = root.join("params.yaml");
    let schema = root.join("schema.yaml");
    fs::write(&config, config_yaml(root)).unwrap();
    fs::write(&params, PARAMS).unwrap();
    fs::write(&schema, SCHEMA).unwrap();
    ConfigurationManager::new(&config, &params, &schema).unwrap()
}

/// Raw dataset placed outside the artifact tree, for `LocalFileSource`
pub fn source_file(root: &Path) -> PathBuf {
    let path = root.join("source").join("churn.csv");
    write_customers(&path);
    path
}
