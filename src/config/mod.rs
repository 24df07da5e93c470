//! Configuration resolution
//!
//! Three YAML documents are parsed once into typed structs:
//! - `config.yaml`: artifact paths per stage ([`PipelineConfig`])
//! - `params.yaml`: split ratio, seed, balancing threshold and model grids ([`ParamsConfig`])
//! - `schema.yaml`: declared columns and the target column ([`Schema`])
//!
//! [`ConfigurationManager`] turns them into one immutable value object per
//! stage, creating the stage's root directory on the way.

mod document;
mod ordered;
mod params;
mod schema;

pub use document::{
    EvaluationSection, IngestionSection, PipelineConfig, PredictionSection, TrackingBackend,
    TrackingSection, TrainerSection, TransformationSection, ValidationSection,
};
pub use ordered::OrderedMap;
pub use params::{EvaluationParams, ModelSpec, ParamValue, ParamsConfig, TransformationParams};
pub use schema::{ColumnKind, Schema, TargetColumn};

use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};

pub const CONFIG_FILE_PATH: &str = "config/config.yaml";
pub const PARAMS_FILE_PATH: &str = "params.yaml";
pub const SCHEMA_FILE_PATH: &str = "schema.yaml";

/// Read one YAML document into `T`, failing with `ConfigError` when the
/// document is empty or a key is missing or mistyped.
pub fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|e| {
        PipelineError::ConfigError(format!("cannot read {}: {}", path.display(), e))
    })?;
    if content.trim().is_empty() {
        return Err(PipelineError::ConfigError(format!(
            "yaml file {} is empty",
            path.display()
        )));
    }
    let value = serde_yaml::from_str(&content)
        .map_err(|e| PipelineError::ConfigError(format!("{}: {}", path.display(), e)))?;
    info!(path = %path.display(), "yaml file loaded");
    Ok(value)
}

/// Create each directory (and its parents); existing directories are fine.
pub fn create_directories<P: AsRef<Path>>(paths: &[P]) -> Result<()> {
    for path in paths {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            continue;
        }
        fs::create_dir_all(path)?;
        debug!(path = %path.display(), "created directory");
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataIngestionConfig {
    pub root_dir: PathBuf,
    pub kaggle_dataset: String,
    pub file: String,
    pub local_data_file: PathBuf,
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataValidationConfig {
    pub root_dir: PathBuf,
    pub local_data_file: PathBuf,
    pub status_file: PathBuf,
    pub status_message_file: PathBuf,
    pub schema: Schema,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataTransformationConfig {
    pub root_dir: PathBuf,
    pub local_data_file: PathBuf,
    pub filtered_data_file: PathBuf,
    pub encoded_data_file: PathBuf,
    pub encoder_file: PathBuf,
    pub train_data_file: PathBuf,
    pub test_data_file: PathBuf,
    /// Status marker written by validation, read when the stage runs alone
    pub status_file: PathBuf,
    pub schema: Schema,
    pub params: TransformationParams,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelTrainerConfig {
    pub root_dir: PathBuf,
    pub train_data_path: PathBuf,
    pub test_data_path: PathBuf,
    pub model_name: String,
    pub target_column: String,
    pub models: OrderedMap<String, ModelSpec>,
}

impl ModelTrainerConfig {
    /// Where the best model artifact is written
    pub fn model_path(&self) -> PathBuf {
        self.root_dir.join(&self.model_name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelEvaluationConfig {
    pub root_dir: PathBuf,
    pub test_data_path: PathBuf,
    pub model_path: PathBuf,
    pub metric_file_name: PathBuf,
    pub target_column: String,
    pub fbeta_beta: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelPredictionConfig {
    pub root_dir: PathBuf,
    pub encoder_file: PathBuf,
    pub status_file: PathBuf,
    pub model_path: PathBuf,
    pub schema: Schema,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackingConfig {
    pub backend: TrackingBackend,
    pub tracking_uri: Option<String>,
    pub experiment_name: String,
    pub local_dir: PathBuf,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Owns the three parsed documents and hands out per-stage configs
#[derive(Debug, Clone)]
pub struct ConfigurationManager {
    config: PipelineConfig,
    params: ParamsConfig,
    schema: Schema,
}

impl ConfigurationManager {
    /// Load the three documents from disk
    pub fn new(config_path: &Path, params_path: &Path, schema_path: &Path) -> Result<Self> {
        let config: PipelineConfig = read_yaml(config_path)?;
        let params: ParamsConfig = read_yaml(params_path)?;
        let schema: Schema = read_yaml(schema_path)?;
        Self::from_parts(config, params, schema)
    }

    /// Load from the conventional locations relative to the working directory
    pub fn from_default_paths() -> Result<Self> {
        Self::new(
            Path::new(CONFIG_FILE_PATH),
            Path::new(PARAMS_FILE_PATH),
            Path::new(SCHEMA_FILE_PATH),
        )
    }

    /// Build from already parsed documents; creates `artifacts_root`.
    pub fn from_parts(config: PipelineConfig, params: ParamsConfig, schema: Schema) -> Result<Self> {
        params.check().map_err(PipelineError::ConfigError)?;
        create_directories(&[&config.artifacts_root])?;
        Ok(Self { config, params, schema })
    }

    pub fn pipeline_config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn params(&self) -> &ParamsConfig {
        &self.params
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn data_ingestion_config(&self) -> Result<DataIngestionConfig> {
        let c = &self.config.data_ingestion;
        create_directories(&[&c.root_dir, &c.data_dir])?;
        Ok(DataIngestionConfig {
            root_dir: c.root_dir.clone(),
            kaggle_dataset: c.kaggle_dataset.clone(),
            file: c.file.clone(),
            local_data_file: c.local_data_file.clone(),
            data_dir: c.data_dir.clone(),
        })
    }

    pub fn data_validation_config(&self) -> Result<DataValidationConfig> {
        let c = &self.config.data_validation;
        create_directories(&[&c.root_dir])?;
        Ok(DataValidationConfig {
            root_dir: c.root_dir.clone(),
            local_data_file: c.local_data_file.clone(),
            status_file: c.status_file.clone(),
            status_message_file: c.status_message_file.clone(),
            schema: self.schema.clone(),
        })
    }

    pub fn data_transformation_config(&self) -> Result<DataTransformationConfig> {
        let c = &self.config.data_transformation;
        create_directories(&[&c.root_dir])?;
        Ok(DataTransformationConfig {
            root_dir: c.root_dir.clone(),
            local_data_file: c.local_data_file.clone(),
            filtered_data_file: c.filtered_data_file.clone(),
            encoded_data_file: c.encoded_data_file.clone(),
            encoder_file: c.encoder_file.clone(),
            train_data_file: c.train_data_file.clone(),
            test_data_file: c.test_data_file.clone(),
            status_file: self.config.data_validation.status_file.clone(),
            schema: self.schema.clone(),
            params: self.params.data_transformation.clone(),
        })
    }

    pub fn model_trainer_config(&self) -> Result<ModelTrainerConfig> {
        let c = &self.config.model_trainer;
        create_directories(&[&c.root_dir])?;
        Ok(ModelTrainerConfig {
            root_dir: c.root_dir.clone(),
            train_data_path: c.train_data_path.clone(),
            test_data_path: c.test_data_path.clone(),
            model_name: c.model_name.clone(),
            target_column: self.schema.target_name().to_string(),
            models: self.params.models.clone(),
        })
    }

    pub fn model_evaluation_config(&self) -> Result<ModelEvaluationConfig> {
        let c = &self.config.model_evaluation;
        create_directories(&[&c.root_dir])?;
        Ok(ModelEvaluationConfig {
            root_dir: c.root_dir.clone(),
            test_data_path: c.test_data_path.clone(),
            model_path: c.model_path.clone(),
            metric_file_name: c.metric_file_name.clone(),
            target_column: self.schema.target_name().to_string(),
            fbeta_beta: self.params.model_evaluation.fbeta_beta,
        })
    }

    pub fn model_prediction_config(&self) -> Result<ModelPredictionConfig> {
        let c = &self.config.model_prediction;
        create_directories(&[&c.root_dir])?;
        Ok(ModelPredictionConfig {
            root_dir: c.root_dir.clone(),
            encoder_file: c.encoder_file.clone(),
            status_file: c.status_file.clone(),
            model_path: c.model_path.clone(),
            schema: self.schema.clone(),
        })
    }

    /// Tracking settings; credentials come from the environment.
    pub fn tracking_config(&self) -> Result<TrackingConfig> {
        let t = &self.config.tracking;
        let local_dir = t
            .local_dir
            .clone()
            .unwrap_or_else(|| self.config.artifacts_root.join("mlruns"));
        if t.backend == TrackingBackend::Local {
            create_directories(&[&local_dir])?;
        }
        Ok(TrackingConfig {
            backend: t.backend,
            tracking_uri: t.tracking_uri.clone(),
            experiment_name: t
                .experiment_name
                .clone()
                .unwrap_or_else(|| "churn-pipeline".to_string()),
            local_dir,
            username: std::env::var("MLFLOW_TRACKING_USERNAME").ok(),
            password: std::env::var("MLFLOW_TRACKING_PASSWORD").ok(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn config_yaml(root: &Path) -> String {
        let r = root.display();
        format!(
            r#"
artifacts_root: {r}/artifacts
data_ingestion:
  root_dir: {r}/artifacts/data_ingestion
  kaggle_dataset: blastchar/telco-customer-churn
  file: WA_Fn-UseC_-Telco-Customer-Churn.csv
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
"#
        )
    }

    const PARAMS: &str = r#"
data_transformation:
  test_size: 0.25
  random_state: 42
  smote_threshold: 0.7
models:
  tree:
    model_class: DecisionTreeClassifier
    params:
      max_depth: [2, 4]
"#;

    const SCHEMA: &str = r#"
COLUMNS:
  gender: object
  tenure: int64
TARGET_COLUMN:
  name: Churn
  type: object
"#;

    #[test]
    fn test_manager_creates_directories() {
        let dir = TempDir::new().unwrap();
        let config = write(dir.path(), "config.yaml", &config_yaml(dir.path()));
        let params = write(dir.path(), "params.yaml", PARAMS);
        let schema = write(dir.path(), "schema.yaml", SCHEMA);

        let manager = ConfigurationManager::new(&config, &params, &schema).unwrap();
        assert!(dir.path().join("artifacts").is_dir());

        let ingestion = manager.data_ingestion_config().unwrap();
        assert!(ingestion.data_dir.is_dir());

        let trainer = manager.model_trainer_config().unwrap();
        assert_eq!(trainer.target_column, "Churn");
        assert_eq!(trainer.model_path(), dir.path().join("artifacts/model_trainer/model.json"));
        assert!(trainer.root_dir.is_dir());

        // idempotent
        manager.model_trainer_config().unwrap();

        let tracking = manager.tracking_config().unwrap();
        assert_eq!(tracking.backend, TrackingBackend::None);
    }

    #[test]
    fn test_mlflow_without_uri_still_resolves() {
        let dir = TempDir::new().unwrap();
        let yaml = format!("{}tracking:\n  backend: mlflow\n", config_yaml(dir.path()));
        let config = write(dir.path(), "config.yaml", &yaml);
        let params = write(dir.path(), "params.yaml", PARAMS);
        let schema = write(dir.path(), "schema.yaml", SCHEMA);

        let manager = ConfigurationManager::new(&config, &params, &schema).unwrap();
        let tracking = manager.tracking_config().unwrap();
        assert_eq!(tracking.backend, TrackingBackend::Mlflow);
        assert!(tracking.tracking_uri.is_none());
        assert_eq!(crate::tracking::from_config(&tracking).backend_name(), "none");
    }

    #[test]
    fn test_empty_document_is_config_error() {
        let dir = TempDir::new().unwrap();
        let config = write(dir.path(), "config.yaml", &config_yaml(dir.path()));
        let params = write(dir.path(), "params.yaml", "   \n");
        let schema = write(dir.path(), "schema.yaml", SCHEMA);

        let err = ConfigurationManager::new(&config, &params, &schema).unwrap_err();
        assert!(matches!(err, PipelineError::ConfigError(ref m) if m.contains("empty")));
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let dir = TempDir::new().unwrap();
        let config = write(dir.path(), "config.yaml", "artifacts_root: a\n");
        let params = write(dir.path(), "params.yaml", PARAMS);
        let schema = write(dir.path(), "schema.yaml", SCHEMA);

        let err = ConfigurationManager::new(&config, &params, &schema).unwrap_err();
        match err {
            PipelineError::ConfigError(msg) => assert!(msg.contains("config.yaml")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_document_is_config_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.yaml");
        let err = read_yaml::<Schema>(&missing).unwrap_err();
        assert!(matches!(err, PipelineError::ConfigError(_)));
    }
}
