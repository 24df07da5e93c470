//! Parsed `config.yaml`: artifact paths per stage

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionSection {
    pub root_dir: PathBuf,
    /// Kaggle dataset slug, `owner/dataset`
    pub kaggle_dataset: String,
    /// File inside the dataset to fetch
    pub file: String,
    pub local_data_file: PathBuf,
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSection {
    pub root_dir: PathBuf,
    pub local_data_file: PathBuf,
    pub status_file: PathBuf,
    pub status_message_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformationSection {
    pub root_dir: PathBuf,
    pub local_data_file: PathBuf,
    pub filtered_data_file: PathBuf,
    pub encoded_data_file: PathBuf,
    pub encoder_file: PathBuf,
    pub train_data_file: PathBuf,
    pub test_data_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerSection {
    pub root_dir: PathBuf,
    pub train_data_path: PathBuf,
    pub test_data_path: PathBuf,
    pub model_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSection {
    pub root_dir: PathBuf,
    pub test_data_path: PathBuf,
    pub model_path: PathBuf,
    pub metric_file_name: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionSection {
    pub root_dir: PathBuf,
    pub encoder_file: PathBuf,
    pub status_file: PathBuf,
    pub model_path: PathBuf,
}

/// Where trial runs are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingBackend {
    #[default]
    None,
    Local,
    Mlflow,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackingSection {
    #[serde(default)]
    pub backend: TrackingBackend,
    #[serde(default)]
    pub tracking_uri: Option<String>,
    #[serde(default)]
    pub experiment_name: Option<String>,
    #[serde(default)]
    pub local_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub artifacts_root: PathBuf,
    pub data_ingestion: IngestionSection,
    pub data_validation: ValidationSection,
    pub data_transformation: TransformationSection,
    pub model_trainer: TrainerSection,
    pub model_evaluation: EvaluationSection,
    pub model_prediction: PredictionSection,
    #[serde(default)]
    pub tracking: TrackingSection,
}
