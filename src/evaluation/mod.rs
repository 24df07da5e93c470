//! Model evaluation stage
//!
//! Scores the persisted best model against the test partition and writes
//! the metrics record.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::artifacts;
use crate::config::ModelEvaluationConfig;
use crate::error::{PipelineError, Result, StageKind};
use crate::training::dataset::{columns_to_array2, target_to_array1};
use crate::training::{BestModelArtifact, ClassificationMetrics, ModelRegistry};

/// Persisted metrics of the best model on the test partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub fbeta: f64,
    pub roc_auc: f64,
    pub auc_area: f64,
}

impl From<&ClassificationMetrics> for EvaluationRecord {
    fn from(m: &ClassificationMetrics) -> Self {
        Self {
            accuracy: m.accuracy,
            precision: m.precision,
            recall: m.recall,
            fbeta: m.fbeta,
            roc_auc: m.roc_auc,
            auc_area: m.auc_area,
        }
    }
}

pub struct ModelEvaluation {
    config: ModelEvaluationConfig,
    registry: ModelRegistry,
}

impl ModelEvaluation {
    pub fn new(config: ModelEvaluationConfig) -> Self {
        Self {
            config,
            registry: ModelRegistry::with_builtins(),
        }
    }

    pub fn with_registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn evaluate(&self) -> Result<EvaluationRecord> {
        self.run().map_err(|e| e.in_stage(StageKind::Evaluation))
    }

    fn run(&self) -> Result<EvaluationRecord> {
        if !self.config.model_path.exists() {
            return Err(PipelineError::EvaluationError(format!(
                "model artifact {} not found; run training first",
                self.config.model_path.display()
            )));
        }
        let artifact = BestModelArtifact::load(&self.config.model_path)?;
        let model = artifact.restore(&self.registry)?;

        let test = artifacts::read_csv(&self.config.test_data_path)?;
        let x = columns_to_array2(&test, &artifact.feature_names)?;
        let y = target_to_array1(&test, &self.config.target_column)?;

        let y_pred = model.predict(&x)?;
        let scores = model.predict_scores(&x)?;
        let metrics = ClassificationMetrics::compute(&y, &y_pred, Some(&scores), self.config.fbeta_beta)?;
        let record = EvaluationRecord::from(&metrics);

        artifacts::save_json(&self.config.metric_file_name, &record)?;
        info!(
            model = %artifact.alias,
            accuracy = record.accuracy,
            recall = record.recall,
            fbeta = record.fbeta,
            roc_auc = record.roc_auc,
            auc_area = record.auc_area,
            path = %self.config.metric_file_name.display(),
            "saved evaluation metrics"
        );
        Ok(record)
    }
}
