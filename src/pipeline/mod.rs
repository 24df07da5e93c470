//! Offline pipeline orchestration
//!
//! Stages run strictly in sequence: ingestion, validation,
//! transformation, training, evaluation. The validation gate is handed to
//! the transformation stage in memory; only a transformation run on its
//! own consults the persisted status marker.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::ConfigurationManager;
use crate::error::{PipelineError, Result};
use crate::evaluation::{EvaluationRecord, ModelEvaluation};
use crate::ingestion::{DataIngestion, DatasetSource, IngestionOutcome};
use crate::tracking::{self, ExperimentTracker};
use crate::training::{ModelRegistry, ModelTrainer, TrialRecord};
use crate::transformation::{DataTransformation, TransformationSummary};
use crate::validation::DataValidation;

/// One offline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Ingestion,
    Validation,
    Transformation,
    Training,
    Evaluation,
}

impl StageName {
    pub const ALL: [StageName; 5] = [
        StageName::Ingestion,
        StageName::Validation,
        StageName::Transformation,
        StageName::Training,
        StageName::Evaluation,
    ];

    /// Name used in the stage banners
    pub fn title(&self) -> &'static str {
        match self {
            StageName::Ingestion => "Data Ingestion",
            StageName::Validation => "Data Validation",
            StageName::Transformation => "Data Transformation",
            StageName::Training => "Model Trainer",
            StageName::Evaluation => "Model Evaluation",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Ingestion => "ingestion",
            StageName::Validation => "validation",
            StageName::Transformation => "transformation",
            StageName::Training => "training",
            StageName::Evaluation => "evaluation",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageName {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "ingestion" | "data_ingestion" => Ok(StageName::Ingestion),
            "validation" | "data_validation" => Ok(StageName::Validation),
            "transformation" | "data_transformation" => Ok(StageName::Transformation),
            "training" | "trainer" | "model_trainer" => Ok(StageName::Training),
            "evaluation" | "model_evaluation" => Ok(StageName::Evaluation),
            other => Err(PipelineError::ConfigError(format!(
                "unknown stage '{}', expected one of ingestion, validation, transformation, training, evaluation",
                other
            ))),
        }
    }
}

/// Summary of the training stage
#[derive(Debug, Clone, Serialize)]
pub struct TrainingSummary {
    pub alias: String,
    pub family: String,
    pub best_recall: f64,
    pub model_path: std::path::PathBuf,
    pub trials: Vec<TrialRecord>,
}

/// What one stage produced
#[derive(Debug, Clone)]
pub enum StageReport {
    Ingestion(IngestionOutcome),
    Validation { passed: bool, message: String },
    Transformation(TransformationSummary),
    Training(TrainingSummary),
    Evaluation(EvaluationRecord),
}

/// Outcome of a full offline run
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub ingestion: IngestionOutcome,
    pub validation_message: String,
    pub transformation: TransformationSummary,
    pub training: TrainingSummary,
    pub evaluation: EvaluationRecord,
}

pub struct TrainingPipeline {
    manager: ConfigurationManager,
    source: Option<Box<dyn DatasetSource>>,
    registry: ModelRegistry,
    tracker: Option<Arc<dyn ExperimentTracker>>,
}

impl TrainingPipeline {
    pub fn new(manager: ConfigurationManager) -> Self {
        Self {
            manager,
            source: None,
            registry: ModelRegistry::with_builtins(),
            tracker: None,
        }
    }

    /// Fetch the dataset from `source` instead of the configured Kaggle dataset
    pub fn with_source(mut self, source: Box<dyn DatasetSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Override the tracker built from the `tracking` config section
    pub fn with_tracker(mut self, tracker: Arc<dyn ExperimentTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn manager(&self) -> &ConfigurationManager {
        &self.manager
    }

    /// Run every stage in order, stopping at the first failure
    pub fn run(&mut self) -> Result<PipelineReport> {
        let ingestion = staged(StageName::Ingestion, || self.ingest())?;
        let (passed, validation_message) = staged(StageName::Validation, || self.validate())?;
        let transformation = staged(StageName::Transformation, || self.transform(Some(passed)))?;
        let training = staged(StageName::Training, || self.train())?;
        let evaluation = staged(StageName::Evaluation, || self.evaluate())?;

        info!(
            model = %training.alias,
            recall = evaluation.recall,
            "pipeline finished"
        );
        Ok(PipelineReport {
            ingestion,
            validation_message,
            transformation,
            training,
            evaluation,
        })
    }

    /// Run one stage on its own against the artifacts already on disk
    pub fn run_stage(&mut self, stage: StageName) -> Result<StageReport> {
        staged(stage, || match stage {
            StageName::Ingestion => self.ingest().map(StageReport::Ingestion),
            StageName::Validation => self
                .validate()
                .map(|(passed, message)| StageReport::Validation { passed, message }),
            StageName::Transformation => self.transform(None).map(StageReport::Transformation),
            StageName::Training => self.train().map(StageReport::Training),
            StageName::Evaluation => self.evaluate().map(StageReport::Evaluation),
        })
    }

    fn ingest(&mut self) -> Result<IngestionOutcome> {
        let config = self.manager.data_ingestion_config()?;
        let ingestion = match self.source.take() {
            Some(source) => DataIngestion::with_source(config, source),
            None => DataIngestion::new(config),
        };
        ingestion.fetch_if_absent()
    }

    fn validate(&self) -> Result<(bool, String)> {
        let config = self.manager.data_validation_config()?;
        let report = DataValidation::new(config).validate_all_columns()?;
        Ok((report.passed(), report.message()))
    }

    /// `gate` is the in-memory validation result; `None` reads the marker.
    fn transform(&self, gate: Option<bool>) -> Result<TransformationSummary> {
        let stage = DataTransformation::new(self.manager.data_transformation_config()?);
        match gate {
            Some(passed) => stage.run(passed),
            None => stage.run_from_status(),
        }
    }

    fn train(&self) -> Result<TrainingSummary> {
        let tracker = match &self.tracker {
            Some(tracker) => Arc::clone(tracker),
            None => tracking::from_config(&self.manager.tracking_config()?),
        };
        let mut trainer = ModelTrainer::new(self.manager.model_trainer_config()?)
            .with_registry(self.registry.clone())
            .with_tracker(tracker);
        let outcome = trainer.train()?;
        Ok(TrainingSummary {
            alias: outcome.alias,
            family: outcome.family,
            best_recall: outcome.best_recall,
            model_path: outcome.model_path,
            trials: outcome.trials,
        })
    }

    fn evaluate(&self) -> Result<EvaluationRecord> {
        ModelEvaluation::new(self.manager.model_evaluation_config()?)
            .with_registry(self.registry.clone())
            .evaluate()
    }
}

/// Wrap a stage body in its banners; failures are logged before returning.
fn staged<T>(stage: StageName, body: impl FnOnce() -> Result<T>) -> Result<T> {
    info!(">>>>> Stage {} started <<<<<", stage.title());
    match body() {
        Ok(value) => {
            info!(">>>>> Stage {} completed <<<<<\n\nx==========x", stage.title());
            Ok(value)
        }
        Err(e) => {
            error!(stage = %stage, error = %e, "stage failed");
            Err(e)
        }
    }
}
