//! Churn Pipeline - staged customer churn training and serving
//!
//! An offline pipeline turns a raw customer table into a persisted
//! classifier; a predictor serves single-record predictions from the
//! persisted artifacts only.
//!
//! # Modules
//!
//! ## Offline stages
//! - [`ingestion`] - Fetch the raw dataset once
//! - [`validation`] - Column presence and declared type checks
//! - [`transformation`] - Filtering, deduplication, encoding, split, SMOTE
//! - [`training`] - Classifier families, grid search, metrics
//! - [`evaluation`] - Metrics of the best model on the test partition
//! - [`pipeline`] - Sequential orchestration of the stages
//!
//! ## Serving
//! - [`prediction`] - Validate, encode and classify one record
//! - [`server`] - HTTP form and JSON API
//! - [`cli`] - Command-line interface
//!
//! ## Shared
//! - [`config`] - YAML documents and per-stage configuration
//! - [`artifacts`] - Filesystem artifact helpers
//! - [`tracking`] - Experiment tracking (local files, MLflow)

pub mod error;

pub mod artifacts;
pub mod config;

pub mod ingestion;
pub mod validation;
pub mod transformation;
pub mod training;
pub mod evaluation;
pub mod pipeline;

pub mod prediction;
pub mod tracking;

pub mod server;
pub mod cli;

pub use error::{PipelineError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{PipelineError, Result, StageKind};

    // Configuration
    pub use crate::config::{ColumnKind, ConfigurationManager, Schema};

    // Stages
    pub use crate::ingestion::{DataIngestion, DatasetSource, KaggleSource, LocalFileSource};
    pub use crate::validation::{DataValidation, ValidationReport};
    pub use crate::transformation::{DataTransformation, EncoderSet, Smote};
    pub use crate::training::{
        BestModelArtifact, Classifier, ClassificationMetrics, ModelFamily, ModelRegistry,
        ModelTrainer, TrialRecord,
    };
    pub use crate::evaluation::{EvaluationRecord, ModelEvaluation};
    pub use crate::pipeline::{StageName, TrainingPipeline};

    // Serving
    pub use crate::prediction::{FieldValue, ModelPredictor, PredictionOutcome, Record};

    // Experiment tracking
    pub use crate::tracking::{ExperimentTracker, LocalTracker, MlflowTracker, NoopTracker, RunStatus};
}
