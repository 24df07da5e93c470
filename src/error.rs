//! Error types for the churn pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Main error type for the pipeline.
///
/// One variant per stage so that an aborted run tells the caller which
/// stage failed. A failing data validation is *not* an error; it is
/// reported through [`crate::validation::ValidationReport`].
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Ingestion error: {0}")]
    IngestionError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Transformation error: {0}")]
    TransformationError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Evaluation error: {0}")]
    EvaluationError(String),

    #[error("Prediction error: {0}")]
    PredictionError(String),

    #[error("Tracking error: {0}")]
    TrackingError(String),

    #[error("Unseen category '{value}' in column '{column}'")]
    UnseenCategory { column: String, value: String },

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Data error: {0}")]
    DataError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Pipeline stage that owns an error, used by [`PipelineError::in_stage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Config,
    Ingestion,
    Validation,
    Transformation,
    Training,
    Evaluation,
    Prediction,
}

impl PipelineError {
    /// Re-label a lower level fault as belonging to `stage`.
    ///
    /// Errors that already carry a stage, and encoder errors that the
    /// prediction path needs to inspect, pass through unchanged.
    pub fn in_stage(self, stage: StageKind) -> Self {
        match self {
            e @ (PipelineError::ConfigError(_)
            | PipelineError::IngestionError(_)
            | PipelineError::ValidationError(_)
            | PipelineError::TransformationError(_)
            | PipelineError::TrainingError(_)
            | PipelineError::EvaluationError(_)
            | PipelineError::PredictionError(_)
            | PipelineError::TrackingError(_)
            | PipelineError::UnseenCategory { .. }) => e,
            other => {
                let msg = other.to_string();
                match stage {
                    StageKind::Config => PipelineError::ConfigError(msg),
                    StageKind::Ingestion => PipelineError::IngestionError(msg),
                    StageKind::Validation => PipelineError::ValidationError(msg),
                    StageKind::Transformation => PipelineError::TransformationError(msg),
                    StageKind::Training => PipelineError::TrainingError(msg),
                    StageKind::Evaluation => PipelineError::EvaluationError(msg),
                    StageKind::Prediction => PipelineError::PredictionError(msg),
                }
            }
        }
    }
}

impl From<polars::error::PolarsError> for PipelineError {
    fn from(err: polars::error::PolarsError) -> Self {
        PipelineError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for PipelineError {
    fn from(err: serde_yaml::Error) -> Self {
        PipelineError::ConfigError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for PipelineError {
    fn from(err: ndarray::ShapeError) -> Self {
        PipelineError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
