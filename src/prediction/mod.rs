//! Serving-path predictor
//!
//! A request moves through `Received -> Validated -> {Rejected | Processed}
//! -> {Predicted | Failed}`. The validation result travels with the
//! request; the persisted status marker is written for operators but never
//! read back, so concurrent requests cannot see each other's gate.
//! Faults never escape [`ModelPredictor::predict`]: they become a failed
//! [`PredictionOutcome`].

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{info, warn};

use crate::artifacts;
use crate::config::{ColumnKind, ModelPredictionConfig};
use crate::error::{PipelineError, Result, StageKind};
use crate::training::{columns_to_array2, BestModelArtifact, ModelRegistry};
use crate::transformation::EncoderSet;
use crate::validation::{validate_columns, ValidationReport};

pub const PROCESSED_MESSAGE: &str = "Data processed successfully";
pub const NOT_VALIDATED_MESSAGE: &str = "Data columns are not validated";
pub const NO_MODEL_MESSAGE: &str = "Model does not exist yet, train the model first";

/// One field of an incoming record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text(String),
}

impl FieldValue {
    pub fn kind(&self) -> ColumnKind {
        match self {
            FieldValue::Integer(_) => ColumnKind::Integer,
            FieldValue::Float(_) => ColumnKind::Float,
            FieldValue::Boolean(_) => ColumnKind::Boolean,
            FieldValue::Text(_) => ColumnKind::Categorical,
        }
    }

    /// Interpret raw form or command-line text as the declared kind.
    /// Text that does not parse stays text and fails validation.
    pub fn parse_as(raw: &str, expected: Option<ColumnKind>) -> Self {
        let raw = raw.trim();
        let parsed = match expected {
            Some(ColumnKind::Integer) => raw.parse().ok().map(FieldValue::Integer),
            Some(ColumnKind::Float) => raw.parse().ok().map(FieldValue::Float),
            Some(ColumnKind::Boolean) => match raw.to_ascii_lowercase().as_str() {
                "true" => Some(FieldValue::Boolean(true)),
                "false" => Some(FieldValue::Boolean(false)),
                _ => None,
            },
            Some(ColumnKind::Categorical) | None => None,
        };
        parsed.unwrap_or_else(|| FieldValue::Text(raw.to_string()))
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Integer(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Boolean(v) => write!(f, "{}", v),
            FieldValue::Text(v) => f.write_str(v),
        }
    }
}

/// A single customer record keyed by column name
pub type Record = BTreeMap<String, FieldValue>;

/// Where a request ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Received,
    Validated,
    Rejected,
    Processed,
    Predicted,
    Failed,
}

/// Result handed back to every caller of the serving path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionOutcome {
    pub success: bool,
    pub state: RequestState,
    /// Decoded target label, e.g. `Yes`
    pub label: Option<String>,
    pub churn: Option<bool>,
    pub message: String,
}

impl PredictionOutcome {
    fn failed(state: RequestState, message: impl Into<String>) -> Self {
        Self {
            success: false,
            state,
            label: None,
            churn: None,
            message: message.into(),
        }
    }
}

/// Output of [`ModelPredictor::pre_process_data`]
#[derive(Debug, Clone)]
pub struct Processed {
    pub message: String,
    pub success: bool,
    /// Encoded single-row frame of the feature columns, in schema order
    pub row: Option<DataFrame>,
}

pub struct ModelPredictor {
    config: ModelPredictionConfig,
    registry: ModelRegistry,
}

impl ModelPredictor {
    pub fn new(config: ModelPredictionConfig) -> Self {
        Self {
            config,
            registry: ModelRegistry::with_builtins(),
        }
    }

    pub fn with_registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &ModelPredictionConfig {
        &self.config
    }

    /// Check the record's fields against the schema features and write
    /// the status marker. Integers are accepted for float columns.
    pub fn validate_data(&self, record: &Record) -> Result<ValidationReport> {
        let schema = &self.config.schema;
        let observed: HashMap<String, Option<ColumnKind>> = record
            .iter()
            .map(|(name, value)| {
                let kind = match (value.kind(), schema.kind_of(name)) {
                    (ColumnKind::Integer, Some(ColumnKind::Float)) => ColumnKind::Float,
                    (kind, _) => kind,
                };
                (name.clone(), Some(kind))
            })
            .collect();
        let expected: Vec<(String, ColumnKind)> = schema
            .features()
            .map(|(name, kind)| (name.to_string(), kind))
            .collect();
        let report = validate_columns(&observed, &expected);

        artifacts::write_status(&self.config.status_file, report.passed())?;
        info!(passed = report.passed(), "prediction request validated");
        Ok(report)
    }

    /// Encode the record with the persisted encoders and project it to the
    /// feature columns, provided `report` passed.
    pub fn pre_process_data(&self, record: &Record, report: &ValidationReport) -> Result<Processed> {
        if !report.passed() {
            return Ok(Processed {
                message: format!("{}:\n{}", NOT_VALIDATED_MESSAGE, report.message()),
                success: false,
                row: None,
            });
        }

        let schema = &self.config.schema;
        let columns = schema
            .features()
            .map(|(name, kind)| {
                let value = record
                    .get(name)
                    .ok_or_else(|| PipelineError::ColumnNotFound(name.to_string()))?;
                Ok(match (kind, value) {
                    (ColumnKind::Integer, FieldValue::Integer(v)) => Column::new(name.into(), [*v]),
                    (ColumnKind::Float, FieldValue::Integer(v)) => Column::new(name.into(), [*v as f64]),
                    (ColumnKind::Float, FieldValue::Float(v)) => Column::new(name.into(), [*v]),
                    (ColumnKind::Boolean, FieldValue::Boolean(v)) => Column::new(name.into(), [*v]),
                    (_, other) => Column::new(name.into(), [other.to_string()]),
                })
            })
            .collect::<Result<Vec<Column>>>()?;
        let df = DataFrame::new(columns)?;

        let encoders = EncoderSet::load(&self.config.encoder_file)?;
        let row = encoders.transform(&df)?;
        Ok(Processed {
            message: PROCESSED_MESSAGE.to_string(),
            success: true,
            row: Some(row),
        })
    }

    /// Validate, encode and classify one record. Never fails: every fault
    /// is reported through the outcome.
    pub fn predict(&self, record: &Record) -> PredictionOutcome {
        let report = match self.validate_data(record) {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "could not validate prediction request");
                return PredictionOutcome::failed(RequestState::Received, e.to_string());
            }
        };

        let processed = match self.pre_process_data(record, &report) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "could not pre-process prediction request");
                return PredictionOutcome::failed(RequestState::Failed, e.to_string());
            }
        };
        let row = match (processed.success, processed.row) {
            (true, Some(row)) => row,
            _ => return PredictionOutcome::failed(RequestState::Rejected, processed.message),
        };

        if !self.config.model_path.exists() {
            return PredictionOutcome::failed(RequestState::Failed, NO_MODEL_MESSAGE);
        }
        match self.classify(&row) {
            Ok((code, label)) => {
                info!(code, label = ?label, "prediction made");
                PredictionOutcome {
                    success: true,
                    state: RequestState::Predicted,
                    churn: Some(code == 1),
                    label,
                    message: PROCESSED_MESSAGE.to_string(),
                }
            }
            Err(e) => {
                warn!(error = %e, "prediction failed");
                PredictionOutcome::failed(RequestState::Failed, e.to_string())
            }
        }
    }

    /// Predicted code and, when the target was encoded, its label
    fn classify(&self, row: &DataFrame) -> Result<(i64, Option<String>)> {
        let run = || -> Result<(i64, Option<String>)> {
            let artifact = BestModelArtifact::load(&self.config.model_path)?;
            let model = artifact.restore(&self.registry)?;
            let x = columns_to_array2(row, &artifact.feature_names)?;
            let code = model
                .predict(&x)?
                .first()
                .copied()
                .ok_or_else(|| PipelineError::PredictionError("model returned no prediction".to_string()))?;

            let encoders = EncoderSet::load(&self.config.encoder_file)?;
            let label = match encoders.get(&artifact.target_column) {
                Some(encoder) => Some(encoder.decode(code)?),
                None => None,
            };
            Ok((code, label))
        };
        run().map_err(|e| e.in_stage(StageKind::Prediction))
    }
}
