//! Experiment tracking
//!
//! Every training trial is reported as one run: its hyperparameters, its
//! scores and the fitted model. Tracking is a side channel; callers treat
//! every failure here as a warning and keep training.

mod local;
mod mlflow;

pub use local::{LocalTracker, RunRecord};
pub use mlflow::MlflowTracker;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{TrackingBackend, TrackingConfig};
use crate::error::Result;

/// Final state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Running,
    Finished,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Finished => "FINISHED",
            RunStatus::Failed => "FAILED",
        }
    }
}

/// Run-scoped experiment logging
pub trait ExperimentTracker: Send + Sync {
    fn backend_name(&self) -> &str;

    /// Open a run and return its id
    fn start_run(&self, run_name: &str) -> Result<String>;

    fn log_params(&self, run_id: &str, params: &[(String, String)]) -> Result<()>;

    fn log_metric(&self, run_id: &str, key: &str, value: f64) -> Result<()>;

    /// Store the fitted model state under the family name
    fn log_model(&self, run_id: &str, family: &str, model: &serde_json::Value) -> Result<()>;

    fn end_run(&self, run_id: &str, status: RunStatus) -> Result<()>;
}

/// Tracker that records nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracker;

impl ExperimentTracker for NoopTracker {
    fn backend_name(&self) -> &str {
        "none"
    }

    fn start_run(&self, _run_name: &str) -> Result<String> {
        Ok(uuid::Uuid::new_v4().simple().to_string())
    }

    fn log_params(&self, _run_id: &str, _params: &[(String, String)]) -> Result<()> {
        Ok(())
    }

    fn log_metric(&self, _run_id: &str, _key: &str, _value: f64) -> Result<()> {
        Ok(())
    }

    fn log_model(&self, _run_id: &str, _family: &str, _model: &serde_json::Value) -> Result<()> {
        Ok(())
    }

    fn end_run(&self, _run_id: &str, _status: RunStatus) -> Result<()> {
        Ok(())
    }
}

/// Build the configured tracker.
///
/// A remote tracker that cannot be set up degrades to [`NoopTracker`].
pub fn from_config(config: &TrackingConfig) -> Arc<dyn ExperimentTracker> {
    match config.backend {
        TrackingBackend::None => Arc::new(NoopTracker),
        TrackingBackend::Local => {
            info!(dir = %config.local_dir.display(), "tracking runs locally");
            Arc::new(LocalTracker::new(&config.local_dir, &config.experiment_name))
        }
        TrackingBackend::Mlflow => match MlflowTracker::from_config(config) {
            Ok(tracker) => {
                info!(uri = %tracker.uri(), "tracking runs in MLflow");
                Arc::new(tracker)
            }
            Err(e) => {
                warn!(error = %e, "MLflow tracker unavailable, runs will not be tracked");
                Arc::new(NoopTracker)
            }
        },
    }
}
