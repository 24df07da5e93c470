//! File-system tracker: one JSON record per run

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use super::{ExperimentTracker, RunStatus};
use crate::artifacts::{load_json, save_json};
use crate::error::{PipelineError, Result};

/// A run as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub run_name: String,
    pub experiment: String,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub params: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, f64>,
    /// Families whose model state was logged
    pub models: Vec<String>,
}

/// Writes `<dir>/<experiment>/<run_id>/run.json` after every call, plus
/// `model_<family>.json` for logged models.
pub struct LocalTracker {
    experiment_dir: PathBuf,
    experiment: String,
    runs: Mutex<HashMap<String, RunRecord>>,
}

impl LocalTracker {
    pub fn new(base_dir: &Path, experiment: &str) -> Self {
        Self {
            experiment_dir: base_dir.join(experiment),
            experiment: experiment.to_string(),
            runs: Mutex::new(HashMap::new()),
        }
    }

    fn run_dir(&self, run_id: &str) -> PathBuf {
        self.experiment_dir.join(run_id)
    }

    fn update<F>(&self, run_id: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut RunRecord),
    {
        let mut runs = self.runs.lock();
        let record = runs
            .get_mut(run_id)
            .ok_or_else(|| PipelineError::TrackingError(format!("unknown run '{}'", run_id)))?;
        f(record);
        save_json(&self.run_dir(run_id).join("run.json"), &*record)
    }

    /// Every run stored for this experiment, oldest first
    pub fn load_runs(&self) -> Result<Vec<RunRecord>> {
        if !self.experiment_dir.exists() {
            return Ok(Vec::new());
        }
        let mut runs = Vec::new();
        for entry in fs::read_dir(&self.experiment_dir)? {
            let path = entry?.path().join("run.json");
            if path.exists() {
                runs.push(load_json::<RunRecord>(&path)?);
            }
        }
        runs.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        Ok(runs)
    }
}

impl ExperimentTracker for LocalTracker {
    fn backend_name(&self) -> &str {
        "local"
    }

    fn start_run(&self, run_name: &str) -> Result<String> {
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let record = RunRecord {
            run_id: run_id.clone(),
            run_name: run_name.to_string(),
            experiment: self.experiment.clone(),
            status: RunStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            params: BTreeMap::new(),
            metrics: BTreeMap::new(),
            models: Vec::new(),
        };
        save_json(&self.run_dir(&run_id).join("run.json"), &record)?;
        self.runs.lock().insert(run_id.clone(), record);
        Ok(run_id)
    }

    fn log_params(&self, run_id: &str, params: &[(String, String)]) -> Result<()> {
        self.update(run_id, |r| r.params.extend(params.iter().cloned()))
    }

    fn log_metric(&self, run_id: &str, key: &str, value: f64) -> Result<()> {
        self.update(run_id, |r| {
            r.metrics.insert(key.to_string(), value);
        })
    }

    fn log_model(&self, run_id: &str, family: &str, model: &serde_json::Value) -> Result<()> {
        save_json(&self.run_dir(run_id).join(format!("model_{}.json", family)), model)?;
        self.update(run_id, |r| r.models.push(family.to_string()))
    }

    /// Finished runs live on disk only
    fn end_run(&self, run_id: &str, status: RunStatus) -> Result<()> {
        self.update(run_id, |r| {
            r.status = status;
            r.end_time = Some(Utc::now());
        })?;
        self.runs.lock().remove(run_id);
        Ok(())
    }
}
