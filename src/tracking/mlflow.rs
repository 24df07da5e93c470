//! MLflow tracking server client (REST API 2.0)

use parking_lot::Mutex;
use reqwest::blocking::{Client, RequestBuilder};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::{ExperimentTracker, RunStatus};
use crate::config::TrackingConfig;
use crate::error::{PipelineError, Result};

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Reports runs to an MLflow server.
///
/// The experiment is resolved by name on first use and created when it
/// does not exist. Model state is uploaded through the artifact proxy.
pub struct MlflowTracker {
    client: Client,
    uri: String,
    experiment_name: String,
    credentials: Option<(String, String)>,
    experiment_id: Mutex<Option<String>>,
}

impl MlflowTracker {
    pub fn new(uri: impl Into<String>, experiment_name: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PipelineError::TrackingError(format!("http client: {}", e)))?;
        Ok(Self {
            client,
            uri: uri.into().trim_end_matches('/').to_string(),
            experiment_name: experiment_name.into(),
            credentials: None,
            experiment_id: Mutex::new(None),
        })
    }

    pub fn from_config(config: &TrackingConfig) -> Result<Self> {
        let uri = config.tracking_uri.clone().ok_or_else(|| {
            PipelineError::TrackingError("no tracking_uri configured".to_string())
        })?;
        let mut tracker = Self::new(uri, config.experiment_name.clone())?;
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            tracker = tracker.with_credentials(user.clone(), pass.clone());
        }
        Ok(tracker)
    }

    pub fn with_credentials(mut self, username: String, password: String) -> Self {
        self.credentials = Some((username, password));
        self
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some((user, pass)) => request.basic_auth(user, Some(pass)),
            None => request,
        }
    }

    fn send(&self, request: RequestBuilder, what: &str) -> Result<Value> {
        let response = self
            .authed(request)
            .send()
            .map_err(|e| PipelineError::TrackingError(format!("{}: {}", what, e)))?;
        let status = response.status();
        let body = response.text().unwrap_or_default();
        if !status.is_success() {
            return Err(PipelineError::TrackingError(format!(
                "{} returned {}: {}",
                what, status, body
            )));
        }
        debug!(what, "mlflow call ok");
        if body.trim().is_empty() {
            Ok(Value::Null)
        } else {
            Ok(serde_json::from_str(&body)?)
        }
    }

    fn post(&self, endpoint: &str, body: Value) -> Result<Value> {
        let url = format!("{}/api/2.0/mlflow/{}", self.uri, endpoint);
        self.send(self.client.post(url).json(&body), endpoint)
    }

    fn experiment_id(&self) -> Result<String> {
        let mut cached = self.experiment_id.lock();
        if let Some(id) = cached.as_ref() {
            return Ok(id.clone());
        }

        let url = format!("{}/api/2.0/mlflow/experiments/get-by-name", self.uri);
        let lookup = self.send(
            self.client
                .get(url)
                .query(&[("experiment_name", self.experiment_name.as_str())]),
            "experiments/get-by-name",
        );
        let id = match lookup {
            Ok(found) => found["experiment"]["experiment_id"].as_str().map(str::to_string),
            Err(_) => None,
        };
        let id = match id {
            Some(id) => id,
            None => {
                let created = self.post("experiments/create", json!({ "name": self.experiment_name }))?;
                created["experiment_id"]
                    .as_str()
                    .map(str::to_string)
                    .ok_or_else(|| {
                        PipelineError::TrackingError("experiments/create returned no id".to_string())
                    })?
            }
        };
        *cached = Some(id.clone());
        Ok(id)
    }
}

impl ExperimentTracker for MlflowTracker {
    fn backend_name(&self) -> &str {
        "mlflow"
    }

    fn start_run(&self, run_name: &str) -> Result<String> {
        let experiment_id = self.experiment_id()?;
        let created = self.post(
            "runs/create",
            json!({
                "experiment_id": experiment_id,
                "run_name": run_name,
                "start_time": now_millis(),
            }),
        )?;
        created["run"]["info"]["run_id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| PipelineError::TrackingError("runs/create returned no run id".to_string()))
    }

    fn log_params(&self, run_id: &str, params: &[(String, String)]) -> Result<()> {
        let params: Vec<Value> = params
            .iter()
            .map(|(k, v)| json!({ "key": k, "value": v }))
            .collect();
        self.post("runs/log-batch", json!({ "run_id": run_id, "params": params }))?;
        Ok(())
    }

    fn log_metric(&self, run_id: &str, key: &str, value: f64) -> Result<()> {
        self.post(
            "runs/log-metric",
            json!({
                "run_id": run_id,
                "key": key,
                "value": value,
                "timestamp": now_millis(),
                "step": 0,
            }),
        )?;
        Ok(())
    }

    fn log_model(&self, run_id: &str, family: &str, model: &Value) -> Result<()> {
        let experiment_id = self.experiment_id()?;
        let url = format!(
            "{}/api/2.0/mlflow-artifacts/artifacts/{}/{}/artifacts/{}/model.json",
            self.uri, experiment_id, run_id, family
        );
        let body = serde_json::to_vec(model)?;
        self.send(self.client.put(url).body(body), "artifacts upload")?;
        self.post(
            "runs/set-tag",
            json!({ "run_id": run_id, "key": "model_family", "value": family }),
        )?;
        Ok(())
    }

    fn end_run(&self, run_id: &str, status: RunStatus) -> Result<()> {
        self.post(
            "runs/update",
            json!({
                "run_id": run_id,
                "status": status.as_str(),
                "end_time": now_millis(),
            }),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_trimmed() {
        let tracker = MlflowTracker::new("http://localhost:5000/", "churn").unwrap();
        assert_eq!(tracker.uri(), "http://localhost:5000");
    }

    #[test]
    fn test_unreachable_server_is_an_error() {
        let tracker = MlflowTracker::new("http://127.0.0.1:9", "churn").unwrap();
        assert!(matches!(tracker.start_run("trial"), Err(PipelineError::TrackingError(_))));
    }
}
