//! Grid search over the configured model families

use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::classifier::{Classifier, ModelRegistry};
use super::dataset::frame_to_xy;
use super::hyper::{expand_grid, HyperParams};
use super::metrics::ClassificationMetrics;
use crate::artifacts::{load_json, read_csv, save_json};
use crate::config::ModelTrainerConfig;
use crate::error::{PipelineError, Result, StageKind};
use crate::tracking::{ExperimentTracker, NoopTracker, RunStatus};

/// Where the search currently is
#[derive(Debug, Clone, PartialEq)]
pub enum SearchState {
    Idle,
    Running { alias: String, params: HyperParams },
    Scored { alias: String, recall: f64 },
    Done,
}

/// One fit of one family with one hyperparameter combination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialRecord {
    pub alias: String,
    pub family: String,
    pub params: HyperParams,
    pub metrics: ClassificationMetrics,
    pub fit_secs: f64,
    /// Run id when the tracker accepted the run
    pub run_id: Option<String>,
}

/// Persisted winner of a search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BestModelArtifact {
    pub family: String,
    pub alias: String,
    pub model_class: String,
    pub params: HyperParams,
    pub recall: f64,
    pub feature_names: Vec<String>,
    pub target_column: String,
    pub trained_at: DateTime<Utc>,
    /// Fitted state, restored through the family's registry entry
    pub model: serde_json::Value,
}

impl BestModelArtifact {
    pub fn save(&self, path: &Path) -> Result<()> {
        save_json(path, self)
    }

    pub fn load(path: &Path) -> Result<Self> {
        load_json(path)
    }

    pub fn restore(&self, registry: &ModelRegistry) -> Result<Box<dyn Classifier>> {
        registry.resolve(&self.family)?.restore(self.model.clone())
    }
}

/// Result of [`ModelTrainer::train`]
pub struct TrainingOutcome {
    pub model: Box<dyn Classifier>,
    pub family: String,
    pub alias: String,
    pub best_recall: f64,
    pub trials: Vec<TrialRecord>,
    pub model_path: PathBuf,
}

impl std::fmt::Debug for TrainingOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainingOutcome")
            .field("family", &self.family)
            .field("alias", &self.alias)
            .field("best_recall", &self.best_recall)
            .field("trials", &self.trials.len())
            .field("model_path", &self.model_path)
            .finish()
    }
}

/// Best trial so far
pub struct SearchWinner {
    pub model: Box<dyn Classifier>,
    pub trial: usize,
    pub recall: f64,
}

impl std::fmt::Debug for SearchWinner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchWinner")
            .field("trial", &self.trial)
            .field("recall", &self.recall)
            .finish()
    }
}

pub struct ModelTrainer {
    config: ModelTrainerConfig,
    registry: ModelRegistry,
    tracker: Arc<dyn ExperimentTracker>,
    state: SearchState,
}

impl ModelTrainer {
    pub fn new(config: ModelTrainerConfig) -> Self {
        Self {
            config,
            registry: ModelRegistry::with_builtins(),
            tracker: Arc::new(NoopTracker),
            state: SearchState::Idle,
        }
    }

    pub fn with_registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_tracker(mut self, tracker: Arc<dyn ExperimentTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn state(&self) -> &SearchState {
        &self.state
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    fn transition(&mut self, next: SearchState) {
        debug!(from = ?self.state, to = ?next, "search state");
        self.state = next;
    }

    /// Report one trial; any tracker failure is logged and dropped
    fn track_trial(&self, run_name: &str, trial: &TrialRecord, model: &dyn Classifier) -> Option<String> {
        let tracker = &self.tracker;
        let run_id = match tracker.start_run(run_name) {
            Ok(id) => id,
            Err(e) => {
                warn!(run = run_name, error = %e, "experiment tracking unavailable for trial");
                return None;
            }
        };

        let mut params = trial.params.to_strings();
        params.push(("model_family".to_string(), trial.family.clone()));
        let logged = tracker
            .log_params(&run_id, &params)
            .and_then(|_| {
                trial
                    .metrics
                    .as_pairs()
                    .into_iter()
                    .try_for_each(|(key, value)| tracker.log_metric(&run_id, key, value))
            })
            .and_then(|_| model.to_json())
            .and_then(|state| tracker.log_model(&run_id, &trial.family, &state));

        let status = if logged.is_ok() { RunStatus::Finished } else { RunStatus::Failed };
        if let Err(e) = logged {
            warn!(run = run_name, error = %e, "failed to log trial");
        }
        if let Err(e) = tracker.end_run(&run_id, status) {
            warn!(run = run_name, error = %e, "failed to close tracking run");
        }
        Some(run_id)
    }

    /// Fit every family x combination on the train arrays, score on the
    /// test arrays and keep the model with the highest recall. The first
    /// trial to reach the maximum wins.
    pub fn search(
        &mut self,
        x_train: &Array2<f64>,
        y_train: &Array1<i64>,
        x_test: &Array2<f64>,
        y_test: &Array1<i64>,
    ) -> Result<(SearchWinner, Vec<TrialRecord>)> {
        if self.config.models.is_empty() {
            return Err(PipelineError::TrainingError("no model families configured".to_string()));
        }

        let mut trials: Vec<TrialRecord> = Vec::new();
        let mut best: Option<SearchWinner> = None;
        let models = self.config.models.clone();

        for (alias, spec) in models.iter() {
            let family = self.registry.resolve(&spec.model_class)?.clone();
            let combos = expand_grid(&spec.params);
            if combos.is_empty() {
                warn!(model = %alias, "hyperparameter grid has an empty value list, skipping");
                continue;
            }
            info!(model = %alias, family = family.name(), combinations = combos.len(), "searching");

            for params in combos {
                self.transition(SearchState::Running {
                    alias: alias.clone(),
                    params: params.clone(),
                });

                let started = Instant::now();
                let mut model = family.build(&params)?;
                model.fit(x_train, y_train)?;
                let fit_secs = started.elapsed().as_secs_f64();

                let y_pred = model.predict(x_test)?;
                let scores = model.predict_scores(x_test)?;
                let metrics = ClassificationMetrics::compute(y_test, &y_pred, Some(&scores), 1.0)?;
                let recall = metrics.recall;
                self.transition(SearchState::Scored {
                    alias: alias.clone(),
                    recall,
                });

                let mut trial = TrialRecord {
                    alias: alias.clone(),
                    family: family.name().to_string(),
                    params,
                    metrics,
                    fit_secs,
                    run_id: None,
                };
                let run_name = format!("{}-{}", alias, trials.len());
                trial.run_id = self.track_trial(&run_name, &trial, model.as_ref());

                info!(
                    trial = trials.len(),
                    model = %alias,
                    params = ?trial.params.to_strings(),
                    accuracy = trial.metrics.accuracy,
                    f1 = trial.metrics.f1,
                    recall,
                    roc_auc = trial.metrics.roc_auc,
                    "trial scored"
                );

                if best.as_ref().map_or(true, |b| recall > b.recall) {
                    best = Some(SearchWinner {
                        model,
                        trial: trials.len(),
                        recall,
                    });
                }
                trials.push(trial);
                self.transition(SearchState::Idle);
            }
        }

        self.transition(SearchState::Done);
        let best = best.ok_or_else(|| {
            PipelineError::TrainingError("hyperparameter grid produced no trials".to_string())
        })?;
        Ok((best, trials))
    }

    /// Read the train/test partitions, run the search and persist the winner
    pub fn train(&mut self) -> Result<TrainingOutcome> {
        self.run().map_err(|e| e.in_stage(StageKind::Training))
    }

    fn run(&mut self) -> Result<TrainingOutcome> {
        let target = self.config.target_column.clone();
        let train_df = read_csv(&self.config.train_data_path)?;
        let test_df = read_csv(&self.config.test_data_path)?;
        let (x_train, y_train, feature_names) = frame_to_xy(&train_df, &target)?;
        let (x_test, y_test, test_features) = frame_to_xy(&test_df, &target)?;
        if feature_names != test_features {
            return Err(PipelineError::TrainingError(format!(
                "train and test partitions disagree on features: {:?} vs {:?}",
                feature_names, test_features
            )));
        }
        info!(
            train_rows = x_train.nrows(),
            test_rows = x_test.nrows(),
            features = feature_names.len(),
            "loaded partitions"
        );

        let (winner, trials) = self.search(&x_train, &y_train, &x_test, &y_test)?;
        let best = &trials[winner.trial];
        let model_class = self
            .config
            .models
            .get(&best.alias)
            .map(|spec| spec.model_class.clone())
            .unwrap_or_else(|| best.family.clone());

        let artifact = BestModelArtifact {
            family: best.family.clone(),
            alias: best.alias.clone(),
            model_class,
            params: best.params.clone(),
            recall: winner.recall,
            feature_names,
            target_column: target,
            trained_at: Utc::now(),
            model: winner.model.to_json()?,
        };
        let model_path = self.config.model_path();
        artifact.save(&model_path)?;
        info!(
            model = %artifact.alias,
            family = %artifact.family,
            recall = artifact.recall,
            path = %model_path.display(),
            "saved best model"
        );

        Ok(TrainingOutcome {
            model: winner.model,
            family: artifact.family,
            alias: artifact.alias,
            best_recall: winner.recall,
            trials,
            model_path,
        })
    }
}
