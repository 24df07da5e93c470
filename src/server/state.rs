//! Application state shared across handlers

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::ConfigurationManager;
use crate::error::Result;
use crate::prediction::ModelPredictor;
use crate::tracking::ExperimentTracker;
use crate::training::ModelRegistry;

pub struct AppState {
    pub manager: ConfigurationManager,
    pub predictor: ModelPredictor,
    pub registry: ModelRegistry,
    /// Overrides the tracker from the config when set
    pub tracker: Option<Arc<dyn ExperimentTracker>>,
    /// Held for the duration of an offline run; one at a time
    pub training: Mutex<()>,
}

impl AppState {
    pub fn new(manager: ConfigurationManager) -> Result<Self> {
        Self::with_registry(manager, ModelRegistry::with_builtins())
    }

    pub fn with_registry(manager: ConfigurationManager, registry: ModelRegistry) -> Result<Self> {
        let predictor = ModelPredictor::new(manager.model_prediction_config()?).with_registry(registry.clone());
        Ok(Self {
            manager,
            predictor,
            registry,
            tracker: None,
            training: Mutex::new(()),
        })
    }

    pub fn with_tracker(mut self, tracker: Arc<dyn ExperimentTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }
}
