//! Classifier capability and the family registry

use ndarray::{Array1, Array2};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::decision_tree::DecisionTreeClassifier;
use super::hyper::HyperParams;
use super::knn::KNeighborsClassifier;
use super::logistic::LogisticRegression;
use super::random_forest::RandomForestClassifier;
use crate::error::{PipelineError, Result};

/// A trainable binary/multiclass classifier over dense f64 features
pub trait Classifier: Send + Sync {
    /// Registered family name, e.g. `RandomForestClassifier`
    fn family(&self) -> &str;

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()>;

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<i64>>;

    /// Score for the positive class (label 1), higher meaning more likely.
    /// Families without a natural score fall back to the hard predictions.
    fn predict_scores(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self.predict(x)?.mapv(|v| if v == 1 { 1.0 } else { 0.0 }))
    }

    /// Fitted state, restorable through the family's registry entry
    fn to_json(&self) -> Result<serde_json::Value>;
}

pub type BuildFn = Arc<dyn Fn(&HyperParams) -> Result<Box<dyn Classifier>> + Send + Sync>;
pub type RestoreFn = Arc<dyn Fn(serde_json::Value) -> Result<Box<dyn Classifier>> + Send + Sync>;

/// Factory pair for one model family
#[derive(Clone)]
pub struct ModelFamily {
    name: String,
    build: BuildFn,
    restore: RestoreFn,
}

impl ModelFamily {
    pub fn new(name: impl Into<String>, build: BuildFn, restore: RestoreFn) -> Self {
        Self {
            name: name.into(),
            build,
            restore,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn build(&self, params: &HyperParams) -> Result<Box<dyn Classifier>> {
        (self.build)(params)
    }

    pub fn restore(&self, state: serde_json::Value) -> Result<Box<dyn Classifier>> {
        (self.restore)(state)
    }
}

impl fmt::Debug for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelFamily").field("name", &self.name).finish()
    }
}

/// Model families by name.
///
/// Configured class paths such as `sklearn.ensemble.RandomForestClassifier`
/// resolve by their last segment.
#[derive(Clone, Debug, Default)]
pub struct ModelRegistry {
    families: HashMap<String, ModelFamily>,
}

fn restore_as<T>(state: serde_json::Value) -> Result<Box<dyn Classifier>>
where
    T: Classifier + serde::de::DeserializeOwned + 'static,
{
    let model: T = serde_json::from_value(state)?;
    Ok(Box::new(model))
}

impl ModelRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the built-in families
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(ModelFamily::new(
            LogisticRegression::FAMILY,
            Arc::new(|p: &HyperParams| Ok(Box::new(LogisticRegression::from_params(p)?) as Box<dyn Classifier>)),
            Arc::new(restore_as::<LogisticRegression>),
        ));
        registry.register(ModelFamily::new(
            DecisionTreeClassifier::FAMILY,
            Arc::new(|p: &HyperParams| Ok(Box::new(DecisionTreeClassifier::from_params(p)?) as Box<dyn Classifier>)),
            Arc::new(restore_as::<DecisionTreeClassifier>),
        ));
        registry.register(ModelFamily::new(
            RandomForestClassifier::FAMILY,
            Arc::new(|p: &HyperParams| Ok(Box::new(RandomForestClassifier::from_params(p)?) as Box<dyn Classifier>)),
            Arc::new(restore_as::<RandomForestClassifier>),
        ));
        registry.register(ModelFamily::new(
            KNeighborsClassifier::FAMILY,
            Arc::new(|p: &HyperParams| Ok(Box::new(KNeighborsClassifier::from_params(p)?) as Box<dyn Classifier>)),
            Arc::new(restore_as::<KNeighborsClassifier>),
        ));
        registry
    }

    pub fn register(&mut self, family: ModelFamily) {
        self.families.insert(family.name.clone(), family);
    }

    /// Last path segment of a configured class name
    pub fn family_name(model_class: &str) -> &str {
        model_class.rsplit('.').next().unwrap_or(model_class).trim()
    }

    pub fn resolve(&self, model_class: &str) -> Result<&ModelFamily> {
        let name = Self::family_name(model_class);
        self.families.get(name).ok_or_else(|| {
            let mut known: Vec<&str> = self.families.keys().map(String::as_str).collect();
            known.sort_unstable();
            PipelineError::TrainingError(format!(
                "unknown model family '{}' (registered: {})",
                model_class,
                known.join(", ")
            ))
        })
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.families.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Check `x` and `y` agree on the number of rows
pub(crate) fn check_xy(x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(PipelineError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if x.nrows() == 0 {
        return Err(PipelineError::TrainingError("cannot fit on an empty training set".to_string()));
    }
    Ok(())
}

/// Check a prediction input has the fitted feature count
pub(crate) fn check_features(x: &Array2<f64>, n_features: usize) -> Result<()> {
    if x.ncols() != n_features {
        return Err(PipelineError::ShapeError {
            expected: format!("{} features", n_features),
            actual: format!("{} features", x.ncols()),
        });
    }
    Ok(())
}
