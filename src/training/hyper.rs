//! Concrete hyperparameter combinations and grid expansion

use serde::{Deserialize, Serialize};

use crate::config::{OrderedMap, ParamValue};
use crate::error::{PipelineError, Result};

/// One concrete hyperparameter assignment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HyperParams(OrderedMap<String, ParamValue>);

impl HyperParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: ParamValue) -> Self {
        self.0.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fail on any name `family` does not understand
    pub fn ensure_known(&self, family: &str, known: &[&str]) -> Result<()> {
        for name in self.0.keys() {
            if !known.contains(&name.as_str()) {
                return Err(PipelineError::TrainingError(format!(
                    "unknown hyperparameter '{}' for {} (expected one of: {})",
                    name,
                    family,
                    known.join(", ")
                )));
            }
        }
        Ok(())
    }

    fn invalid(name: &str, value: &ParamValue, wanted: &str) -> PipelineError {
        PipelineError::TrainingError(format!(
            "hyperparameter '{}' must be {}, got {}",
            name, wanted, value
        ))
    }

    pub fn usize_or(&self, name: &str, default: usize) -> Result<usize> {
        match self.get(name) {
            None => Ok(default),
            Some(v) => v.as_usize().ok_or_else(|| Self::invalid(name, v, "a non-negative integer")),
        }
    }

    /// Optional integer; an explicit null means "no limit"
    pub fn opt_usize(&self, name: &str, default: Option<usize>) -> Result<Option<usize>> {
        match self.get(name) {
            None => Ok(default),
            Some(v) if v.is_null() => Ok(None),
            Some(v) => v
                .as_usize()
                .map(Some)
                .ok_or_else(|| Self::invalid(name, v, "a non-negative integer or null")),
        }
    }

    pub fn f64_or(&self, name: &str, default: f64) -> Result<f64> {
        match self.get(name) {
            None => Ok(default),
            Some(v) => v.as_f64().ok_or_else(|| Self::invalid(name, v, "a number")),
        }
    }

    pub fn bool_or(&self, name: &str, default: bool) -> Result<bool> {
        match self.get(name) {
            None => Ok(default),
            Some(ParamValue::Bool(b)) => Ok(*b),
            Some(v) => Err(Self::invalid(name, v, "a boolean")),
        }
    }

    pub fn str_or(&self, name: &str, default: &str) -> Result<String> {
        match self.get(name) {
            None => Ok(default.to_string()),
            Some(v) => v
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| Self::invalid(name, v, "a string")),
        }
    }

    /// Stringified pairs, for experiment tracking
    pub fn to_strings(&self) -> Vec<(String, String)> {
        self.0.iter().map(|(k, v)| (k.clone(), v.to_string())).collect()
    }
}

/// Cartesian product of a grid, first parameter varying slowest.
///
/// An empty grid yields one empty combination; a parameter with no
/// candidate values yields none.
pub fn expand_grid(grid: &OrderedMap<String, Vec<ParamValue>>) -> Vec<HyperParams> {
    let axes: Vec<(&String, &Vec<ParamValue>)> = grid.iter().collect();
    if axes.iter().any(|(_, values)| values.is_empty()) {
        return Vec::new();
    }

    let total: usize = axes.iter().map(|(_, values)| values.len()).product();
    let mut combos = Vec::with_capacity(total);
    let mut odometer = vec![0usize; axes.len()];

    for _ in 0..total {
        let combo = axes
            .iter()
            .zip(&odometer)
            .fold(HyperParams::new(), |params, ((name, values), &i)| {
                params.with(name.as_str(), values[i].clone())
            });
        combos.push(combo);

        for pos in (0..axes.len()).rev() {
            odometer[pos] += 1;
            if odometer[pos] < axes[pos].1.len() {
                break;
            }
            odometer[pos] = 0;
        }
    }
    combos
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> OrderedMap<String, Vec<ParamValue>> {
        let mut grid = OrderedMap::new();
        grid.insert("max_depth".to_string(), vec![ParamValue::Int(2), ParamValue::Null]);
        grid.insert(
            "criterion".to_string(),
            vec![ParamValue::Text("gini".into()), ParamValue::Text("entropy".into())],
        );
        grid
    }

    #[test]
    fn test_expand_grid_order() {
        let combos = expand_grid(&grid());
        assert_eq!(combos.len(), 4);
        let rendered: Vec<Vec<(String, String)>> = combos.iter().map(|c| c.to_strings()).collect();
        assert_eq!(rendered[0], vec![("max_depth".into(), "2".into()), ("criterion".into(), "gini".into())]);
        assert_eq!(rendered[1], vec![("max_depth".into(), "2".into()), ("criterion".into(), "entropy".into())]);
        assert_eq!(rendered[2], vec![("max_depth".into(), "None".into()), ("criterion".into(), "gini".into())]);
        assert_eq!(rendered[3], vec![("max_depth".into(), "None".into()), ("criterion".into(), "entropy".into())]);
    }

    #[test]
    fn test_empty_grid_is_single_default_trial() {
        let combos = expand_grid(&OrderedMap::new());
        assert_eq!(combos.len(), 1);
        assert!(combos[0].is_empty());
    }

    #[test]
    fn test_empty_value_list_yields_nothing() {
        let mut g = grid();
        g.insert("n_estimators".to_string(), vec![]);
        assert!(expand_grid(&g).is_empty());
    }

    #[test]
    fn test_typed_getters() {
        let params = HyperParams::new()
            .with("max_depth", ParamValue::Null)
            .with("C", ParamValue::Int(2))
            .with("criterion", ParamValue::Text("gini".into()));
        assert_eq!(params.opt_usize("max_depth", Some(3)).unwrap(), None);
        assert_eq!(params.f64_or("C", 1.0).unwrap(), 2.0);
        assert_eq!(params.usize_or("min_samples_leaf", 1).unwrap(), 1);
        assert!(params.usize_or("criterion", 1).is_err());
        assert!(params.ensure_known("Tree", &["max_depth", "C"]).is_err());
        assert!(params.ensure_known("Tree", &["max_depth", "C", "criterion"]).is_ok());
    }
}
