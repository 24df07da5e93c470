//! Params document: split/balancing knobs and the hyperparameter grids

use serde::{Deserialize, Serialize};
use std::fmt;

use super::OrderedMap;

/// A single scalar hyperparameter value as written in the params document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Non-negative integer view; floats with no fractional part count.
    pub fn as_usize(&self) -> Option<usize> {
        match self {
            ParamValue::Int(v) if *v >= 0 => Some(*v as usize),
            ParamValue::Float(v) if *v >= 0.0 && v.fract() == 0.0 => Some(*v as usize),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ParamValue::Null)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Null => f.write_str("None"),
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Text(v) => f.write_str(v),
        }
    }
}

/// One candidate model family and its grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub model_class: String,
    #[serde(default)]
    pub params: OrderedMap<String, Vec<ParamValue>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformationParams {
    pub test_size: f64,
    pub random_state: u64,
    pub smote_threshold: f64,
    #[serde(default = "default_encoding")]
    pub encoding: String,
    #[serde(default = "default_smote_k")]
    pub smote_k_neighbors: usize,
}

fn default_encoding() -> String {
    "label_encoding".to_string()
}

fn default_smote_k() -> usize {
    5
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationParams {
    #[serde(default = "default_beta")]
    pub fbeta_beta: f64,
}

impl Default for EvaluationParams {
    fn default() -> Self {
        Self { fbeta_beta: default_beta() }
    }
}

fn default_beta() -> f64 {
    1.0
}

/// Parsed `params.yaml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamsConfig {
    pub data_transformation: TransformationParams,
    #[serde(default)]
    pub model_evaluation: EvaluationParams,
    #[serde(default)]
    pub models: OrderedMap<String, ModelSpec>,
}

impl ParamsConfig {
    pub(crate) fn check(&self) -> std::result::Result<(), String> {
        let t = &self.data_transformation;
        if !(t.test_size > 0.0 && t.test_size < 1.0) {
            return Err(format!(
                "data_transformation.test_size must be in (0, 1), got {}",
                t.test_size
            ));
        }
        if !(0.0..=1.0).contains(&t.smote_threshold) {
            return Err(format!(
                "data_transformation.smote_threshold must be in [0, 1], got {}",
                t.smote_threshold
            ));
        }
        if t.smote_k_neighbors == 0 {
            return Err("data_transformation.smote_k_neighbors must be positive".to_string());
        }
        if self.model_evaluation.fbeta_beta <= 0.0 {
            return Err("model_evaluation.fbeta_beta must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_value_untagged() {
        let yaml = "[null, true, 3, 0.5, gini]";
        let values: Vec<ParamValue> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            values,
            vec![
                ParamValue::Null,
                ParamValue::Bool(true),
                ParamValue::Int(3),
                ParamValue::Float(0.5),
                ParamValue::Text("gini".into()),
            ]
        );
        assert_eq!(values[2].as_usize(), Some(3));
        assert_eq!(values[3].as_f64(), Some(0.5));
    }

    #[test]
    fn test_params_defaults_and_order() {
        let yaml = r#"
data_transformation:
  test_size: 0.2
  random_state: 42
  smote_threshold: 0.7
models:
  rf:
    model_class: sklearn.ensemble.RandomForestClassifier
    params:
      n_estimators: [10, 50]
      max_depth: [3]
  lr:
    model_class: LogisticRegression
"#;
        let params: ParamsConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(params.data_transformation.encoding, "label_encoding");
        assert_eq!(params.data_transformation.smote_k_neighbors, 5);
        assert_eq!(params.model_evaluation.fbeta_beta, 1.0);
        let aliases: Vec<&String> = params.models.keys().collect();
        assert_eq!(aliases, vec!["rf", "lr"]);
        assert!(params.models.get("lr").unwrap().params.is_empty());
        assert!(params.check().is_ok());
    }

    #[test]
    fn test_check_rejects_bad_test_size() {
        let yaml = "data_transformation:\n  test_size: 1.5\n  random_state: 1\n  smote_threshold: 0.5\n";
        let params: ParamsConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(params.check().is_err());
    }
}
