//! Logistic regression for binary classification

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use super::classifier::{check_features, check_xy, Classifier};
use super::hyper::HyperParams;
use crate::error::{PipelineError, Result};

/// Regularization penalty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Penalty {
    L2,
    None,
}

/// Fitted parameters, expressed on standardized features
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LinearState {
    coefficients: Array1<f64>,
    intercept: f64,
    means: Array1<f64>,
    scales: Array1<f64>,
}

/// Logistic regression trained by full-batch gradient descent.
///
/// Features are standardized internally, so the learning rate does not
/// depend on the raw feature scale. Labels other than 1 count as negative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    state: Option<LinearState>,
    /// Inverse regularization strength
    pub c: f64,
    pub penalty: Penalty,
    pub fit_intercept: bool,
    pub max_iter: usize,
    pub tol: f64,
    pub learning_rate: f64,
    /// Iterations the last fit ran for
    pub n_iter: usize,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    pub const FAMILY: &'static str = "LogisticRegression";
    const KNOWN: &'static [&'static str] =
        &["C", "penalty", "fit_intercept", "max_iter", "tol", "learning_rate"];

    pub fn new() -> Self {
        Self {
            state: None,
            c: 1.0,
            penalty: Penalty::L2,
            fit_intercept: true,
            max_iter: 1000,
            tol: 1e-6,
            learning_rate: 0.1,
            n_iter: 0,
        }
    }

    pub fn from_params(params: &HyperParams) -> Result<Self> {
        params.ensure_known(Self::FAMILY, Self::KNOWN)?;
        let mut model = Self::new();
        model.c = params.f64_or("C", 1.0)?;
        if model.c <= 0.0 {
            return Err(PipelineError::TrainingError(format!(
                "C must be positive, got {}",
                model.c
            )));
        }
        model.penalty = match params.get("penalty") {
            None => Penalty::L2,
            Some(v) if v.is_null() => Penalty::None,
            Some(v) => match v.as_str() {
                Some("l2") => Penalty::L2,
                Some("none") => Penalty::None,
                _ => {
                    return Err(PipelineError::TrainingError(format!(
                        "unsupported penalty {} (expected l2 or none)",
                        v
                    )))
                }
            },
        };
        model.fit_intercept = params.bool_or("fit_intercept", true)?;
        model.max_iter = params.usize_or("max_iter", 1000)?.max(1);
        model.tol = params.f64_or("tol", 1e-6)?;
        model.learning_rate = params.f64_or("learning_rate", 0.1)?;
        Ok(model)
    }

    pub fn with_c(mut self, c: f64) -> Self {
        self.c = c;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    fn sigmoid(z: &Array1<f64>) -> Array1<f64> {
        z.mapv(|v| 1.0 / (1.0 + (-v).exp()))
    }

    fn standardize(x: &Array2<f64>, means: &Array1<f64>, scales: &Array1<f64>) -> Array2<f64> {
        (x - &means.view().insert_axis(Axis(0))) / &scales.view().insert_axis(Axis(0))
    }

    /// Probability of label 1
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let state = self.state.as_ref().ok_or(PipelineError::ModelNotFitted)?;
        check_features(x, state.coefficients.len())?;
        let z = Self::standardize(x, &state.means, &state.scales);
        Ok(Self::sigmoid(&(z.dot(&state.coefficients) + state.intercept)))
    }

    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.state.as_ref().map(|s| &s.coefficients)
    }
}

impl Classifier for LogisticRegression {
    fn family(&self) -> &str {
        Self::FAMILY
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
        check_xy(x, y)?;
        let n_samples = x.nrows() as f64;
        let n_features = x.ncols();

        let means = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(n_features));
        let scales = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 1e-12 { s } else { 1.0 });
        let z = Self::standardize(x, &means, &scales);
        let target = y.mapv(|label| if label == 1 { 1.0 } else { 0.0 });

        let alpha = match self.penalty {
            Penalty::L2 => 1.0 / (self.c * n_samples),
            Penalty::None => 0.0,
        };
        let lr = self.learning_rate;

        let mut weights: Array1<f64> = Array1::zeros(n_features);
        let mut bias = 0.0;
        self.n_iter = 0;

        for _ in 0..self.max_iter {
            self.n_iter += 1;
            let predictions = Self::sigmoid(&(z.dot(&weights) + bias));
            let errors = &predictions - &target;
            let dw = z.t().dot(&errors) / n_samples + alpha * &weights;
            let db = if self.fit_intercept {
                errors.mean().unwrap_or(0.0)
            } else {
                0.0
            };

            let grad_norm = (dw.mapv(|v| v * v).sum() + db * db).sqrt();
            if grad_norm < self.tol {
                break;
            }
            weights = weights - lr * dw;
            bias -= lr * db;
        }

        if weights.iter().any(|w| !w.is_finite()) || !bias.is_finite() {
            return Err(PipelineError::TrainingError(
                "logistic regression diverged; lower learning_rate".to_string(),
            ));
        }

        self.state = Some(LinearState {
            coefficients: weights,
            intercept: bias,
            means,
            scales,
        });
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<i64>> {
        Ok(self.predict_proba(x)?.mapv(|p| if p >= 0.5 { 1 } else { 0 }))
    }

    fn predict_scores(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.predict_proba(x)
    }

    fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParamValue;
    use ndarray::array;

    fn linearly_separable() -> (Array2<f64>, Array1<i64>) {
        let x = array![
            [1.0, 200.0],
            [2.0, 180.0],
            [1.5, 210.0],
            [2.5, 190.0],
            [8.0, 20.0],
            [9.0, 35.0],
            [8.5, 10.0],
            [7.5, 25.0],
        ];
        let y = array![0, 0, 0, 0, 1, 1, 1, 1];
        (x, y)
    }

    #[test]
    fn test_fits_separable_data() {
        let (x, y) = linearly_separable();
        let mut model = LogisticRegression::new();
        model.fit(&x, &y).unwrap();
        assert_eq!(model.predict(&x).unwrap(), y);

        let proba = model.predict_proba(&x).unwrap();
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
        assert!(proba[0] < 0.5 && proba[4] > 0.5);
    }

    #[test]
    fn test_stronger_regularization_shrinks_weights() {
        let (x, y) = linearly_separable();
        let mut loose = LogisticRegression::new().with_c(100.0);
        let mut tight = LogisticRegression::new().with_c(0.01);
        loose.fit(&x, &y).unwrap();
        tight.fit(&x, &y).unwrap();
        let norm = |m: &LogisticRegression| m.coefficients().unwrap().mapv(|w| w * w).sum();
        assert!(norm(&tight) < norm(&loose));
    }

    #[test]
    fn test_from_params() {
        let params = HyperParams::new()
            .with("C", ParamValue::Float(0.5))
            .with("max_iter", ParamValue::Int(200));
        let model = LogisticRegression::from_params(&params).unwrap();
        assert_eq!(model.c, 0.5);
        assert_eq!(model.max_iter, 200);

        let bad = HyperParams::new().with("penalty", ParamValue::Text("l1".into()));
        assert!(LogisticRegression::from_params(&bad).is_err());
        let negative = HyperParams::new().with("C", ParamValue::Float(-1.0));
        assert!(LogisticRegression::from_params(&negative).is_err());
    }

    #[test]
    fn test_predict_before_fit() {
        let model = LogisticRegression::new();
        assert!(matches!(model.predict(&array![[1.0, 2.0]]), Err(PipelineError::ModelNotFitted)));
    }
}
