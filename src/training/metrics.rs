//! Binary classification metrics, positive class = label 1

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::error::{PipelineError, Result};

/// Confusion matrix counts for the positive class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionCounts {
    pub tp: usize,
    pub fp: usize,
    pub tn: usize,
    pub fn_: usize,
}

impl ConfusionCounts {
    pub fn from_labels(y_true: &Array1<i64>, y_pred: &Array1<i64>) -> Self {
        let mut counts = Self::default();
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            match (t == 1, p == 1) {
                (true, true) => counts.tp += 1,
                (false, true) => counts.fp += 1,
                (false, false) => counts.tn += 1,
                (true, false) => counts.fn_ += 1,
            }
        }
        counts
    }

    fn ratio(num: usize, den: usize) -> f64 {
        if den > 0 {
            num as f64 / den as f64
        } else {
            0.0
        }
    }

    pub fn precision(&self) -> f64 {
        Self::ratio(self.tp, self.tp + self.fp)
    }

    pub fn recall(&self) -> f64 {
        Self::ratio(self.tp, self.tp + self.fn_)
    }

    pub fn specificity(&self) -> f64 {
        Self::ratio(self.tn, self.tn + self.fp)
    }

    pub fn accuracy(&self) -> f64 {
        Self::ratio(self.tp + self.tn, self.tp + self.tn + self.fp + self.fn_)
    }

    pub fn fbeta(&self, beta: f64) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        let b2 = beta * beta;
        if b2 * p + r > 0.0 {
            (1.0 + b2) * p * r / (b2 * p + r)
        } else {
            0.0
        }
    }

    fn both_classes_present(&self) -> bool {
        self.tp + self.fn_ > 0 && self.tn + self.fp > 0
    }
}

/// Scalar scores of one model on one labelled partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub fbeta: f64,
    /// ROC AUC of the hard predictions
    pub roc_auc: f64,
    /// Area under the ROC curve traced by the continuous scores
    pub auc_area: f64,
    pub confusion: ConfusionCounts,
}

impl ClassificationMetrics {
    /// Scores `y_pred` (and `scores`, when the model has them) against `y_true`.
    ///
    /// Both AUC values are 0.5 when `y_true` holds a single class.
    pub fn compute(
        y_true: &Array1<i64>,
        y_pred: &Array1<i64>,
        scores: Option<&Array1<f64>>,
        beta: f64,
    ) -> Result<Self> {
        if y_true.len() != y_pred.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("{} predictions", y_true.len()),
                actual: format!("{} predictions", y_pred.len()),
            });
        }
        if y_true.is_empty() {
            return Err(PipelineError::EvaluationError(
                "cannot score an empty partition".to_string(),
            ));
        }

        let confusion = ConfusionCounts::from_labels(y_true, y_pred);
        let (roc_auc, auc_area) = if confusion.both_classes_present() {
            let hard = (confusion.recall() + confusion.specificity()) / 2.0;
            let area = match scores {
                Some(s) if s.len() == y_true.len() => roc_area(y_true, s),
                Some(s) => {
                    return Err(PipelineError::ShapeError {
                        expected: format!("{} scores", y_true.len()),
                        actual: format!("{} scores", s.len()),
                    })
                }
                None => hard,
            };
            (hard, area)
        } else {
            (0.5, 0.5)
        };

        Ok(Self {
            accuracy: confusion.accuracy(),
            precision: confusion.precision(),
            recall: confusion.recall(),
            f1: confusion.fbeta(1.0),
            fbeta: confusion.fbeta(beta),
            roc_auc,
            auc_area,
            confusion,
        })
    }

    /// Named values as reported to experiment tracking
    pub fn as_pairs(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("accuracy", self.accuracy),
            ("precision", self.precision),
            ("recall", self.recall),
            ("f1", self.f1),
            ("roc_auc", self.roc_auc),
        ]
    }
}

/// Trapezoidal area under the ROC curve; tied scores form one step
fn roc_area(y_true: &Array1<i64>, scores: &Array1<f64>) -> f64 {
    let mut ranked: Vec<(f64, bool)> = scores
        .iter()
        .zip(y_true.iter())
        .map(|(&s, &t)| (s, t == 1))
        .collect();
    ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

    let positives = ranked.iter().filter(|(_, p)| *p).count() as f64;
    let negatives = ranked.len() as f64 - positives;

    let (mut tp, mut fp) = (0.0, 0.0);
    let (mut prev_tpr, mut prev_fpr) = (0.0, 0.0);
    let mut area = 0.0;
    let mut i = 0;
    while i < ranked.len() {
        let threshold = ranked[i].0;
        while i < ranked.len() && ranked[i].0 == threshold {
            if ranked[i].1 {
                tp += 1.0;
            } else {
                fp += 1.0;
            }
            i += 1;
        }
        let (tpr, fpr) = (tp / positives, fp / negatives);
        area += (fpr - prev_fpr) * (tpr + prev_tpr) / 2.0;
        prev_tpr = tpr;
        prev_fpr = fpr;
    }
    area
}
