//! K-nearest neighbours classifier

use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};

use super::classifier::{check_features, check_xy, Classifier};
use super::hyper::HyperParams;
use crate::error::{PipelineError, Result};

/// Distance metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DistanceMetric {
    Euclidean,
    Manhattan,
    Minkowski(f64),
}

impl DistanceMetric {
    pub fn between(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        let diffs = a.iter().zip(b.iter()).map(|(ai, bi)| (ai - bi).abs());
        match self {
            DistanceMetric::Euclidean => diffs.map(|d| d * d).sum::<f64>().sqrt(),
            DistanceMetric::Manhattan => diffs.sum(),
            DistanceMetric::Minkowski(p) => diffs.map(|d| d.powf(*p)).sum::<f64>().powf(1.0 / p),
        }
    }
}

/// Neighbour vote weighting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightScheme {
    Uniform,
    Distance,
}

impl WeightScheme {
    fn weight(&self, dist: f64) -> f64 {
        match self {
            WeightScheme::Uniform => 1.0,
            WeightScheme::Distance => 1.0 / (dist + 1e-10),
        }
    }
}

/// Max-heap entry keeping the k smallest distances
#[derive(Debug, Clone, Copy)]
struct Neighbor(f64, usize);

impl PartialEq for Neighbor {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for Neighbor {}
impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Neighbor {
    /// Distance first, then training row, so equal distances keep the earliest rows
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .partial_cmp(&other.0)
            .unwrap_or(Ordering::Equal)
            .then(self.1.cmp(&other.1))
    }
}

/// Classifier that stores the training set and votes among the k closest rows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNeighborsClassifier {
    pub n_neighbors: usize,
    pub weights: WeightScheme,
    pub metric: DistanceMetric,
    x_train: Option<Array2<f64>>,
    y_train: Option<Array1<i64>>,
}

impl Default for KNeighborsClassifier {
    fn default() -> Self {
        Self::new(5)
    }
}

impl KNeighborsClassifier {
    pub const FAMILY: &'static str = "KNeighborsClassifier";
    const KNOWN: &'static [&'static str] = &["n_neighbors", "weights", "metric", "p"];

    pub fn new(n_neighbors: usize) -> Self {
        Self {
            n_neighbors: n_neighbors.max(1),
            weights: WeightScheme::Uniform,
            metric: DistanceMetric::Euclidean,
            x_train: None,
            y_train: None,
        }
    }

    pub fn from_params(params: &HyperParams) -> Result<Self> {
        params.ensure_known(Self::FAMILY, Self::KNOWN)?;
        let mut model = Self::new(params.usize_or("n_neighbors", 5)?);
        model.weights = match params.str_or("weights", "uniform")?.as_str() {
            "uniform" => WeightScheme::Uniform,
            "distance" => WeightScheme::Distance,
            other => {
                return Err(PipelineError::TrainingError(format!(
                    "unknown weights '{}'",
                    other
                )))
            }
        };
        let p = params.f64_or("p", 2.0)?;
        model.metric = match params.str_or("metric", "minkowski")?.as_str() {
            "euclidean" => DistanceMetric::Euclidean,
            "manhattan" => DistanceMetric::Manhattan,
            "minkowski" if p == 2.0 => DistanceMetric::Euclidean,
            "minkowski" if p == 1.0 => DistanceMetric::Manhattan,
            "minkowski" if p > 0.0 => DistanceMetric::Minkowski(p),
            other => {
                return Err(PipelineError::TrainingError(format!(
                    "unsupported metric '{}' (p = {})",
                    other, p
                )))
            }
        };
        Ok(model)
    }

    pub fn with_weights(mut self, weights: WeightScheme) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    fn training_set(&self) -> Result<(&Array2<f64>, &Array1<i64>)> {
        match (&self.x_train, &self.y_train) {
            (Some(x), Some(y)) => Ok((x, y)),
            _ => Err(PipelineError::ModelNotFitted),
        }
    }

    fn nearest(&self, point: ArrayView1<f64>, x_train: &Array2<f64>) -> Vec<Neighbor> {
        let k = self.n_neighbors.min(x_train.nrows());
        let mut heap = BinaryHeap::with_capacity(k + 1);
        for (i, row) in x_train.rows().into_iter().enumerate() {
            let candidate = Neighbor(self.metric.between(point, row), i);
            if heap.len() < k {
                heap.push(candidate);
            } else if heap.peek().is_some_and(|top| candidate < *top) {
                heap.pop();
                heap.push(candidate);
            }
        }
        heap.into_vec()
    }

    /// Weighted votes per label for every row of `x`
    fn votes(&self, x: &Array2<f64>) -> Result<Vec<BTreeMap<i64, f64>>> {
        let (x_train, y_train) = self.training_set()?;
        check_features(x, x_train.ncols())?;
        Ok((0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let mut votes = BTreeMap::new();
                for Neighbor(dist, idx) in self.nearest(x.row(i), x_train) {
                    *votes.entry(y_train[idx]).or_insert(0.0) += self.weights.weight(dist);
                }
                votes
            })
            .collect())
    }
}

impl Classifier for KNeighborsClassifier {
    fn family(&self) -> &str {
        Self::FAMILY
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
        check_xy(x, y)?;
        self.x_train = Some(x.clone());
        self.y_train = Some(y.clone());
        Ok(())
    }

    /// Ties go to the smallest label
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<i64>> {
        Ok(self
            .votes(x)?
            .into_iter()
            .map(|votes| {
                votes
                    .into_iter()
                    .fold((0i64, f64::NEG_INFINITY), |(bl, bw), (label, w)| {
                        if w > bw {
                            (label, w)
                        } else {
                            (bl, bw)
                        }
                    })
                    .0
            })
            .collect())
    }

    /// Weighted share of label 1 among the neighbours
    fn predict_scores(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self
            .votes(x)?
            .into_iter()
            .map(|votes| {
                let total: f64 = votes.values().sum();
                if total > 0.0 {
                    votes.get(&1).copied().unwrap_or(0.0) / total
                } else {
                    0.0
                }
            })
            .collect())
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

    fn clusters() -> (Array2<f64>, Array1<i64>) {
        let x = array![
            [0.0, 0.0],
            [0.5, 0.2],
            [0.1, 0.6],
            [5.0, 5.0],
            [5.5, 4.8],
            [4.9, 5.3],
        ];
        let y = array![0, 0, 0, 1, 1, 1];
        (x, y)
    }

    #[test]
    fn test_classifies_clusters() {
        let (x, y) = clusters();
        let mut knn = KNeighborsClassifier::new(3);
        knn.fit(&x, &y).unwrap();
        let preds = knn.predict(&array![[0.2, 0.1], [5.2, 5.1]]).unwrap();
        assert_eq!(preds, array![0, 1]);
    }

    #[test]
    fn test_scores_are_positive_share() {
        let (x, y) = clusters();
        let mut knn = KNeighborsClassifier::new(4);
        knn.fit(&x, &y).unwrap();
        let scores = knn.predict_scores(&array![[0.0, 0.0]]).unwrap();
        assert!((scores[0] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_distance_weighting_favours_close_rows() {
        let x = array![[0.0], [3.0], [3.1]];
        let y = array![1, 0, 0];
        let mut uniform = KNeighborsClassifier::new(3);
        let mut weighted = KNeighborsClassifier::new(3).with_weights(WeightScheme::Distance);
        uniform.fit(&x, &y).unwrap();
        weighted.fit(&x, &y).unwrap();
        let query = array![[0.1]];
        assert_eq!(uniform.predict(&query).unwrap()[0], 0);
        assert_eq!(weighted.predict(&query).unwrap()[0], 1);
    }

    #[test]
    fn test_from_params() {
        let params = HyperParams::new()
            .with("n_neighbors", ParamValue::Int(7))
            .with("weights", ParamValue::Text("distance".into()))
            .with("metric", ParamValue::Text("manhattan".into()));
        let knn = KNeighborsClassifier::from_params(&params).unwrap();
        assert_eq!(knn.n_neighbors, 7);
        assert_eq!(knn.weights, WeightScheme::Distance);
        assert_eq!(knn.metric, DistanceMetric::Manhattan);

        let bad = HyperParams::new().with("metric", ParamValue::Text("cosine".into()));
        assert!(KNeighborsClassifier::from_params(&bad).is_err());
    }
}
