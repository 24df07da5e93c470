//! SMOTE oversampling for the training partition

use ndarray::{Array1, Array2, Axis};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;

use crate::error::{PipelineError, Result};
use crate::training::DistanceMetric;

/// Result of resampling
#[derive(Debug, Clone)]
pub struct ResampleResult {
    /// Original rows followed by the synthetic rows
    pub x: Array2<f64>,
    pub y: Array1<i64>,
    /// Synthetic rows generated per class, in class order
    pub n_synthetic: BTreeMap<i64, usize>,
}

/// Trait for samplers
pub trait Sampler: Send + Sync {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()>;

    fn resample(&self, x: &Array2<f64>, y: &Array1<i64>) -> Result<ResampleResult>;

    fn fit_resample(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<ResampleResult> {
        self.fit(x, y)?;
        self.resample(x, y)
    }
}

/// Class distribution, ordered by label
pub fn class_counts(y: &Array1<i64>) -> BTreeMap<i64, usize> {
    let mut counts = BTreeMap::new();
    for &label in y.iter() {
        *counts.entry(label).or_insert(0) += 1;
    }
    counts
}

/// Row indices per class, ordered by label
pub fn class_indices(y: &Array1<i64>) -> BTreeMap<i64, Vec<usize>> {
    let mut indices = BTreeMap::new();
    for (i, &label) in y.iter().enumerate() {
        indices.entry(label).or_insert_with(Vec::new).push(i);
    }
    indices
}

/// Share of the rarest class; 1.0 when there is a single class
pub fn minority_proportion(y: &Array1<i64>) -> f64 {
    let counts = class_counts(y);
    if counts.len() < 2 || y.is_empty() {
        return 1.0;
    }
    let min = counts.values().copied().min().unwrap_or(0);
    min as f64 / y.len() as f64
}

/// Synthetic Minority Over-sampling Technique.
///
/// Every class smaller than the majority is grown to the majority count
/// by interpolating between a random member and one of its `k` nearest
/// same-class neighbours.
#[derive(Debug, Clone)]
pub struct Smote {
    k_neighbors: usize,
    seed: u64,
    target_counts: Option<BTreeMap<i64, usize>>,
}

impl Smote {
    pub fn new(seed: u64) -> Self {
        Self {
            k_neighbors: 5,
            seed,
            target_counts: None,
        }
    }

    pub fn with_k_neighbors(mut self, k: usize) -> Self {
        self.k_neighbors = k.max(1);
        self
    }

    /// `k` nearest rows of `members` to row `of`, skipping itself and
    /// exact copies; ascending row order.
    fn nearest(members: &Array2<f64>, of: usize, k: usize) -> Vec<usize> {
        let point = members.row(of);
        let mut ranked: Vec<(f64, usize)> = members
            .outer_iter()
            .enumerate()
            .filter(|(i, _)| *i != of)
            .map(|(i, row)| (DistanceMetric::Euclidean.between(point, row), i))
            .filter(|(dist, _)| *dist > 0.0)
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        ranked.truncate(k);

        let mut rows: Vec<usize> = ranked.into_iter().map(|(_, i)| i).collect();
        rows.sort_unstable();
        rows
    }

    /// New rows for one class, drawn from its `members`
    fn synthesize(&self, members: &Array2<f64>, count: usize, rng: &mut ChaCha8Rng) -> Vec<Array1<f64>> {
        let n = members.nrows();
        let k = self.k_neighbors.min(n.saturating_sub(1)).max(1);
        let neighbours: Vec<Vec<usize>> = (0..n).map(|i| Self::nearest(members, i, k)).collect();

        (0..count)
            .map(|_| {
                let pick = rng.gen_range(0..n);
                let base = members.row(pick);
                let candidates = &neighbours[pick];
                if candidates.is_empty() {
                    // no distinct neighbour: the only option is a copy
                    return base.to_owned();
                }
                let other = members.row(candidates[rng.gen_range(0..candidates.len())]);
                let gap = rng.gen::<f64>();
                &base + &((&other - &base) * gap)
            })
            .collect()
    }
}

impl Sampler for Smote {
    fn fit(&mut self, _x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
        let counts = class_counts(y);
        if counts.len() < 2 {
            return Err(PipelineError::TransformationError(
                "Need at least 2 classes for SMOTE".to_string(),
            ));
        }
        let max_count = counts.values().copied().max().unwrap_or(0);
        self.target_counts = Some(counts.keys().map(|&class| (class, max_count)).collect());
        Ok(())
    }

    fn resample(&self, x: &Array2<f64>, y: &Array1<i64>) -> Result<ResampleResult> {
        let targets = self
            .target_counts
            .as_ref()
            .ok_or_else(|| PipelineError::TransformationError("SMOTE not fitted".to_string()))?;
        if x.nrows() != y.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("{} labels", x.nrows()),
                actual: format!("{} labels", y.len()),
            });
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut rows: Vec<Array1<f64>> = Vec::new();
        let mut labels: Vec<i64> = y.to_vec();
        let mut n_synthetic = BTreeMap::new();

        for (class, idx) in class_indices(y) {
            let wanted = targets.get(&class).copied().unwrap_or(0).saturating_sub(idx.len());
            n_synthetic.insert(class, wanted);
            if wanted == 0 {
                continue;
            }
            let members = x.select(Axis(0), &idx);
            rows.extend(self.synthesize(&members, wanted, &mut rng));
            labels.extend(std::iter::repeat(class).take(wanted));
        }

        let mut result_x = x.clone();
        for row in &rows {
            result_x.push_row(row.view())?;
        }

        Ok(ResampleResult {
            x: result_x,
            y: Array1::from_vec(labels),
            n_synthetic,
        })
    }
}
