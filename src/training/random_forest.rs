//! Random forest classifier: bagged CART trees with per-split feature sampling

use ndarray::{Array1, Array2};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::classifier::{check_features, check_xy, Classifier};
use super::decision_tree::{Criterion, DecisionTreeClassifier, MaxFeatures};
use super::hyper::HyperParams;
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestClassifier {
    trees: Vec<DecisionTreeClassifier>,
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    pub criterion: Criterion,
    pub random_state: u64,
    n_features: usize,
}

impl Default for RandomForestClassifier {
    fn default() -> Self {
        Self::new(100)
    }
}

impl RandomForestClassifier {
    pub const FAMILY: &'static str = "RandomForestClassifier";
    const KNOWN: &'static [&'static str] = &[
        "n_estimators",
        "max_depth",
        "min_samples_split",
        "min_samples_leaf",
        "max_features",
        "bootstrap",
        "criterion",
        "random_state",
    ];

    pub fn new(n_estimators: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators: n_estimators.max(1),
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            criterion: Criterion::Gini,
            random_state: 42,
            n_features: 0,
        }
    }

    pub fn from_params(params: &HyperParams) -> Result<Self> {
        params.ensure_known(Self::FAMILY, Self::KNOWN)?;
        let mut forest = Self::new(params.usize_or("n_estimators", 100)?);
        forest.max_depth = params.opt_usize("max_depth", None)?;
        forest.min_samples_split = params.usize_or("min_samples_split", 2)?.max(2);
        forest.min_samples_leaf = params.usize_or("min_samples_leaf", 1)?.max(1);
        if let Some(v) = params.get("max_features") {
            forest.max_features = MaxFeatures::from_param(v)?;
        }
        forest.bootstrap = params.bool_or("bootstrap", true)?;
        forest.criterion = Criterion::parse(&params.str_or("criterion", "gini")?)?;
        forest.random_state = params.usize_or("random_state", 42)? as u64;
        Ok(forest)
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn fitted(&self, x: &Array2<f64>) -> Result<()> {
        if self.trees.is_empty() {
            return Err(PipelineError::ModelNotFitted);
        }
        check_features(x, self.n_features)
    }
}

impl Classifier for RandomForestClassifier {
    fn family(&self) -> &str {
        Self::FAMILY
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
        check_xy(x, y)?;
        let n_samples = x.nrows();
        self.n_features = x.ncols();

        let mut template = DecisionTreeClassifier::new()
            .with_min_samples_leaf(self.min_samples_leaf)
            .with_max_features(self.max_features)
            .with_criterion(self.criterion);
        template.max_depth = self.max_depth;
        template.min_samples_split = self.min_samples_split;
        let base_seed = self.random_state;
        let bootstrap = self.bootstrap;

        let trees: Vec<DecisionTreeClassifier> = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                let seed = base_seed.wrapping_add(tree_idx as u64);
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                let rows: Vec<usize> = if bootstrap {
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
                } else {
                    (0..n_samples).collect()
                };
                let mut tree = template.clone().with_random_state(seed);
                tree.fit_rows(x, y, &rows)?;
                Ok(tree)
            })
            .collect::<Result<Vec<_>>>()?;

        self.trees = trees;
        Ok(())
    }

    /// Majority vote; ties go to the smallest label
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<i64>> {
        self.fitted(x)?;
        let votes: Vec<Array1<i64>> = self
            .trees
            .par_iter()
            .map(|tree| tree.predict(x))
            .collect::<Result<Vec<_>>>()?;

        Ok((0..x.nrows())
            .map(|i| {
                let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
                for tree_votes in &votes {
                    *counts.entry(tree_votes[i]).or_insert(0) += 1;
                }
                counts
                    .into_iter()
                    .fold((0i64, 0usize), |(bl, bc), (label, c)| if c > bc { (label, c) } else { (bl, bc) })
                    .0
            })
            .collect())
    }

    /// Mean positive rate across trees
    fn predict_scores(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.fitted(x)?;
        let per_tree: Vec<Vec<f64>> = self
            .trees
            .par_iter()
            .map(|tree| tree.leaf_scores(x))
            .collect::<Result<Vec<_>>>()?;
        let n_trees = per_tree.len() as f64;
        Ok((0..x.nrows())
            .map(|i| per_tree.iter().map(|scores| scores[i]).sum::<f64>() / n_trees)
            .collect())
    }

    fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}
