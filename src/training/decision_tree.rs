//! CART decision tree classifier

use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::classifier::{check_features, check_xy, Classifier};
use super::hyper::HyperParams;
use crate::config::ParamValue;
use crate::error::{PipelineError, Result};

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        class: i64,
        /// Share of label 1 among the training rows that reached the leaf
        positive_rate: f64,
        n_samples: usize,
    },
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
    },
}

impl TreeNode {
    fn leaf_for(&self, row: &[f64]) -> &TreeNode {
        let mut node = self;
        while let TreeNode::Split {
            feature_idx,
            threshold,
            left,
            right,
            ..
        } = node
        {
            node = if row[*feature_idx] <= *threshold { &**left } else { &**right };
        }
        node
    }

    pub fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 0,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    Gini,
    Entropy,
}

impl Criterion {
    pub(crate) fn parse(name: &str) -> Result<Self> {
        match name {
            "gini" => Ok(Criterion::Gini),
            "entropy" | "log_loss" => Ok(Criterion::Entropy),
            other => Err(PipelineError::TrainingError(format!(
                "unknown criterion '{}'",
                other
            ))),
        }
    }

    fn impurity(&self, counts: &[usize], n: usize) -> f64 {
        if n == 0 {
            return 0.0;
        }
        let n = n as f64;
        match self {
            Criterion::Gini => {
                1.0 - counts
                    .iter()
                    .map(|&c| (c as f64 / n).powi(2))
                    .sum::<f64>()
            }
            Criterion::Entropy => -counts
                .iter()
                .filter(|&&c| c > 0)
                .map(|&c| {
                    let p = c as f64 / n;
                    p * p.ln()
                })
                .sum::<f64>(),
        }
    }
}

/// Strategy for features considered at each split
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MaxFeatures {
    Sqrt,
    Log2,
    Fraction(f64),
    Fixed(usize),
    All,
}

impl MaxFeatures {
    pub fn resolve(&self, n_features: usize) -> usize {
        match self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().ceil() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2().ceil() as usize,
            MaxFeatures::Fraction(f) => (n_features as f64 * f).ceil() as usize,
            MaxFeatures::Fixed(n) => *n,
            MaxFeatures::All => n_features,
        }
        .clamp(1, n_features.max(1))
    }

    pub(crate) fn from_param(value: &ParamValue) -> Result<Self> {
        match value {
            ParamValue::Null => Ok(MaxFeatures::All),
            ParamValue::Int(n) if *n > 0 => Ok(MaxFeatures::Fixed(*n as usize)),
            ParamValue::Float(f) if *f > 0.0 && *f <= 1.0 => Ok(MaxFeatures::Fraction(*f)),
            ParamValue::Text(s) if s == "sqrt" || s == "auto" => Ok(MaxFeatures::Sqrt),
            ParamValue::Text(s) if s == "log2" => Ok(MaxFeatures::Log2),
            other => Err(PipelineError::TrainingError(format!(
                "invalid max_features: {}",
                other
            ))),
        }
    }
}

/// Decision tree classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTreeClassifier {
    root: Option<TreeNode>,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub criterion: Criterion,
    pub random_state: u64,
    n_features: usize,
    classes: Vec<i64>,
}

impl Default for DecisionTreeClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-fit working data
struct Grower<'a> {
    tree: &'a DecisionTreeClassifier,
    x: &'a Array2<f64>,
    /// Class index of each row
    y: Vec<usize>,
    n_classes: usize,
    positive: Option<usize>,
    n_try: usize,
    rng: ChaCha8Rng,
}

impl DecisionTreeClassifier {
    pub const FAMILY: &'static str = "DecisionTreeClassifier";
    const KNOWN: &'static [&'static str] = &[
        "max_depth",
        "min_samples_split",
        "min_samples_leaf",
        "criterion",
        "max_features",
        "random_state",
    ];

    pub fn new() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
            criterion: Criterion::Gini,
            random_state: 0,
            n_features: 0,
            classes: Vec::new(),
        }
    }

    pub fn from_params(params: &HyperParams) -> Result<Self> {
        params.ensure_known(Self::FAMILY, Self::KNOWN)?;
        let mut tree = Self::new();
        tree.max_depth = params.opt_usize("max_depth", None)?;
        tree.min_samples_split = params.usize_or("min_samples_split", 2)?.max(2);
        tree.min_samples_leaf = params.usize_or("min_samples_leaf", 1)?.max(1);
        tree.criterion = Criterion::parse(&params.str_or("criterion", "gini")?)?;
        if let Some(v) = params.get("max_features") {
            tree.max_features = MaxFeatures::from_param(v)?;
        }
        tree.random_state = params.usize_or("random_state", 0)? as u64;
        Ok(tree)
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn root(&self) -> Option<&TreeNode> {
        self.root.as_ref()
    }

    /// Fit on a subset of rows (bootstrap samples pass repeated indices)
    pub(crate) fn fit_rows(&mut self, x: &Array2<f64>, y: &Array1<i64>, rows: &[usize]) -> Result<()> {
        check_xy(x, y)?;
        let mut classes: Vec<i64> = y.iter().copied().collect();
        classes.sort_unstable();
        classes.dedup();

        let y_idx: Vec<usize> = y
            .iter()
            .map(|label| classes.binary_search(label).unwrap_or(0))
            .collect();
        let positive = classes.binary_search(&1).ok();

        self.n_features = x.ncols();
        let mut grower = Grower {
            tree: self,
            x,
            y: y_idx,
            n_classes: classes.len(),
            positive,
            n_try: self.max_features.resolve(x.ncols()),
            rng: ChaCha8Rng::seed_from_u64(self.random_state),
        };
        let root = grower.grow(rows, 0, &classes);
        self.root = Some(root);
        self.classes = classes;
        Ok(())
    }

    fn root_or_err(&self) -> Result<&TreeNode> {
        self.root.as_ref().ok_or(PipelineError::ModelNotFitted)
    }

    /// Positive rate of the leaf each row lands in
    pub(crate) fn leaf_scores(&self, x: &Array2<f64>) -> Result<Vec<f64>> {
        let root = self.root_or_err()?;
        check_features(x, self.n_features)?;
        Ok(x.rows()
            .into_iter()
            .map(|row| match root.leaf_for(&row.to_vec()) {
                TreeNode::Leaf { positive_rate, .. } => *positive_rate,
                TreeNode::Split { .. } => 0.0,
            })
            .collect())
    }
}

impl<'a> Grower<'a> {
    fn counts(&self, rows: &[usize]) -> Vec<usize> {
        let mut counts = vec![0usize; self.n_classes];
        for &i in rows {
            counts[self.y[i]] += 1;
        }
        counts
    }

    fn leaf(&self, counts: &[usize], classes: &[i64], n: usize) -> TreeNode {
        // ties go to the smallest label
        let (best, _) = counts
            .iter()
            .enumerate()
            .fold((0usize, 0usize), |(bi, bc), (i, &c)| if c > bc { (i, c) } else { (bi, bc) });
        let positive_rate = match (self.positive, n) {
            (Some(p), n) if n > 0 => counts[p] as f64 / n as f64,
            _ => 0.0,
        };
        TreeNode::Leaf {
            class: classes.get(best).copied().unwrap_or(0),
            positive_rate,
            n_samples: n,
        }
    }

    fn candidate_features(&mut self) -> Vec<usize> {
        let n_features = self.x.ncols();
        if self.n_try >= n_features {
            return (0..n_features).collect();
        }
        let mut chosen = rand::seq::index::sample(&mut self.rng, n_features, self.n_try).into_vec();
        chosen.sort_unstable();
        chosen
    }

    /// Best (gain, threshold) for one feature, sweeping rows in value order
    fn best_split_for(&self, feature: usize, rows: &[usize], counts: &[usize], parent: f64) -> Option<(f64, f64)> {
        let tree = self.tree;
        let mut sorted: Vec<usize> = rows.to_vec();
        sorted.sort_by(|&a, &b| {
            self.x[[a, feature]]
                .partial_cmp(&self.x[[b, feature]])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let n = sorted.len();
        let mut left = vec![0usize; self.n_classes];
        let mut right = counts.to_vec();
        let mut best: Option<(f64, f64)> = None;

        for j in 0..n - 1 {
            let cls = self.y[sorted[j]];
            left[cls] += 1;
            right[cls] -= 1;

            let here = self.x[[sorted[j], feature]];
            let next = self.x[[sorted[j + 1], feature]];
            if here == next {
                continue;
            }
            let n_left = j + 1;
            let n_right = n - n_left;
            if n_left < tree.min_samples_leaf || n_right < tree.min_samples_leaf {
                continue;
            }

            let weighted = (n_left as f64 * tree.criterion.impurity(&left, n_left)
                + n_right as f64 * tree.criterion.impurity(&right, n_right))
                / n as f64;
            let gain = parent - weighted;
            if gain > best.map_or(0.0, |(g, _)| g) + 1e-12 {
                best = Some((gain, (here + next) / 2.0));
            }
        }
        best
    }

    fn grow(&mut self, rows: &[usize], depth: usize, classes: &[i64]) -> TreeNode {
        let tree = self.tree;
        let n = rows.len();
        let counts = self.counts(rows);
        let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;

        if pure || n < tree.min_samples_split || tree.max_depth.is_some_and(|d| depth >= d) {
            return self.leaf(&counts, classes, n);
        }

        let parent = tree.criterion.impurity(&counts, n);
        let features = self.candidate_features();
        let scored: Vec<Option<(usize, f64, f64)>> = {
            let this = &*self;
            features
                .par_iter()
                .map(|&f| {
                    this.best_split_for(f, rows, &counts, parent)
                        .map(|(gain, threshold)| (f, gain, threshold))
                })
                .collect()
        };

        // first feature wins ties
        let best = scored
            .into_iter()
            .flatten()
            .fold(None, |acc: Option<(usize, f64, f64)>, cand| match acc {
                Some(a) if a.1 >= cand.1 => Some(a),
                _ => Some(cand),
            });

        let Some((feature_idx, _, threshold)) = best else {
            return self.leaf(&counts, classes, n);
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&i| self.x[[i, feature_idx]] <= threshold);

        let left = Box::new(self.grow(&left_rows, depth + 1, classes));
        let right = Box::new(self.grow(&right_rows, depth + 1, classes));
        TreeNode::Split {
            feature_idx,
            threshold,
            left,
            right,
            n_samples: n,
        }
    }
}

impl Classifier for DecisionTreeClassifier {
    fn family(&self) -> &str {
        Self::FAMILY
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
        let rows: Vec<usize> = (0..x.nrows()).collect();
        self.fit_rows(x, y, &rows)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<i64>> {
        let root = self.root_or_err()?;
        check_features(x, self.n_features)?;
        Ok(x.rows()
            .into_iter()
            .map(|row| match root.leaf_for(&row.to_vec()) {
                TreeNode::Leaf { class, .. } => *class,
                TreeNode::Split { .. } => 0,
            })
            .collect())
    }

    fn predict_scores(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(Array1::from_vec(self.leaf_scores(x)?))
    }

    fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn and_like() -> (Array2<f64>, Array1<i64>) {
        let x = array![
            [0.0, 0.0],
            [0.1, 0.2],
            [1.0, 1.0],
            [0.9, 1.1],
            [0.0, 1.0],
            [0.1, 0.9],
            [1.0, 0.0],
            [0.9, 0.1],
        ];
        let y = array![0, 0, 1, 1, 0, 0, 0, 0];
        (x, y)
    }

    #[test]
    fn test_fits_training_data() {
        let (x, y) = and_like();
        let mut tree = DecisionTreeClassifier::new();
        tree.fit(&x, &y).unwrap();
        assert_eq!(tree.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_max_depth_limits_tree() {
        let (x, y) = and_like();
        let mut stump = DecisionTreeClassifier::new().with_max_depth(1);
        stump.fit(&x, &y).unwrap();
        assert!(stump.root().unwrap().depth() <= 1);
    }

    #[test]
    fn test_scores_are_leaf_rates() {
        let x = array![[0.0], [0.0], [0.0], [1.0]];
        let y = array![0, 0, 1, 1];
        let mut tree = DecisionTreeClassifier::new();
        tree.fit(&x, &y).unwrap();
        let scores = tree.predict_scores(&array![[0.0], [1.0]]).unwrap();
        assert!((scores[0] - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(scores[1], 1.0);
    }

    #[test]
    fn test_from_params() {
        let params = HyperParams::new()
            .with("max_depth", ParamValue::Int(3))
            .with("criterion", ParamValue::Text("entropy".into()));
        let tree = DecisionTreeClassifier::from_params(&params).unwrap();
        assert_eq!(tree.max_depth, Some(3));
        assert_eq!(tree.criterion, Criterion::Entropy);

        let bad = HyperParams::new().with("n_estimators", ParamValue::Int(3));
        assert!(DecisionTreeClassifier::from_params(&bad).is_err());
    }

    #[test]
    fn test_predict_before_fit() {
        let tree = DecisionTreeClassifier::new();
        assert!(matches!(tree.predict(&array![[1.0]]), Err(PipelineError::ModelNotFitted)));
    }
}
