//! Model training
//!
//! Provides the classifier families the grid search can pick from:
//! - Logistic regression
//! - Decision trees and random forests
//! - K-nearest neighbours
//!
//! plus the binary metrics used to rank trials and the trainer that
//! runs the search and persists the winner.

pub mod classifier;
pub mod dataset;
pub mod decision_tree;
pub mod hyper;
pub mod knn;
pub mod logistic;
pub mod metrics;
pub mod random_forest;
mod trainer;

pub use classifier::{BuildFn, Classifier, ModelFamily, ModelRegistry, RestoreFn};
pub use dataset::{columns_to_array2, frame_to_xy, xy_to_frame};
pub use decision_tree::{Criterion, DecisionTreeClassifier, MaxFeatures, TreeNode};
pub use hyper::{expand_grid, HyperParams};
pub use knn::{DistanceMetric, KNeighborsClassifier, WeightScheme};
pub use logistic::{LogisticRegression, Penalty};
pub use metrics::{ClassificationMetrics, ConfusionCounts};
pub use random_forest::RandomForestClassifier;
pub use trainer::{
    BestModelArtifact, ModelTrainer, SearchState, SearchWinner, TrainingOutcome, TrialRecord,
};
