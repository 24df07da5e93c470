//! Data transformation stage
//!
//! Runs, in order: projection to the schema columns, deduplication,
//! categorical encoding, the train/test split and, when the training
//! partition is too imbalanced, SMOTE oversampling of that partition.
//! Each step writes its artifact before the next one starts; a failure
//! leaves the artifacts of earlier steps in place.

pub mod encoder;
pub mod smote;
pub mod split;

pub use encoder::{
    ColumnEncoder, EncoderRegistry, EncoderSet, EncodingStrategy, LabelEncoder, LabelEncoding,
    LABEL_ENCODING,
};
pub use smote::{class_counts, minority_proportion, ResampleResult, Sampler, Smote};
pub use split::{drop_duplicates, filter_to_schema, split_train_test};

use polars::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::artifacts;
use crate::config::DataTransformationConfig;
use crate::error::{PipelineError, Result, StageKind};
use crate::training::{frame_to_xy, xy_to_frame};

/// What the balancing step did to the training partition
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BalanceOutcome {
    /// Minority share was at or above the threshold
    Skipped { minority_proportion: f64 },
    Balanced {
        before: f64,
        after: f64,
        synthetic_rows: usize,
    },
}

/// Row counts and decisions of one transformation run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformationSummary {
    pub input_rows: usize,
    pub duplicates_removed: usize,
    pub encoded_columns: Vec<String>,
    pub train_rows: usize,
    pub test_rows: usize,
    pub balance: BalanceOutcome,
}

pub struct DataTransformation {
    config: DataTransformationConfig,
    encoders: EncoderRegistry,
}

impl DataTransformation {
    pub fn new(config: DataTransformationConfig) -> Self {
        Self {
            config,
            encoders: EncoderRegistry::default(),
        }
    }

    /// Use a registry with additional encoding strategies
    pub fn with_encoders(mut self, encoders: EncoderRegistry) -> Self {
        self.encoders = encoders;
        self
    }

    pub fn config(&self) -> &DataTransformationConfig {
        &self.config
    }

    /// Project the ingested dataset to the schema features and target
    pub fn filter_to_schema(&self) -> Result<DataFrame> {
        let df = artifacts::read_csv(&self.config.local_data_file)?;
        let columns: Vec<String> = self
            .config
            .schema
            .relevant_columns()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        let mut filtered = split::filter_to_schema(&df, &columns)?;
        artifacts::write_csv(&mut filtered, &self.config.filtered_data_file)?;
        info!(
            kept = filtered.width(),
            dropped = df.width() - filtered.width(),
            "filtered dataset to schema columns"
        );
        Ok(filtered)
    }

    /// Remove exact duplicate rows and rewrite the filtered artifact
    pub fn drop_duplicates(&self, df: &DataFrame) -> Result<DataFrame> {
        let (mut deduped, removed) = split::drop_duplicates(df)?;
        artifacts::write_csv(&mut deduped, &self.config.filtered_data_file)?;
        info!(removed, remaining = deduped.height(), "dropped duplicate rows");
        Ok(deduped)
    }

    /// Fit the configured strategy on every categorical column (target
    /// included), persist the encoder set and the encoded dataset.
    pub fn encode_categoricals(&self, df: &DataFrame) -> Result<(DataFrame, EncoderSet)> {
        let strategy = self.encoders.get(&self.config.params.encoding)?;
        let columns = self.config.schema.categorical_columns();
        let encoders = EncoderSet::fit(df, &columns, strategy.as_ref())?;
        let mut encoded = encoders.transform(df)?;

        encoders.save(&self.config.encoder_file)?;
        artifacts::write_csv(&mut encoded, &self.config.encoded_data_file)?;
        info!(
            strategy = strategy.name(),
            columns = ?columns,
            path = %self.config.encoder_file.display(),
            "encoded categorical columns"
        );
        Ok((encoded, encoders))
    }

    /// Seeded split; writes both partitions
    pub fn split_train_test(&self, df: &DataFrame) -> Result<(DataFrame, DataFrame)> {
        let params = &self.config.params;
        let (mut train, mut test) = split::split_train_test(df, params.test_size, params.random_state)?;
        artifacts::write_csv(&mut train, &self.config.train_data_file)?;
        artifacts::write_csv(&mut test, &self.config.test_data_file)?;
        info!(train = train.height(), test = test.height(), "split train/test");
        Ok((train, test))
    }

    /// Oversample the training partition when its minority share is
    /// strictly below the configured threshold. The test partition is
    /// never read or written here.
    pub fn balance_if_needed(&self) -> Result<BalanceOutcome> {
        let params = &self.config.params;
        let target = self.config.schema.target_name();
        let train = artifacts::read_csv(&self.config.train_data_file)?;
        let (x, y, feature_names) = frame_to_xy(&train, target)?;

        let before = minority_proportion(&y);
        if before >= params.smote_threshold {
            info!(
                minority_proportion = before,
                threshold = params.smote_threshold,
                "training partition balanced enough, skipping SMOTE"
            );
            return Ok(BalanceOutcome::Skipped {
                minority_proportion: before,
            });
        }

        let mut smote = Smote::new(params.random_state).with_k_neighbors(params.smote_k_neighbors);
        let resampled = smote.fit_resample(&x, &y)?;
        let after = minority_proportion(&resampled.y);
        let synthetic_rows: usize = resampled.n_synthetic.values().sum();

        let mut balanced = xy_to_frame(&resampled.x, &resampled.y, &feature_names, target)?;
        artifacts::write_csv(&mut balanced, &self.config.train_data_file)?;
        info!(before, after, synthetic_rows, "applied SMOTE to training partition");
        Ok(BalanceOutcome::Balanced {
            before,
            after,
            synthetic_rows,
        })
    }

    /// Run every step, given the validation gate from the previous stage
    pub fn run(&self, validation_passed: bool) -> Result<TransformationSummary> {
        if !validation_passed {
            return Err(PipelineError::TransformationError(
                "data validation did not pass; refusing to transform".to_string(),
            ));
        }
        self.run_steps().map_err(|e| e.in_stage(StageKind::Transformation))
    }

    /// Run with the gate read from the persisted status marker
    pub fn run_from_status(&self) -> Result<TransformationSummary> {
        let passed = artifacts::read_status(&self.config.status_file)
            .map_err(|e| e.in_stage(StageKind::Transformation))?;
        self.run(passed)
    }

    fn run_steps(&self) -> Result<TransformationSummary> {
        let filtered = self.filter_to_schema()?;
        let input_rows = filtered.height();
        let deduped = self.drop_duplicates(&filtered)?;
        let duplicates_removed = input_rows - deduped.height();
        let (encoded, encoders) = self.encode_categoricals(&deduped)?;
        let (train, test) = self.split_train_test(&encoded)?;
        let balance = self.balance_if_needed()?;

        Ok(TransformationSummary {
            input_rows,
            duplicates_removed,
            encoded_columns: encoders.columns().cloned().collect(),
            train_rows: train.height(),
            test_rows: test.height(),
            balance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ColumnKind, OrderedMap, Schema, TargetColumn, TransformationParams};
    use std::path::Path;

    fn config(root: &Path, threshold: f64) -> DataTransformationConfig {
        let mut columns = OrderedMap::new();
        columns.insert("gender".to_string(), ColumnKind::Categorical);
        columns.insert("tenure".to_string(), ColumnKind::Integer);
        columns.insert("Churn".to_string(), ColumnKind::Categorical);
        DataTransformationConfig {
            root_dir: root.to_path_buf(),
            local_data_file: root.join("raw.csv"),
            filtered_data_file: root.join("filtered.csv"),
            encoded_data_file: root.join("encoded.csv"),
            encoder_file: root.join("encoders.json"),
            train_data_file: root.join("train.csv"),
            test_data_file: root.join("test.csv"),
            status_file: root.join("status.txt"),
            schema: Schema::new(
                columns,
                TargetColumn {
                    name: "Churn".to_string(),
                    kind: ColumnKind::Categorical,
                },
            ),
            params: TransformationParams {
                test_size: 0.25,
                random_state: 42,
                smote_threshold: threshold,
                encoding: LABEL_ENCODING.to_string(),
                smote_k_neighbors: 3,
            },
        }
    }

    fn write_raw(root: &Path) {
        let n = 40;
        let gender: Vec<&str> = (0..n).map(|i| if i % 2 == 0 { "Male" } else { "Female" }).collect();
        let tenure: Vec<i64> = (0..n).map(|i| i as i64).collect();
        let churn: Vec<&str> = (0..n).map(|i| if i % 8 == 0 { "Yes" } else { "No" }).collect();
        let extra: Vec<&str> = (0..n).map(|_| "drop me").collect();
        let mut df = df!(
            "customerID" => &extra,
            "gender" => &gender,
            "tenure" => &tenure,
            "Churn" => &churn,
        )
        .unwrap();
        artifacts::write_csv(&mut df, &root.join("raw.csv")).unwrap();
    }

    #[test]
    fn test_closed_gate_refuses() {
        let dir = tempfile::tempdir().unwrap();
        let stage = DataTransformation::new(config(dir.path(), 0.7));
        assert!(matches!(stage.run(false), Err(PipelineError::TransformationError(_))));
        assert!(!dir.path().join("filtered.csv").exists());
    }

    #[test]
    fn test_full_run_balances_train_only() {
        let dir = tempfile::tempdir().unwrap();
        write_raw(dir.path());
        let stage = DataTransformation::new(config(dir.path(), 0.7));
        let summary = stage.run(true).unwrap();

        assert_eq!(summary.input_rows, 40);
        assert_eq!(summary.duplicates_removed, 0);
        assert_eq!(summary.encoded_columns, vec!["gender".to_string(), "Churn".to_string()]);
        assert_eq!(summary.test_rows, 10);
        assert_eq!(summary.train_rows, 30);
        match summary.balance {
            BalanceOutcome::Balanced { after, .. } => assert!((after - 0.5).abs() < 1e-12),
            other => panic!("expected balancing, got {:?}", other),
        }

        let filtered = artifacts::read_csv(&dir.path().join("filtered.csv")).unwrap();
        assert!(filtered.column("customerID").is_err());
        let test = artifacts::read_csv(&dir.path().join("test.csv")).unwrap();
        assert_eq!(test.height(), 10);
        assert!(EncoderSet::load(&dir.path().join("encoders.json")).unwrap().get("Churn").is_some());
    }

    #[test]
    fn test_threshold_below_proportion_skips() {
        let dir = tempfile::tempdir().unwrap();
        write_raw(dir.path());
        let stage = DataTransformation::new(config(dir.path(), 0.01));
        let summary = stage.run(true).unwrap();
        assert!(matches!(summary.balance, BalanceOutcome::Skipped { .. }));
        assert_eq!(summary.train_rows, 30);
    }

    #[test]
    fn test_run_from_status_marker() {
        let dir = tempfile::tempdir().unwrap();
        write_raw(dir.path());
        artifacts::write_status(&dir.path().join("status.txt"), false).unwrap();
        let stage = DataTransformation::new(config(dir.path(), 0.7));
        assert!(stage.run_from_status().is_err());
    }
}
