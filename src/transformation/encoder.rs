//! Categorical encoding strategies and the persisted encoder set

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use crate::artifacts;
use crate::config::OrderedMap;
use crate::error::{PipelineError, Result};

/// Name under which label encoding is registered
pub const LABEL_ENCODING: &str = "label_encoding";

/// A way of fitting a categorical-to-integer encoder for one column
pub trait EncodingStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Fit over the non-null values of a string column
    fn fit(&self, column: &str, values: &StringChunked) -> Result<ColumnEncoder>;
}

/// Sorted-classes label encoding: the i-th distinct value in sort order maps to i
#[derive(Debug, Clone, Default)]
pub struct LabelEncoding;

impl EncodingStrategy for LabelEncoding {
    fn name(&self) -> &str {
        LABEL_ENCODING
    }

    fn fit(&self, column: &str, values: &StringChunked) -> Result<ColumnEncoder> {
        let classes: BTreeSet<&str> = values.into_iter().flatten().collect();
        if classes.is_empty() {
            return Err(PipelineError::TransformationError(format!(
                "column '{}' has no values to encode",
                column
            )));
        }
        Ok(ColumnEncoder::Label(LabelEncoder::new(
            column,
            classes.into_iter().map(str::to_string).collect(),
        )))
    }
}

/// Strategies by configured name
#[derive(Clone)]
pub struct EncoderRegistry {
    strategies: HashMap<String, Arc<dyn EncodingStrategy>>,
}

impl Default for EncoderRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(LabelEncoding));
        registry
    }
}

impl EncoderRegistry {
    pub fn empty() -> Self {
        Self { strategies: HashMap::new() }
    }

    pub fn register(&mut self, strategy: Arc<dyn EncodingStrategy>) {
        self.strategies.insert(strategy.name().to_string(), strategy);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn EncodingStrategy>> {
        self.strategies.get(name).cloned().ok_or_else(|| {
            PipelineError::TransformationError(format!("unknown encoding strategy '{}'", name))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelEncoder {
    column: String,
    classes: Vec<String>,
}

impl LabelEncoder {
    /// `classes` must already be sorted and distinct
    pub fn new(column: impl Into<String>, classes: Vec<String>) -> Self {
        Self { column: column.into(), classes }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn encode(&self, value: &str) -> Result<i64> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(value))
            .map(|i| i as i64)
            .map_err(|_| PipelineError::UnseenCategory {
                column: self.column.clone(),
                value: value.to_string(),
            })
    }

    pub fn decode(&self, code: i64) -> Result<String> {
        usize::try_from(code)
            .ok()
            .and_then(|i| self.classes.get(i))
            .cloned()
            .ok_or_else(|| {
                PipelineError::DataError(format!(
                    "code {} out of range for column '{}'",
                    code, self.column
                ))
            })
    }
}

/// A fitted per-column encoder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ColumnEncoder {
    Label(LabelEncoder),
}

impl ColumnEncoder {
    pub fn encode(&self, value: &str) -> Result<i64> {
        match self {
            ColumnEncoder::Label(enc) => enc.encode(value),
        }
    }

    pub fn decode(&self, code: i64) -> Result<String> {
        match self {
            ColumnEncoder::Label(enc) => enc.decode(code),
        }
    }

    /// Values the encoder accepts, in code order
    pub fn classes(&self) -> &[String] {
        match self {
            ColumnEncoder::Label(enc) => enc.classes(),
        }
    }

    /// Encode a whole column; the result keeps the column name.
    pub fn transform(&self, series: &Series) -> Result<Series> {
        let as_str = series.cast(&DataType::String)?;
        let ca = as_str.str()?;
        let codes = ca
            .into_iter()
            .map(|v| match v {
                Some(s) => self.encode(s),
                None => Err(PipelineError::DataError(format!(
                    "null value in categorical column '{}'",
                    series.name()
                ))),
            })
            .collect::<Result<Vec<i64>>>()?;
        Ok(Series::new(series.name().clone(), codes))
    }

    /// Map integer codes back to the original categories
    pub fn inverse_transform(&self, series: &Series) -> Result<Series> {
        let as_int = series.cast(&DataType::Int64)?;
        let ca = as_int.i64()?;
        let values = ca
            .into_iter()
            .map(|v| match v {
                Some(code) => self.decode(code),
                None => Err(PipelineError::DataError(format!(
                    "null code in column '{}'",
                    series.name()
                ))),
            })
            .collect::<Result<Vec<String>>>()?;
        Ok(Series::new(series.name().clone(), values))
    }
}

/// Encoders keyed by column name, persisted as one JSON document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EncoderSet {
    encoders: OrderedMap<String, ColumnEncoder>,
}

impl EncoderSet {
    /// Fit one encoder per listed column over the whole frame
    pub fn fit(df: &DataFrame, columns: &[String], strategy: &dyn EncodingStrategy) -> Result<Self> {
        let mut encoders = OrderedMap::new();
        for name in columns {
            let series = df
                .column(name)
                .map_err(|_| PipelineError::ColumnNotFound(name.clone()))?
                .as_materialized_series()
                .cast(&DataType::String)?;
            let encoder = strategy.fit(name, series.str()?)?;
            encoders.insert(name.clone(), encoder);
        }
        Ok(Self { encoders })
    }

    /// Replace every encoded column present in `df` with its codes
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        let mut result = df.clone();
        for (name, encoder) in self.encoders.iter() {
            if let Ok(column) = df.column(name) {
                let encoded = encoder.transform(column.as_materialized_series())?;
                result.with_column(encoded)?;
            }
        }
        Ok(result)
    }

    /// Reverse of [`EncoderSet::transform`]
    pub fn inverse_transform(&self, df: &DataFrame) -> Result<DataFrame> {
        let mut result = df.clone();
        for (name, encoder) in self.encoders.iter() {
            if let Ok(column) = df.column(name) {
                let decoded = encoder.inverse_transform(column.as_materialized_series())?;
                result.with_column(decoded)?;
            }
        }
        Ok(result)
    }

    pub fn get(&self, column: &str) -> Option<&ColumnEncoder> {
        self.encoders.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &String> {
        self.encoders.keys()
    }

    pub fn len(&self) -> usize {
        self.encoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.encoders.is_empty()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        artifacts::save_json(path, self)
    }

    pub fn load(path: &Path) -> Result<Self> {
        artifacts::load_json(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn frame() -> DataFrame {
        df!(
            "Contract" => &["Two year", "Month-to-month", "One year", "Month-to-month"],
            "tenure" => &[24i64, 1, 12, 3],
            "Churn" => &["No", "Yes", "No", "Yes"],
        )
        .unwrap()
    }

    fn fit_set(df: &DataFrame) -> EncoderSet {
        let registry = EncoderRegistry::default();
        let strategy = registry.get(LABEL_ENCODING).unwrap();
        EncoderSet::fit(df, &["Contract".to_string(), "Churn".to_string()], strategy.as_ref()).unwrap()
    }

    #[test]
    fn test_label_encoding_is_sorted() {
        let set = fit_set(&frame());
        let encoded = set.transform(&frame()).unwrap();
        let codes: Vec<Option<i64>> = encoded.column("Contract").unwrap().i64().unwrap().into_iter().collect();
        // Month-to-month < One year < Two year
        assert_eq!(codes, vec![Some(2), Some(0), Some(1), Some(0)]);
        let churn: Vec<Option<i64>> = encoded.column("Churn").unwrap().i64().unwrap().into_iter().collect();
        assert_eq!(churn, vec![Some(0), Some(1), Some(0), Some(1)]);
        // untouched
        assert_eq!(encoded.column("tenure").unwrap().dtype(), &DataType::Int64);
    }

    #[test]
    fn test_roundtrip_through_persisted_set() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("encoders.json");
        let df = frame();
        fit_set(&df).save(&path).unwrap();

        let loaded = EncoderSet::load(&path).unwrap();
        let decoded = loaded.inverse_transform(&loaded.transform(&df).unwrap()).unwrap();
        assert!(decoded.equals(&df));
    }

    #[test]
    fn test_unseen_category() {
        let set = fit_set(&frame());
        let err = set.get("Contract").unwrap().encode("Weekly").unwrap_err();
        match err {
            PipelineError::UnseenCategory { column, value } => {
                assert_eq!(column, "Contract");
                assert_eq!(value, "Weekly");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_strategy() {
        let registry = EncoderRegistry::default();
        assert!(registry.get("one_hot").is_err());
    }
}
