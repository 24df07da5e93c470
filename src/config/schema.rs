//! Column schema: declared feature columns and the target column

use polars::prelude::DataType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::OrderedMap;

/// Primitive kind a column is declared (or inferred) to have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ColumnKind {
    Categorical,
    Integer,
    Float,
    Boolean,
}

impl ColumnKind {
    /// Kind polars inferred for a loaded column, `None` for anything the
    /// schema language cannot express (dates, lists, ...).
    pub fn from_dtype(dtype: &DataType) -> Option<Self> {
        match dtype {
            DataType::String => Some(ColumnKind::Categorical),
            DataType::Int32 | DataType::Int64 | DataType::UInt32 | DataType::UInt64 => {
                Some(ColumnKind::Integer)
            }
            DataType::Float32 | DataType::Float64 => Some(ColumnKind::Float),
            DataType::Boolean => Some(ColumnKind::Boolean),
            _ => None,
        }
    }

    pub fn is_categorical(&self) -> bool {
        matches!(self, ColumnKind::Categorical)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnKind::Categorical => "object",
            ColumnKind::Integer => "int64",
            ColumnKind::Float => "float64",
            ColumnKind::Boolean => "bool",
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "object" | "str" | "string" | "category" | "categorical" => Ok(ColumnKind::Categorical),
            "int64" | "int32" | "int" | "integer" => Ok(ColumnKind::Integer),
            "float64" | "float32" | "float" | "double" => Ok(ColumnKind::Float),
            "bool" | "boolean" => Ok(ColumnKind::Boolean),
            other => Err(format!("unknown column type '{}'", other)),
        }
    }
}

impl TryFrom<String> for ColumnKind {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ColumnKind> for String {
    fn from(kind: ColumnKind) -> Self {
        kind.as_str().to_string()
    }
}

/// The designated label column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ColumnKind,
}

/// Declared columns of the dataset, in document order, plus the target.
///
/// The target never appears among the feature columns even if the
/// document lists it under `COLUMNS` as well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(rename = "COLUMNS")]
    columns: OrderedMap<String, ColumnKind>,
    #[serde(rename = "TARGET_COLUMN")]
    target: TargetColumn,
}

impl Schema {
    pub fn new(columns: OrderedMap<String, ColumnKind>, target: TargetColumn) -> Self {
        Self { columns, target }
    }

    pub fn target(&self) -> &TargetColumn {
        &self.target
    }

    pub fn target_name(&self) -> &str {
        &self.target.name
    }

    /// Feature columns with their declared kinds, target excluded
    pub fn features(&self) -> impl Iterator<Item = (&str, ColumnKind)> {
        self.columns
            .iter()
            .filter(move |(name, _)| name.as_str() != self.target.name)
            .map(|(name, kind)| (name.as_str(), *kind))
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.features().map(|(name, _)| name.to_string()).collect()
    }

    /// Features followed by the target: the projection used by the
    /// transformation stage and the column set checked offline.
    pub fn relevant_columns(&self) -> Vec<(String, ColumnKind)> {
        let mut cols: Vec<(String, ColumnKind)> = self
            .features()
            .map(|(name, kind)| (name.to_string(), kind))
            .collect();
        cols.push((self.target.name.clone(), self.target.kind));
        cols
    }

    /// Categorical columns to encode, including the target when it is
    /// declared categorical.
    pub fn categorical_columns(&self) -> Vec<String> {
        self.relevant_columns()
            .into_iter()
            .filter(|(_, kind)| kind.is_categorical())
            .map(|(name, _)| name)
            .collect()
    }

    pub fn kind_of(&self, column: &str) -> Option<ColumnKind> {
        if column == self.target.name {
            return Some(self.target.kind);
        }
        self.columns.get(column).copied()
    }
}
