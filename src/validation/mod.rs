//! Data validation: column presence and declared type conformance
//!
//! A failing validation is a normal outcome carried by
//! [`ValidationReport`]; only I/O and parse faults are errors.

use polars::prelude::*;
use std::collections::HashMap;
use std::fmt;
use tracing::{info, warn};

use crate::artifacts;
use crate::config::{ColumnKind, DataValidationConfig};
use crate::error::{Result, StageKind};

/// Outcome of checking one declared column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnCheck {
    /// Present with the declared type
    Validated,
    /// Present with another type; fails the gate
    TypeMismatch,
    /// Absent; fails the gate
    Missing,
}

impl ColumnCheck {
    pub fn passed(&self) -> bool {
        matches!(self, ColumnCheck::Validated)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnReport {
    pub column: String,
    pub expected: ColumnKind,
    pub observed: Option<ColumnKind>,
    pub check: ColumnCheck,
}

impl fmt::Display for ColumnReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.check {
            ColumnCheck::Validated => write!(f, "{} validated along with datatype", self.column),
            ColumnCheck::TypeMismatch => write!(f, "{} validated without datatype", self.column),
            ColumnCheck::Missing => write!(f, "{} not validated", self.column),
        }
    }
}

/// Per-column results in schema order plus the overall gate
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    columns: Vec<ColumnReport>,
}

impl ValidationReport {
    /// The gate: every declared column passed.
    pub fn passed(&self) -> bool {
        self.columns.iter().all(|c| c.check.passed())
    }

    pub fn columns(&self) -> &[ColumnReport] {
        &self.columns
    }

    pub fn failures(&self) -> impl Iterator<Item = &ColumnReport> {
        self.columns.iter().filter(|c| !c.check.passed())
    }

    /// Multi-line diagnostic, one line per declared column
    pub fn message(&self) -> String {
        self.columns
            .iter()
            .map(|c| format!("{}\n", c))
            .collect()
    }
}

/// Column kinds as polars inferred them; `None` for unsupported dtypes
pub fn observed_kinds(df: &DataFrame) -> HashMap<String, Option<ColumnKind>> {
    df.get_columns()
        .iter()
        .map(|col| (col.name().to_string(), ColumnKind::from_dtype(col.dtype())))
        .collect()
}

/// Check every expected column against what was observed
pub fn validate_columns(
    observed: &HashMap<String, Option<ColumnKind>>,
    expected: &[(String, ColumnKind)],
) -> ValidationReport {
    let columns = expected
        .iter()
        .map(|(name, kind)| {
            let (observed_kind, check) = match observed.get(name) {
                None => (None, ColumnCheck::Missing),
                Some(found) if *found == Some(*kind) => (*found, ColumnCheck::Validated),
                Some(found) => (*found, ColumnCheck::TypeMismatch),
            };
            ColumnReport {
                column: name.clone(),
                expected: *kind,
                observed: observed_kind,
                check,
            }
        })
        .collect();
    ValidationReport { columns }
}

/// Offline validation stage over the ingested dataset
pub struct DataValidation {
    config: DataValidationConfig,
}

impl DataValidation {
    pub fn new(config: DataValidationConfig) -> Self {
        Self { config }
    }

    /// Validate the dataset against the schema (features and target) and
    /// persist the status marker and report.
    pub fn validate_all_columns(&self) -> Result<ValidationReport> {
        let report = self.run().map_err(|e| e.in_stage(StageKind::Validation))?;
        if report.passed() {
            info!(columns = report.columns().len(), "Data validation passed");
        } else {
            for failure in report.failures() {
                warn!(column = %failure.column, check = ?failure.check, "column failed validation");
            }
        }
        Ok(report)
    }

    fn run(&self) -> Result<ValidationReport> {
        let df = artifacts::read_csv(&self.config.local_data_file)?;
        let observed = observed_kinds(&df);
        let report = validate_columns(&observed, &self.config.schema.relevant_columns());

        artifacts::write_status(&self.config.status_file, report.passed())?;
        artifacts::write_text(&self.config.status_message_file, &report.message())?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expected() -> Vec<(String, ColumnKind)> {
        vec![
            ("gender".to_string(), ColumnKind::Categorical),
            ("tenure".to_string(), ColumnKind::Integer),
            ("MonthlyCharges".to_string(), ColumnKind::Float),
        ]
    }

    #[test]
    fn test_all_columns_match() {
        let df = df!(
            "gender" => &["Male", "Female"],
            "tenure" => &[1i64, 5],
            "MonthlyCharges" => &[20.5, 70.0],
        )
        .unwrap();
        let report = validate_columns(&observed_kinds(&df), &expected());
        assert!(report.passed());
        assert_eq!(
            report.message(),
            "gender validated along with datatype\n\
             tenure validated along with datatype\n\
             MonthlyCharges validated along with datatype\n"
        );
    }

    #[test]
    fn test_type_mismatch_fails_gate() {
        let df = df!(
            "gender" => &["Male"],
            "tenure" => &["one"],
            "MonthlyCharges" => &[20.5],
        )
        .unwrap();
        let report = validate_columns(&observed_kinds(&df), &expected());
        assert!(!report.passed());
        assert!(report.message().contains("tenure validated without datatype"));
        assert_eq!(report.failures().count(), 1);
    }

    #[test]
    fn test_missing_column_fails_gate_regardless_of_others() {
        let df = df!(
            "gender" => &["Male"],
            "MonthlyCharges" => &[20.5],
        )
        .unwrap();
        let report = validate_columns(&observed_kinds(&df), &expected());
        assert!(!report.passed());
        assert!(report.message().contains("tenure not validated"));
        assert!(report.message().contains("gender validated along with datatype"));
    }

    #[test]
    fn test_extra_columns_ignored() {
        let df = df!(
            "gender" => &["Male"],
            "tenure" => &[3i64],
            "MonthlyCharges" => &[20.5],
            "customerID" => &["x-1"],
        )
        .unwrap();
        assert!(validate_columns(&observed_kinds(&df), &expected()).passed());
    }
}
