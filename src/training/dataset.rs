//! Conversions between encoded frames and dense arrays

use ndarray::{Array1, Array2};
use polars::prelude::*;

use crate::error::{PipelineError, Result};

/// Named columns as a row-major f64 matrix
pub fn columns_to_array2(df: &DataFrame, col_names: &[String]) -> Result<Array2<f64>> {
    let n_rows = df.height();
    let col_data: Vec<Vec<f64>> = col_names
        .iter()
        .map(|name| {
            let series = df
                .column(name)
                .map_err(|_| PipelineError::ColumnNotFound(name.clone()))?
                .as_materialized_series()
                .cast(&DataType::Float64)?;
            series
                .f64()?
                .into_iter()
                .enumerate()
                .map(|(row, v)| {
                    v.ok_or_else(|| {
                        PipelineError::DataError(format!("missing value in '{}' at row {}", name, row))
                    })
                })
                .collect::<Result<Vec<f64>>>()
        })
        .collect::<Result<_>>()?;

    Ok(Array2::from_shape_fn((n_rows, col_names.len()), |(r, c)| col_data[c][r]))
}

/// Integer labels of `target`
pub fn target_to_array1(df: &DataFrame, target: &str) -> Result<Array1<i64>> {
    let series = df
        .column(target)
        .map_err(|_| PipelineError::ColumnNotFound(target.to_string()))?
        .as_materialized_series()
        .cast(&DataType::Int64)?;
    series
        .i64()?
        .into_iter()
        .map(|v| v.ok_or_else(|| PipelineError::DataError(format!("missing label in '{}'", target))))
        .collect::<Result<Vec<i64>>>()
        .map(Array1::from_vec)
}

/// Split an encoded frame into features (every column but `target`, in
/// frame order), labels and the feature names.
pub fn frame_to_xy(df: &DataFrame, target: &str) -> Result<(Array2<f64>, Array1<i64>, Vec<String>)> {
    let feature_names: Vec<String> = df
        .get_column_names()
        .into_iter()
        .filter(|name| name.as_str() != target)
        .map(|name| name.to_string())
        .collect();
    let y = target_to_array1(df, target)?;
    let x = columns_to_array2(df, &feature_names)?;
    Ok((x, y, feature_names))
}

/// Inverse of [`frame_to_xy`]: float features followed by the integer target
pub fn xy_to_frame(x: &Array2<f64>, y: &Array1<i64>, feature_names: &[String], target: &str) -> Result<DataFrame> {
    if x.ncols() != feature_names.len() || x.nrows() != y.len() {
        return Err(PipelineError::ShapeError {
            expected: format!("{} rows x {} features", y.len(), feature_names.len()),
            actual: format!("{} rows x {} features", x.nrows(), x.ncols()),
        });
    }
    let mut columns: Vec<Column> = feature_names
        .iter()
        .enumerate()
        .map(|(j, name)| Column::new(name.as_str().into(), x.column(j).to_vec()))
        .collect();
    columns.push(Column::new(target.into(), y.to_vec()));
    Ok(DataFrame::new(columns)?)
}
