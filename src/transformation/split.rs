//! Row-level operations: projection, deduplication, train/test split

use polars::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::{PipelineError, Result};

fn take_rows(df: &DataFrame, rows: &[usize]) -> Result<DataFrame> {
    let idx: Vec<IdxSize> = rows.iter().map(|&i| i as IdxSize).collect();
    let idx = IdxCa::from_vec("idx".into(), idx);
    Ok(df.take(&idx)?)
}

/// Keep only `columns`, in that order
pub fn filter_to_schema(df: &DataFrame, columns: &[String]) -> Result<DataFrame> {
    for name in columns {
        if df.column(name).is_err() {
            return Err(PipelineError::ColumnNotFound(name.clone()));
        }
    }
    Ok(df.select(columns.iter().map(|c| c.as_str()))?)
}

/// Remove exact duplicate rows, keeping the first occurrence in row order.
///
/// Returns the deduplicated frame and the number of rows removed.
pub fn drop_duplicates(df: &DataFrame) -> Result<(DataFrame, usize)> {
    let deduped = df.unique_stable(None, UniqueKeepStrategy::First, None)?;
    let removed = df.height() - deduped.height();
    Ok((deduped, removed))
}

/// Shuffle rows with a seeded ChaCha8 permutation and cut off
/// `ceil(n * test_size)` rows for the test partition.
///
/// Same frame, ratio and seed always give the same partitions.
pub fn split_train_test(df: &DataFrame, test_size: f64, seed: u64) -> Result<(DataFrame, DataFrame)> {
    let n = df.height();
    if n < 2 {
        return Err(PipelineError::DataError(format!(
            "need at least 2 rows to split, got {}",
            n
        )));
    }
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(PipelineError::DataError(format!(
            "test_size must be in (0, 1), got {}",
            test_size
        )));
    }

    let n_test = ((n as f64 * test_size).ceil() as usize).clamp(1, n - 1);
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let (test_idx, train_idx) = indices.split_at(n_test);
    Ok((take_rows(df, train_idx)?, take_rows(df, test_idx)?))
}
