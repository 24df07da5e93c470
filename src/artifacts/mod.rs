//! Artifact store
//!
//! Stages hand data to each other through files at configured paths.
//! These helpers cover the file formats involved: CSV tables, the
//! validation status marker, plain-text reports and JSON records.

use polars::prelude::*;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::debug;

use crate::error::{PipelineError, Result};

const STATUS_PREFIX: &str = "Validation status:";

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Load a CSV file with a header row, inferring column types from all rows.
pub fn read_csv(path: &Path) -> Result<DataFrame> {
    if !path.exists() {
        return Err(PipelineError::IoError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} does not exist", path.display()),
        )));
    }
    let df = CsvReadOptions::default()
        .with_infer_schema_length(None)
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    debug!(path = %path.display(), rows = df.height(), cols = df.width(), "read csv");
    Ok(df)
}

/// Write a frame as CSV with a header row, replacing any existing file.
pub fn write_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    debug!(path = %path.display(), rows = df.height(), "wrote csv");
    Ok(())
}

/// Persist the validation gate as a single line
pub fn write_status(path: &Path, passed: bool) -> Result<()> {
    ensure_parent(path)?;
    fs::write(path, format!("{} {}", STATUS_PREFIX, passed))?;
    Ok(())
}

/// Read a status marker written by [`write_status`].
///
/// A marker whose value is not `true` counts as a closed gate.
pub fn read_status(path: &Path) -> Result<bool> {
    let content = fs::read_to_string(path)?;
    let value = content
        .trim()
        .strip_prefix(STATUS_PREFIX)
        .map(str::trim)
        .ok_or_else(|| {
            PipelineError::DataError(format!("malformed status marker {}", path.display()))
        })?;
    Ok(value.eq_ignore_ascii_case("true"))
}

pub fn write_text(path: &Path, content: &str) -> Result<()> {
    ensure_parent(path)?;
    fs::write(path, content)?;
    Ok(())
}

pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    ensure_parent(path)?;
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, value)?;
    debug!(path = %path.display(), "saved json");
    Ok(())
}

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// Approximate size of a file, e.g. `~12 KB`
pub fn file_size(path: &Path) -> Result<String> {
    let bytes = fs::metadata(path)?.len();
    Ok(format!("~{} KB", (bytes as f64 / 1024.0).round() as u64))
}
