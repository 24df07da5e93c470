//! Data ingestion: fetch the raw dataset into the artifact store once

use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::artifacts;
use crate::config::DataIngestionConfig;
use crate::error::{PipelineError, Result, StageKind};

const KAGGLE_API: &str = "https://www.kaggle.com/api/v1/datasets/download";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Something that can materialise the raw dataset at a path
pub trait DatasetSource: Send + Sync {
    /// Human readable origin, used in logs
    fn describe(&self) -> String;

    /// Write the dataset to `dest`. Single attempt, no retry.
    fn fetch(&self, dest: &Path) -> Result<()>;
}

/// One file of a Kaggle dataset, downloaded through the public REST API.
///
/// Credentials are read from `KAGGLE_USERNAME` / `KAGGLE_KEY` when the
/// download happens, so a source can be built without them when the
/// file is already present.
#[derive(Debug, Clone)]
pub struct KaggleSource {
    dataset: String,
    file: String,
    timeout: Duration,
}

impl KaggleSource {
    pub fn new(dataset: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            file: file.into(),
            timeout: Duration::from_secs(600),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn credentials() -> Result<(String, String)> {
        let username = std::env::var("KAGGLE_USERNAME").map_err(|_| {
            PipelineError::IngestionError("KAGGLE_USERNAME env var not set".to_string())
        })?;
        let key = std::env::var("KAGGLE_KEY")
            .map_err(|_| PipelineError::IngestionError("KAGGLE_KEY env var not set".to_string()))?;
        Ok((username, key))
    }

    fn download(&self) -> Result<Vec<u8>> {
        let (username, key) = Self::credentials()?;
        let url = format!("{}/{}/{}", KAGGLE_API, self.dataset, self.file);
        info!(dataset = %self.dataset, file = %self.file, "Downloading from Kaggle API");

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| PipelineError::IngestionError(format!("failed to create HTTP client: {}", e)))?;

        let response = client
            .get(&url)
            .basic_auth(&username, Some(&key))
            .header("User-Agent", concat!("churn-pipeline/", env!("CARGO_PKG_VERSION")))
            .send()
            .map_err(|e| PipelineError::IngestionError(format!("Kaggle API request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(PipelineError::IngestionError(format!(
                "Kaggle API error {}: check credentials and dataset '{}'",
                response.status(),
                self.dataset
            )));
        }

        let bytes = response
            .bytes()
            .map_err(|e| PipelineError::IngestionError(format!("failed to read Kaggle response: {}", e)))?;
        Ok(bytes.to_vec())
    }
}

impl DatasetSource for KaggleSource {
    fn describe(&self) -> String {
        format!("Kaggle ({}/{})", self.dataset, self.file)
    }

    fn fetch(&self, dest: &Path) -> Result<()> {
        let payload = self.download()?;
        write_payload(&payload, &self.file, dest)
    }
}

/// Copies an existing file; used for offline runs.
#[derive(Debug, Clone)]
pub struct LocalFileSource {
    path: PathBuf,
}

impl LocalFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DatasetSource for LocalFileSource {
    fn describe(&self) -> String {
        format!("local file ({})", self.path.display())
    }

    fn fetch(&self, dest: &Path) -> Result<()> {
        let payload = fs::read(&self.path).map_err(|e| {
            PipelineError::IngestionError(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        write_payload(&payload, &name, dest)
    }
}

/// Write a downloaded payload to `dest`, unpacking `file` when the
/// payload is a zip archive.
fn write_payload(payload: &[u8], file: &str, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    if !payload.starts_with(ZIP_MAGIC) {
        fs::write(dest, payload)?;
        return Ok(());
    }

    let mut archive = zip::ZipArchive::new(Cursor::new(payload))
        .map_err(|e| PipelineError::IngestionError(format!("invalid zip archive: {}", e)))?;
    let names: Vec<String> = archive.file_names().map(str::to_string).collect();
    let wanted = names
        .iter()
        .find(|name| name.as_str() == file || name.ends_with(&format!("/{}", file)))
        .or_else(|| names.iter().find(|name| name.to_ascii_lowercase().ends_with(".csv")))
        .ok_or_else(|| {
            PipelineError::IngestionError(format!("'{}' not found in downloaded archive", file))
        })?;

    let mut entry = archive
        .by_name(wanted)
        .map_err(|e| PipelineError::IngestionError(format!("cannot read zip entry: {}", e)))?;
    let mut contents = Vec::new();
    entry.read_to_end(&mut contents)?;
    fs::write(dest, &contents)?;
    info!(entry = %wanted, dest = %dest.display(), "extracted dataset from archive");
    Ok(())
}

/// What `fetch_if_absent` did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestionOutcome {
    AlreadyPresent { size: String },
    Downloaded { size: String },
}

pub struct DataIngestion {
    config: DataIngestionConfig,
    source: Box<dyn DatasetSource>,
}

impl DataIngestion {
    /// Ingestion from the configured Kaggle dataset
    pub fn new(config: DataIngestionConfig) -> Self {
        let source = KaggleSource::new(config.kaggle_dataset.clone(), config.file.clone());
        Self::with_source(config, Box::new(source))
    }

    pub fn with_source(config: DataIngestionConfig, source: Box<dyn DatasetSource>) -> Self {
        Self { config, source }
    }

    pub fn local_data_file(&self) -> &Path {
        &self.config.local_data_file
    }

    /// Fetch the dataset unless the target file already exists
    pub fn fetch_if_absent(&self) -> Result<IngestionOutcome> {
        let dest = &self.config.local_data_file;
        if dest.exists() {
            let size = artifacts::file_size(dest).map_err(|e| e.in_stage(StageKind::Ingestion))?;
            info!(path = %dest.display(), size = %size, "File already exists");
            return Ok(IngestionOutcome::AlreadyPresent { size });
        }

        info!(source = %self.source.describe(), dest = %dest.display(), "Fetching dataset");
        self.source
            .fetch(dest)
            .map_err(|e| e.in_stage(StageKind::Ingestion))?;
        let size = artifacts::file_size(dest).map_err(|e| e.in_stage(StageKind::Ingestion))?;
        info!(path = %dest.display(), size = %size, "Dataset downloaded");
        Ok(IngestionOutcome::Downloaded { size })
    }
}
