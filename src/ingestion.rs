//! Persisting uploaded CSV files and splitting them into train/test sets.

use std::fs;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::info;

use crate::config::Config;
use crate::error::{Error, Result};

pub const INVALID_FORMAT: &str = "Invalid file format. Please upload a CSV file.";

/// Files produced by one ingestion run.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitPaths {
    pub train: PathBuf,
    pub test: PathBuf,
    pub train_rows: usize,
    pub test_rows: usize,
}

#[derive(Debug, Clone)]
pub struct DataIngestion {
    dataset_dir: PathBuf,
    artifact_dir: PathBuf,
    test_ratio: f64,
    seed: u64,
}

impl DataIngestion {
    pub fn new(config: &Config) -> Self {
        Self {
            dataset_dir: config.dataset_dir.clone(),
            artifact_dir: config.artifact_dir.clone(),
            test_ratio: config.test_ratio,
            seed: config.seed,
        }
    }

    pub fn raw_data_path(&self) -> PathBuf {
        self.artifact_dir.join("data.csv")
    }

    pub fn train_data_path(&self) -> PathBuf {
        self.artifact_dir.join("train.csv")
    }

    pub fn test_data_path(&self) -> PathBuf {
        self.artifact_dir.join("test.csv")
    }

    /// Rejects anything that is not named `*.csv`.
    pub fn check_file_name(file_name: &str) -> Result<()> {
        if file_name.ends_with(".csv") {
            Ok(())
        } else {
            Err(Error::validation(INVALID_FORMAT))
        }
    }

    /// Write an uploaded file under the dataset folder, keeping its name.
    /// An existing file with the same name is replaced.
    pub fn save_upload(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        Self::check_file_name(file_name)?;
        let name = Path::new(file_name)
            .file_name()
            .ok_or_else(|| Error::validation(INVALID_FORMAT))?;

        fs::create_dir_all(&self.dataset_dir)?;
        let path = self.dataset_dir.join(name);
        fs::write(&path, bytes)?;
        info!(path = %path.display(), bytes = bytes.len(), "saved upload");
        Ok(path)
    }

    /// Shuffle the rows of `path` and write them out as a train and a test file.
    pub fn split(&self, path: &Path) -> Result<SplitPaths> {
        let mut reader = ReaderBuilder::new().has_headers(true).from_path(path)?;
        let headers = reader.headers()?.clone();
        let mut rows = reader.records().collect::<std::result::Result<Vec<_>, _>>()?;
        info!(rows = rows.len(), path = %path.display(), "read dataset");

        if rows.len() < 2 {
            return Err(Error::validation(format!(
                "dataset must contain at least two rows, found {}",
                rows.len()
            )));
        }

        fs::create_dir_all(&self.artifact_dir)?;
        write_table(&self.raw_data_path(), &headers, &rows)?;

        let mut rng = StdRng::seed_from_u64(self.seed);
        rows.shuffle(&mut rng);
        let n_test = test_size(rows.len(), self.test_ratio);
        let train_rows = rows.split_off(n_test);
        let test_rows = rows;

        let split = SplitPaths {
            train: self.train_data_path(),
            test: self.test_data_path(),
            train_rows: train_rows.len(),
            test_rows: test_rows.len(),
        };
        write_table(&split.train, &headers, &train_rows)?;
        write_table(&split.test, &headers, &test_rows)?;
        info!(
            train_rows = split.train_rows,
            test_rows = split.test_rows,
            "train/test split written"
        );
        Ok(split)
    }

    /// Save an upload and split it in one go.
    pub fn ingest(&self, file_name: &str, bytes: &[u8]) -> Result<SplitPaths> {
        let path = self.save_upload(file_name, bytes)?;
        self.split(&path)
    }
}

/// Number of held-out rows: `ceil(n * ratio)`, leaving at least one row on each side.
fn test_size(n: usize, ratio: f64) -> usize {
    let n_test = (n as f64 * ratio).ceil() as usize;
    n_test.clamp(1, n - 1)
}

fn write_table(path: &Path, headers: &StringRecord, rows: &[StringRecord]) -> Result<()> {
    let mut writer = WriterBuilder::new().from_path(path)?;
    writer.write_record(headers)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}
