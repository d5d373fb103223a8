use std::path::PathBuf;

use clap::Parser;

use crate::error::{Error, Result};

/// Runtime configuration, read from flags or `PDM_*` environment variables.
#[derive(Parser, Debug, Clone)]
#[command(name = "failure-predictor")]
#[command(about = "Predictive-maintenance training and prediction API")]
#[command(version)]
pub struct Config {
    /// Bind address
    #[arg(long, env = "PDM_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Bind port
    #[arg(short, long, env = "PDM_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Folder receiving uploaded CSV files
    #[arg(long, env = "PDM_DATASET_DIR", default_value = "notebook/dataset")]
    pub dataset_dir: PathBuf,

    /// Folder receiving the raw copy and the train/test split
    #[arg(long, env = "PDM_ARTIFACT_DIR", default_value = "artifacts")]
    pub artifact_dir: PathBuf,

    /// Location of the trained model artifact
    #[arg(long, env = "PDM_MODEL_PATH", default_value = "artifacts/model.json")]
    pub model_path: PathBuf,

    /// Fraction of rows held out for testing
    #[arg(long, env = "PDM_TEST_RATIO", default_value_t = 0.2)]
    pub test_ratio: f64,

    /// Number of cross-validation folds used by the grid search
    #[arg(long, env = "PDM_CV_FOLDS", default_value_t = 3)]
    pub cv_folds: usize,

    /// Seed for the train/test shuffle and feature subsampling
    #[arg(long, env = "PDM_SEED", default_value_t = 42)]
    pub seed: u64,

    /// Largest accepted upload body, in bytes
    #[arg(long, env = "PDM_MAX_UPLOAD_BYTES", default_value_t = 16 * 1024 * 1024)]
    pub max_upload_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            dataset_dir: PathBuf::from("notebook/dataset"),
            artifact_dir: PathBuf::from("artifacts"),
            model_path: PathBuf::from("artifacts/model.json"),
            test_ratio: 0.2,
            cv_folds: 3,
            seed: 42,
            max_upload_bytes: 16 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Lay every on-disk location out under `root`. Used by tests and
    /// sandboxed deployments.
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            dataset_dir: root.join("dataset"),
            artifact_dir: root.join("artifacts"),
            model_path: root.join("artifacts").join("model.json"),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.test_ratio > 0.0 && self.test_ratio < 1.0) {
            return Err(Error::validation(format!(
                "test ratio must be between 0 and 1, got {}",
                self.test_ratio
            )));
        }
        if self.cv_folds < 2 {
            return Err(Error::validation(format!(
                "at least two cross-validation folds are required, got {}",
                self.cv_folds
            )));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_cli_defaults() {
        let parsed = Config::parse_from(["failure-predictor"]);
        let default = Config::default();
        assert_eq!(parsed.port, default.port);
        assert_eq!(parsed.model_path, default.model_path);
        assert_eq!(parsed.dataset_dir, default.dataset_dir);
        assert_eq!(parsed.cv_folds, default.cv_folds);
        assert_eq!(parsed.seed, default.seed);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn rejects_degenerate_split_and_folds() {
        let mut cfg = Config::default();
        cfg.test_ratio = 1.0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.cv_folds = 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rooted_config_keeps_model_under_artifacts() {
        let cfg = Config::rooted_at("/tmp/pdm");
        assert_eq!(cfg.model_path, PathBuf::from("/tmp/pdm/artifacts/model.json"));
        assert_eq!(cfg.bind_addr(), "127.0.0.1:8000");
    }
}
