use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::config::Config;
use crate::dataset::LabeledData;
use crate::error::{Error, Result};
use crate::grid::{param_grid, GridSearch, HyperParams};
use crate::ingestion::SplitPaths;
use crate::model::FailureModel;

/// Outcome of one training run, scored on the held-out split.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub accuracy: f64,
    pub f1_score: f64,
    pub best_params: HyperParams,
    pub cv_score: f64,
}

#[derive(Debug, Clone)]
pub struct ModelTrainer {
    model_path: PathBuf,
    cv_folds: usize,
    seed: u64,
}

impl ModelTrainer {
    pub fn new(config: &Config) -> Self {
        Self {
            model_path: config.model_path.clone(),
            cv_folds: config.cv_folds,
            seed: config.seed,
        }
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Search the grid on the train split, refit the winner on all of it,
    /// overwrite the artifact and score the test split.
    pub fn train(&self, split: &SplitPaths) -> Result<TrainingReport> {
        let train = LabeledData::from_csv(&split.train)?;
        let test = LabeledData::from_csv(&split.test)?;
        info!(
            train_rows = train.nsamples(),
            test_rows = test.nsamples(),
            "reading of train and test data completed"
        );
        if test.nsamples() == 0 {
            return Err(Error::training("test set is empty"));
        }

        let search = GridSearch::new(param_grid(), self.cv_folds, self.seed)?.fit(&train)?;
        info!(
            evaluated = search.evaluated,
            cv_score = search.best_score,
            "hyperparameter tuning performed"
        );

        let model = FailureModel::fit(&search.best, &train)?;
        info!(
            params = ?model.params(),
            features = ?model.used_feature_names(),
            "refitted best candidate on the full train split"
        );
        model.save(&self.model_path)?;

        let eval = model.evaluate(&test)?;
        info!(
            accuracy = eval.accuracy,
            f1_score = eval.f1_score,
            "model evaluated on held-out split"
        );
        Ok(TrainingReport {
            accuracy: eval.accuracy,
            f1_score: eval.f1_score,
            best_params: search.best.params,
            cv_score: search.best_score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::DataIngestion;

    fn machine_csv(rows: usize) -> String {
        let mut body = String::from(
            "UDI,Product ID,Type,Air temperature [K],Process temperature [K],Rotational speed [rpm],Torque [Nm],Tool wear [min],Target,Failure Type\n",
        );
        for i in 0..rows {
            let fails = i % 4 == 0;
            let jitter = (i % 5) as f64 * 0.2;
            let (speed, torque, wear, kind) = if fails {
                (1280 + i % 9, 66.0 + jitter, 215 + i % 11, "Overstrain Failure")
            } else {
                (1520 + i % 9, 38.0 + jitter, 60 + i % 11, "No Failure")
            };
            body.push_str(&format!(
                "{},M{},M,{:.1},{:.1},{},{:.1},{},{},{}\n",
                i + 1,
                14000 + i,
                298.0 + jitter,
                308.5 + jitter,
                speed,
                torque,
                wear,
                u8::from(fails),
                kind
            ));
        }
        body
    }

    #[test]
    fn trains_scores_and_writes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::rooted_at(dir.path());
        let split = DataIngestion::new(&config)
            .ingest("machines.csv", machine_csv(80).as_bytes())
            .unwrap();

        let trainer = ModelTrainer::new(&config);
        let report = trainer.train(&split).unwrap();
        assert!((0.0..=1.0).contains(&report.accuracy));
        assert!((0.0..=1.0).contains(&report.f1_score));
        assert!(report.accuracy > 0.9);
        assert!(trainer.model_path().exists());
        assert!(FailureModel::load(trainer.model_path()).is_ok());
    }

    #[test]
    fn retraining_with_the_same_seed_is_reproducible() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::rooted_at(dir.path());
        let split = DataIngestion::new(&config)
            .ingest("machines.csv", machine_csv(40).as_bytes())
            .unwrap();
        let trainer = ModelTrainer::new(&config);
        let first = trainer.train(&split).unwrap();
        let second = trainer.train(&split).unwrap();
        assert_eq!(first.accuracy, second.accuracy);
        assert_eq!(first.f1_score, second.f1_score);
        assert_eq!(first.best_params, second.best_params);
    }

    #[test]
    fn missing_split_files_are_io_errors() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = ModelTrainer::new(&Config::rooted_at(dir.path()));
        let split = SplitPaths {
            train: dir.path().join("nope-train.csv"),
            test: dir.path().join("nope-test.csv"),
            train_rows: 0,
            test_rows: 0,
        };
        assert!(matches!(trainer.train(&split), Err(Error::Io(_))));
    }
}
