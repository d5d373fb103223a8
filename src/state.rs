use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::ingestion::{DataIngestion, SplitPaths};
use crate::model::{FailureModel, Prediction, SensorReading};
use crate::trainer::{ModelTrainer, TrainingReport};

pub const NO_DATA: &str = "No data uploaded. Please upload a dataset first.";
pub const NO_MODEL: &str = "Model is not trained. Please train the model first.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    NoModel,
    DataReady,
    ModelReady,
}

#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub phase: Phase,
    pub dataset_ready: bool,
    pub model_ready: bool,
}

#[derive(Default)]
struct Pipeline {
    split: Option<SplitPaths>,
    model: Option<Arc<FailureModel>>,
}

impl Pipeline {
    fn phase(&self) -> Phase {
        match (&self.split, &self.model) {
            (_, Some(_)) => Phase::ModelReady,
            (Some(_), None) => Phase::DataReady,
            (None, None) => Phase::NoModel,
        }
    }
}

/// Shared state handed to every request handler.
pub struct AppState {
    ingestion: DataIngestion,
    trainer: ModelTrainer,
    pipeline: RwLock<Pipeline>,
    /// Held while the split files are rewritten or trained on.
    files: Mutex<()>,
}

impl AppState {
    /// Build the state, picking up an existing model artifact if one is on disk.
    pub fn new(config: &Config) -> Self {
        let trainer = ModelTrainer::new(config);
        let model = if trainer.model_path().exists() {
            match FailureModel::load(trainer.model_path()) {
                Ok(model) => Some(Arc::new(model)),
                Err(err) => {
                    error!(
                        path = %trainer.model_path().display(),
                        error = %err,
                        "ignoring unreadable model artifact"
                    );
                    None
                }
            }
        } else {
            info!(path = %trainer.model_path().display(), "no model artifact yet");
            None
        };

        Self {
            ingestion: DataIngestion::new(config),
            trainer,
            pipeline: RwLock::new(Pipeline { split: None, model }),
            files: Mutex::new(()),
        }
    }

    pub async fn status(&self) -> Status {
        let pipeline = self.pipeline.read().await;
        Status {
            phase: pipeline.phase(),
            dataset_ready: pipeline.split.is_some(),
            model_ready: pipeline.model.is_some(),
        }
    }

    /// Store an uploaded CSV and split it; the new split replaces any previous one.
    /// Waits for a running training to finish before touching the split files.
    pub async fn upload(&self, file_name: String, bytes: Vec<u8>) -> Result<SplitPaths> {
        DataIngestion::check_file_name(&file_name)?;
        let _guard = self.files.lock().await;
        let ingestion = self.ingestion.clone();
        let split = tokio::task::spawn_blocking(move || ingestion.ingest(&file_name, &bytes))
            .await
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;

        self.pipeline.write().await.split = Some(split.clone());
        info!("CSV file has been uploaded");
        Ok(split)
    }

    /// Train on the current split, then reload the artifact and swap it in.
    pub async fn train(&self) -> Result<TrainingReport> {
        let _guard = self.files.lock().await;
        let split = self
            .pipeline
            .read()
            .await
            .split
            .clone()
            .ok_or_else(|| Error::validation(NO_DATA))?;

        let trainer = self.trainer.clone();
        let (report, model) = tokio::task::spawn_blocking(move || {
            let report = trainer.train(&split)?;
            let model = FailureModel::load(trainer.model_path())?;
            Ok::<_, Error>((report, model))
        })
        .await
        .map_err(Error::training)??;

        self.pipeline.write().await.model = Some(Arc::new(model));
        info!(accuracy = report.accuracy, f1_score = report.f1_score, "model reloaded");
        Ok(report)
    }

    pub async fn predict(&self, reading: &SensorReading) -> Result<Prediction> {
        let model = self
            .pipeline
            .read()
            .await
            .model
            .clone()
            .ok_or_else(|| Error::validation(NO_MODEL))?;
        model.predict(reading)
    }
}
