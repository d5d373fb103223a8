//! HTTP routes for the upload → train → predict pipeline.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::error::{Error, Result};
use crate::ingestion::DataIngestion;
use crate::model::{Prediction, SensorReading};
use crate::state::{AppState, Status};

pub fn router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/status", get(status))
        .route("/upload", post(upload))
        .route("/train", post(train))
        .route("/predict", post(predict))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index() -> Json<Value> {
    Json(json!({ "message": "Welcome to the Prediction API!" }))
}

async fn status(State(state): State<Arc<AppState>>) -> Json<Status> {
    Json(state.status().await)
}

/// Accepts the first multipart field that carries a file name.
async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Value>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::validation(e.to_string()))?
    {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        // reject before reading the body
        DataIngestion::check_file_name(&file_name)?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| Error::validation(e.to_string()))?;

        let split = state.upload(file_name, bytes.to_vec()).await?;
        return Ok(Json(json!({
            "message": "File uploaded and train-test split completed successfully.",
            "train_rows": split.train_rows,
            "test_rows": split.test_rows,
        })));
    }
    Err(Error::validation("No file uploaded."))
}

async fn train(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    let report = state.train().await?;
    Ok(Json(json!({
        "message": "Model trained successfully.",
        "accuracy": report.accuracy,
        "f1_score": report.f1_score,
        "best_params": report.best_params,
        "cv_score": report.cv_score,
    })))
}

async fn predict(
    State(state): State<Arc<AppState>>,
    reading: std::result::Result<Json<SensorReading>, JsonRejection>,
) -> Result<Json<Prediction>> {
    let Json(reading) = reading.map_err(|rejection| Error::validation(rejection.body_text()))?;
    Ok(Json(state.predict(&reading).await?))
}
