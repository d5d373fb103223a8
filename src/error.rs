use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Every failure the pipeline can surface.
///
/// `Validation` is the caller's fault and maps to 400; everything else is a
/// server-side failure and maps to 500.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("training failed: {0}")]
    Training(String),

    #[error("An error occurred during prediction: {0}")]
    Prediction(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn training(msg: impl ToString) -> Self {
        Error::Training(msg.to_string())
    }

    pub fn prediction(msg: impl ToString) -> Self {
        Error::Prediction(msg.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Io(_) | Error::Training(_) | Error::Prediction(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::Io(err.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Io(err.into())
    }
}

impl From<linfa::Error> for Error {
    fn from(err: linfa::Error) -> Self {
        Error::Training(err.to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::warn!(error = %self, "request rejected");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_is_client_error() {
        let err = Error::validation("Invalid file format. Please upload a CSV file.");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            err.to_string(),
            "Invalid file format. Please upload a CSV file."
        );
    }

    #[test]
    fn other_kinds_are_server_errors() {
        let io = Error::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(io.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            Error::training("bad target").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        let err = Error::prediction("no leaf");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            err.to_string(),
            "An error occurred during prediction: no leaf"
        );
    }
}
