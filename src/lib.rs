//! Predictive-maintenance service: upload a labeled sensor dataset, train a
//! decision-tree failure classifier on it, and serve predictions over HTTP.

pub mod api;
pub mod config;
pub mod dataset;
pub mod error;
pub mod grid;
pub mod ingestion;
pub mod metrics;
pub mod model;
pub mod state;
pub mod trainer;

pub use config::Config;
pub use error::{Error, Result};
pub use state::AppState;
