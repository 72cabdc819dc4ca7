use thiserror::Error;

use super::config::ConfigError;
use crate::core::models::error::ModelError;
use crate::core::utils::geometry::ProcrustesError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Chart model error: {source}")]
    Model {
        #[from]
        source: ModelError,
    },

    #[error("Configuration error: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("Procrustes failed: {source}")]
    Procrustes {
        #[from]
        source: ProcrustesError,
    },

    #[error("Failed to build thread pool with {threads} thread(s): {message}")]
    ThreadPool { threads: usize, message: String },

    #[error("Point {point_no} cannot be tested: {reason}")]
    PointNotTestable { point_no: usize, reason: &'static str },

    #[error("Merge precondition failed: {0}")]
    Merge(String),

    #[error("Internal logic error: {0}")]
    Internal(String),
}
