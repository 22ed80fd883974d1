//! Error types for the census-discover crate.
//!
//! These are run-level errors. Per-host failures are `census_core::ProbeError`
//! and never surface here.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscoverError {
    #[error("Invalid target format: {input:?}")]
    InvalidTargetFormat { input: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Config error: {0}")]
    ConfigLoad(String),

    #[error("Liveness probe unavailable: {0}")]
    LivenessInit(String),

    #[error("No host succeeded out of {total}")]
    NothingSucceeded { total: usize },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Vault error: {0}")]
    Vault(#[from] census_vault::VaultError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for DiscoverError {
    fn from(e: config::ConfigError) -> Self {
        Self::ConfigLoad(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DiscoverError>;
