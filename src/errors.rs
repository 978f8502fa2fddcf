use std::result::Result as StdResult;

use thiserror::Error;

/// Crate-level error for configuration, persistence, and front-end plumbing.
///
/// Wizard-scoped failures (validation, staging, submission) have their own
/// types and never escape a wizard as a `MarketError`.
#[derive(Error, Debug)]
pub enum MarketError {
    #[error("Persistence error: {0}")]
    StorageError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Backend error: {0}")]
    Backend(#[from] crate::backend::BackendError),
    #[error("Prompt failed: {0}")]
    Prompt(String),
    #[error(transparent)]
    Wizard(#[from] crate::wizard::WizardError),
}

pub type Result<T> = StdResult<T, MarketError>;

impl From<std::io::Error> for MarketError {
    fn from(err: std::io::Error) -> Self {
        MarketError::StorageError(err.to_string())
    }
}

impl From<serde_json::Error> for MarketError {
    fn from(err: serde_json::Error) -> Self {
        MarketError::StorageError(err.to_string())
    }
}

impl From<dialoguer::Error> for MarketError {
    fn from(err: dialoguer::Error) -> Self {
        MarketError::Prompt(err.to_string())
    }
}
