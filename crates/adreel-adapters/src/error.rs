use thiserror::Error;

/// Errors raised while building service clients.
///
/// Failures during a call are reported as [`adreel_proto::CampaignError`]
/// so the orchestrator can classify them.
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("HTTP client setup failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Missing credential: environment variable {0} is not set")]
    MissingCredential(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, AdapterError>;
