//! Application-wide error types.

use thiserror::Error;

use crate::domain::Stage;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Session error for tenant {tenant_id} after {attempts} attempt(s): {message}")]
    Session {
        tenant_id: String,
        attempts: u32,
        message: String,
    },

    #[error("No playable stream found for {locator}")]
    NoStreamFound { locator: String },

    #[error("Resolution error: {0}")]
    Resolution(String),

    #[error("Acquisition error: {0}")]
    Acquisition(String),

    #[error("Normalization error: {0}")]
    Normalization(String),

    #[error("Publish error: {0}")]
    Publish(String),

    #[error("Source query error: {0}")]
    Source(String),

    #[error("Tenant {0} is already running")]
    AlreadyRunning(String),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Supervisor is not available")]
    SupervisorUnavailable,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Process error: {0}")]
    Process(#[from] process_utils::ProcessError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn acquisition(msg: impl Into<String>) -> Self {
        Self::Acquisition(msg.into())
    }

    pub fn normalization(msg: impl Into<String>) -> Self {
        Self::Normalization(msg.into())
    }

    pub fn publish(msg: impl Into<String>) -> Self {
        Self::Publish(msg.into())
    }

    /// Re-tag an error as belonging to a pipeline stage.
    ///
    /// Errors that already carry a stage-specific variant are kept as-is so the
    /// original message survives; generic errors (I/O, process, HTTP) are
    /// wrapped into the stage's variant.
    pub fn in_stage(self, stage: Stage) -> Self {
        match (stage, self) {
            (_, e @ Error::NoStreamFound { .. }) => e,
            (Stage::Resolve, e @ Error::Resolution(_)) => e,
            (Stage::Acquire, e @ Error::Acquisition(_)) => e,
            (Stage::Normalize, e @ Error::Normalization(_)) => e,
            (Stage::Publish, e @ Error::Publish(_)) => e,
            (Stage::Resolve, e) => Error::Resolution(e.to_string()),
            (Stage::Acquire, e) => Error::Acquisition(e.to_string()),
            (Stage::Normalize, e) => Error::Normalization(e.to_string()),
            (Stage::Publish, e) => Error::Publish(e.to_string()),
        }
    }
}
