use thiserror::Error;

use crate::repository::errors::RepositoryError;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The feed address cannot be built. Retrying cannot help.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Connect or read failure on the live feed. Recovered by reconnecting.
    #[error("appointment feed error: {0}")]
    Transport(String),

    #[error("appointment listing failed: {0}")]
    Listing(#[from] RepositoryError),

    #[error("notification client is shut down")]
    ShutDown,
}

impl ClientError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Listing(e) => !matches!(e, RepositoryError::NotFound),
            ClientError::Transport(_) => true,
            ClientError::Configuration(_) | ClientError::ShutDown => false,
        }
    }
}
