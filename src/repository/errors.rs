use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Unexpected status: {0}")]
    Status(StatusCode),
    #[error("Invalid response body: {0}")]
    Decode(String),
    #[error("Not found")]
    NotFound,
}
