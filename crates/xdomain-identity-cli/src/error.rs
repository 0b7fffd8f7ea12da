//! Error types for the CLI harness.

use xdomain_identity::TrackingError;

#[derive(thiserror::Error, Debug)]
pub enum CliError {
    #[error("Tracking error: {0}")]
    Tracking(#[from] TrackingError),

    #[error("Invalid URL {0:?}: {1}")]
    InvalidUrl(String, url::ParseError),

    #[error("Page has no link at index {0}")]
    LinkNotFound(usize),

    #[error("Link {0} does not lead anywhere")]
    NoNavigation(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type CliResult<T> = Result<T, CliError>;
