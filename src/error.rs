//! Error taxonomy for the scraping pipeline.
//!
//! Every fallible operation returns [`Result`], and every [`ScrapeError`]
//! can be reduced to an [`ErrorKind`] tag. The top-level handler in `main`
//! reports on the tag rather than on the concrete variant.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ScrapeError>;

/// The coarse category of a failure.
///
/// `Configuration` failures happen before any browsing session or sink write.
/// The other kinds abort the current entity; rows already committed stay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    NotFound,
    Timeout,
    SchemaMismatch,
    External,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Timeout => "timeout",
            ErrorKind::SchemaMismatch => "schema-mismatch",
            ErrorKind::External => "external",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("file not available: {}", .0.display())]
    FileMissing(PathBuf),
    #[error("unable to locate {0}")]
    NotFound(String),
    #[error("timed out after {waited:?} waiting for {awaited}")]
    Timeout { awaited: String, waited: Duration },
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
    #[error("interrupted before the run finished")]
    Interrupted,
    #[error("webdriver error: {0}")]
    Driver(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl ScrapeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScrapeError::Configuration(_) | ScrapeError::FileMissing(_) | ScrapeError::Yaml(_) => {
                ErrorKind::Configuration
            }
            ScrapeError::NotFound(_) => ErrorKind::NotFound,
            ScrapeError::Timeout { .. } => ErrorKind::Timeout,
            ScrapeError::SchemaMismatch(_) => ErrorKind::SchemaMismatch,
            ScrapeError::Interrupted
            | ScrapeError::Driver(_)
            | ScrapeError::Io(_)
            | ScrapeError::Csv(_)
            | ScrapeError::Image(_)
            | ScrapeError::Http(_)
            | ScrapeError::Json(_) => ErrorKind::External,
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        ScrapeError::NotFound(what.into())
    }

    pub fn schema(detail: impl Into<String>) -> Self {
        ScrapeError::SchemaMismatch(detail.into())
    }
}
