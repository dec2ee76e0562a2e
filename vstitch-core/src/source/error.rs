use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("network error: {0}")]
    Network(String),
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("downloader failed (status {status:?}): {stderr}")]
    Downloader {
        status: Option<i32>,
        stderr: String,
    },
    #[error("downloader produced no usable output: {0}")]
    DownloaderOutput(String),
    #[error("invalid source url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl From<reqwest::Error> for SourceError {
    fn from(error: reqwest::Error) -> Self {
        SourceError::Network(error.to_string())
    }
}

pub type SourceResult<T> = Result<T, SourceError>;
