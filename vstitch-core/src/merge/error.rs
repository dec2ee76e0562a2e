use std::path::PathBuf;

use thiserror::Error;

use crate::compose::ComposeError;
use crate::encode::EncodeError;
use crate::probe::ProbeError;
use crate::source::SourceError;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("no sources provided")]
    NoSources,
    #[error("acquisition failed: {0}")]
    Acquire(#[from] SourceError),
    #[error("probe failed: {0}")]
    Probe(#[from] ProbeError),
    #[error("composition failed: {0}")]
    Compose(#[from] ComposeError),
    #[error("encode failed: {0}")]
    Encode(#[from] EncodeError),
    #[error("failed to remove original {path}: {source}")]
    Cleanup {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
}

pub type MergeResult<T> = Result<T, MergeError>;
