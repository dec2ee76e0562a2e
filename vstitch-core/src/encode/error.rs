use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("encoder failed (status {status:?}): {stderr}")]
    Failed {
        status: Option<i32>,
        stderr: String,
    },
    #[error("encoder exited cleanly but produced no output at {0}")]
    MissingOutput(PathBuf),
    #[error("io error launching encoder: {0}")]
    Io(#[from] std::io::Error),
}

pub type EncodeResult<T> = Result<T, EncodeError>;
