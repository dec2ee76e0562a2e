use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::encode::Preset;
use crate::source::SourceDescriptor;

#[derive(Debug, Clone)]
pub struct MergeRequest {
    pub sources: Vec<SourceDescriptor>,
    pub output: PathBuf,
    pub crf: i32,
    pub preset: Preset,
    pub x265: bool,
    pub keep_originals: bool,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MergeOutcome {
    /// A single source was moved into place without invoking the encoder.
    Moved,
    /// Several sources were composited into one file by the encoder.
    Merged,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeReport {
    pub output: PathBuf,
    pub outcome: MergeOutcome,
    pub sources: usize,
    pub removed_originals: Vec<PathBuf>,
    pub completed_at: DateTime<Utc>,
}

impl MergeReport {
    pub fn new(
        output: PathBuf,
        outcome: MergeOutcome,
        sources: usize,
        removed_originals: Vec<PathBuf>,
    ) -> Self {
        Self {
            output,
            outcome,
            sources,
            removed_originals,
            completed_at: Utc::now(),
        }
    }
}
