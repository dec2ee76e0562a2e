use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VstitchConfig {
    pub tools: ToolsSection,
    pub download: DownloadSection,
    pub probe: ProbeSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub downloader: PathBuf,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            downloader: PathBuf::from("yt-dlp"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DownloadSection {
    pub user_agent: String,
    /// Output template handed to the playlist downloader, joined under the
    /// output directory.
    pub filename_template: String,
    pub restrict_filenames: bool,
    /// Force every source onto local disk even when the encoder could read
    /// the resolved stream URL directly.
    pub always_materialize: bool,
}

impl Default for DownloadSection {
    fn default() -> Self {
        Self {
            user_agent: "vstitch/0.1".to_string(),
            filename_template: "%(title)s-%(id)s.%(ext)s".to_string(),
            restrict_filenames: true,
            always_materialize: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProbeSection {
    pub timeout_seconds: u64,
}

impl Default for ProbeSection {
    fn default() -> Self {
        Self {
            timeout_seconds: 20,
        }
    }
}

pub fn load_vstitch_config<P: AsRef<Path>>(path: P) -> Result<VstitchConfig> {
    load_toml(path)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
