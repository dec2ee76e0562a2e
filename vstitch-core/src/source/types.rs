use std::fmt;
use std::path::{Path, PathBuf};

use url::Url;

/// One input as supplied on the command line: a URL or a local path, either
/// a direct media file or an adaptive-streaming playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor(String);

impl SourceDescriptor {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Basename of the URL path (query ignored) or of the plain path.
    pub fn file_name(&self) -> String {
        let path = match Url::parse(&self.0) {
            Ok(url) => url.path().to_string(),
            Err(_) => self.0.clone(),
        };
        path.rsplit('/').next().unwrap_or_default().to_string()
    }

    /// Playlists are recognized by their extension, case-insensitively.
    pub fn is_playlist(&self) -> bool {
        Path::new(&self.file_name())
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("m3u8"))
            .unwrap_or(false)
    }
}

impl From<&str> for SourceDescriptor {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Acquisition result for one descriptor. `downloaded` is set only when the
/// acquirer materialized a file that may be cleaned up after a merge;
/// passthrough resolution leaves it empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredMedia {
    pub locator: String,
    pub downloaded: Option<PathBuf>,
}

impl AcquiredMedia {
    pub fn local(path: PathBuf) -> Self {
        Self {
            locator: path.to_string_lossy().to_string(),
            downloaded: Some(path),
        }
    }

    pub fn remote(url: impl Into<String>) -> Self {
        Self {
            locator: url.into(),
            downloaded: None,
        }
    }
}
