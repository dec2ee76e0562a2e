use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

use crate::config::{ProbeSection, ToolsSection};

/// Result alias for media probing operations.
pub type ProbeResult<T> = Result<T, ProbeError>;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("ffprobe failed for {locator}: {stderr}")]
    CommandFailed {
        locator: String,
        status: Option<i32>,
        stderr: String,
    },
    #[error("ffprobe timed out after {0:?}")]
    Timeout(Duration),
    #[error("invalid ffprobe payload: {0}")]
    Parse(String),
    #[error("no video stream in {0}")]
    MissingVideoStream(String),
    #[error("io error running ffprobe: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for ProbeError {
    fn from(error: serde_json::Error) -> Self {
        ProbeError::Parse(error.to_string())
    }
}

/// Stream facts needed for composition, read once per locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbedMedia {
    pub locator: String,
    pub video_height: u32,
    pub has_audio: bool,
}

pub struct MediaProbe {
    ffprobe: PathBuf,
    timeout: Duration,
    cache: Mutex<HashMap<String, ProbedMedia>>,
}

impl MediaProbe {
    pub fn new(tools: &ToolsSection, probe: &ProbeSection) -> Self {
        Self {
            ffprobe: tools.ffprobe.clone(),
            timeout: Duration::from_secs(probe.timeout_seconds),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Reads container metadata for `locator` (a local path or a stream URL).
    /// Each locator is probed at most once per probe instance.
    pub async fn probe(&self, locator: &str) -> ProbeResult<ProbedMedia> {
        if let Some(hit) = self.cache.lock().unwrap().get(locator) {
            return Ok(hit.clone());
        }

        let mut command = Command::new(&self.ffprobe);
        command
            .kill_on_drop(true)
            .arg("-v")
            .arg("quiet")
            .arg("-print_format")
            .arg("json")
            .arg("-show_streams")
            .arg(locator);
        let output = match timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => return Err(ProbeError::Io(err)),
            Err(_) => return Err(ProbeError::Timeout(self.timeout)),
        };
        if !output.status.success() {
            return Err(ProbeError::CommandFailed {
                locator: locator.to_string(),
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let payload: FfprobeOutput = serde_json::from_slice(&output.stdout)?;
        let probed = probed_from_payload(locator, &payload)?;
        self.cache
            .lock()
            .unwrap()
            .insert(locator.to_string(), probed.clone());
        Ok(probed)
    }
}

/// Single adapter over the untyped ffprobe payload; everything downstream
/// sees only `ProbedMedia`.
fn probed_from_payload(locator: &str, payload: &FfprobeOutput) -> ProbeResult<ProbedMedia> {
    let video = payload
        .streams
        .iter()
        .find(|stream| stream.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| ProbeError::MissingVideoStream(locator.to_string()))?;
    let video_height = video.height.ok_or_else(|| {
        ProbeError::Parse(format!("video stream in {locator} is missing a height"))
    })?;
    let has_audio = payload
        .streams
        .iter()
        .any(|stream| stream.codec_type.as_deref() == Some("audio"));
    Ok(ProbedMedia {
        locator: locator.to_string(),
        video_height,
        has_audio,
    })
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    #[serde(default)]
    codec_type: Option<String>,
    #[serde(default)]
    height: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(payload: &str) -> FfprobeOutput {
        serde_json::from_str(payload).unwrap()
    }

    #[test]
    fn height_comes_from_first_video_stream() {
        let payload = parse(
            r#"{"streams": [
                {"codec_type": "audio"},
                {"codec_type": "video", "height": 720},
                {"codec_type": "video", "height": 1080}
            ]}"#,
        );
        let probed = probed_from_payload("clip.mp4", &payload).unwrap();
        assert_eq!(probed.video_height, 720);
        assert!(probed.has_audio);
    }

    #[test]
    fn silent_video_reports_no_audio() {
        let payload = parse(r#"{"streams": [{"codec_type": "video", "height": 480}]}"#);
        let probed = probed_from_payload("silent.mp4", &payload).unwrap();
        assert!(!probed.has_audio);
    }

    #[test]
    fn audio_only_file_is_rejected() {
        let payload = parse(r#"{"streams": [{"codec_type": "audio"}]}"#);
        let err = probed_from_payload("track.opus", &payload).unwrap_err();
        assert!(matches!(err, ProbeError::MissingVideoStream(_)));
    }

    #[test]
    fn video_stream_without_height_is_a_parse_error() {
        let payload = parse(r#"{"streams": [{"codec_type": "video"}]}"#);
        let err = probed_from_payload("weird.mkv", &payload).unwrap_err();
        assert!(matches!(err, ProbeError::Parse(_)));
    }
}
