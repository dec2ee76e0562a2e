mod error;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use tokio::process::Command;
use tracing::info;

use crate::compose::{AudioNode, CompositionPlan, VideoNode};
use crate::config::ToolsSection;
use crate::exec::{CommandExecutor, SystemCommandExecutor};

pub use error::{EncodeError, EncodeResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    H264,
    H265,
}

impl VideoCodec {
    pub fn from_x265_flag(x265: bool) -> Self {
        if x265 {
            VideoCodec::H265
        } else {
            VideoCodec::H264
        }
    }

    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "libx264",
            VideoCodec::H265 => "libx265",
        }
    }
}

/// x264/x265 speed presets, slowest-but-best last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preset {
    Ultrafast,
    Superfast,
    Veryfast,
    Faster,
    Fast,
    #[default]
    Medium,
    Slow,
    Slower,
    Veryslow,
    Placebo,
}

impl Preset {
    pub const ALL: [Preset; 10] = [
        Preset::Ultrafast,
        Preset::Superfast,
        Preset::Veryfast,
        Preset::Faster,
        Preset::Fast,
        Preset::Medium,
        Preset::Slow,
        Preset::Slower,
        Preset::Veryslow,
        Preset::Placebo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::Ultrafast => "ultrafast",
            Preset::Superfast => "superfast",
            Preset::Veryfast => "veryfast",
            Preset::Faster => "faster",
            Preset::Fast => "fast",
            Preset::Medium => "medium",
            Preset::Slow => "slow",
            Preset::Slower => "slower",
            Preset::Veryslow => "veryslow",
            Preset::Placebo => "placebo",
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Preset::ALL
            .iter()
            .copied()
            .find(|preset| preset.as_str() == value)
            .ok_or_else(|| {
                format!(
                    "unknown preset {value:?} (expected one of: {})",
                    Preset::ALL.map(|p| p.as_str()).join(", ")
                )
            })
    }
}

/// One encoder invocation: built once, executed once.
#[derive(Debug, Clone)]
pub struct EncodeRequest {
    pub inputs: Vec<String>,
    pub plan: CompositionPlan,
    pub output: PathBuf,
    pub video_codec: VideoCodec,
    pub crf: i32,
    pub preset: Preset,
}

pub struct EncodeDriver {
    ffmpeg: PathBuf,
    executor: Arc<dyn CommandExecutor>,
}

impl EncodeDriver {
    pub fn new(tools: &ToolsSection) -> Self {
        Self {
            ffmpeg: tools.ffmpeg.clone(),
            executor: Arc::new(SystemCommandExecutor),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// Runs the encoder to completion. Succeeds only when the process exits
    /// cleanly and the output file exists afterwards.
    pub async fn encode(&self, request: &EncodeRequest) -> EncodeResult<()> {
        let args = build_args(request);
        info!(
            output = %request.output.display(),
            inputs = request.inputs.len(),
            codec = request.video_codec.ffmpeg_name(),
            "running encoder"
        );
        let mut command = Command::new(&self.ffmpeg);
        command.kill_on_drop(true);
        for arg in &args {
            command.arg(arg);
        }
        let output = self.executor.run(&mut command).await?;
        if !output.status.success() {
            return Err(EncodeError::Failed {
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        if !request.output.exists() {
            return Err(EncodeError::MissingOutput(request.output.clone()));
        }
        Ok(())
    }
}

/// Renders the full ffmpeg argument list for a request. Pure so the mapping
/// from plan to command line is testable without an encoder installed.
pub fn build_args(request: &EncodeRequest) -> Vec<String> {
    let mut args = vec!["-hide_banner".to_string(), "-y".to_string()];
    for input in &request.inputs {
        args.push("-i".to_string());
        args.push(input.clone());
    }
    let graph = render_filter_graph(&request.plan);
    if let Some(filter) = graph.filter_complex {
        args.push("-filter_complex".to_string());
        args.push(filter);
    }
    args.push("-map".to_string());
    args.push(graph.video_map);
    if let Some(audio_map) = graph.audio_map {
        args.push("-map".to_string());
        args.push(audio_map);
    }
    args.push("-c:v".to_string());
    args.push(request.video_codec.ffmpeg_name().to_string());
    args.push("-crf".to_string());
    args.push(request.crf.to_string());
    args.push("-preset".to_string());
    args.push(request.preset.to_string());
    match request.plan.audio_codec {
        Some(codec) => {
            args.push("-c:a".to_string());
            args.push(codec.ffmpeg_name().to_string());
        }
        None => args.push("-an".to_string()),
    }
    args.push(request.output.to_string_lossy().to_string());
    args
}

struct FilterGraph {
    filter_complex: Option<String>,
    video_map: String,
    audio_map: Option<String>,
}

fn render_filter_graph(plan: &CompositionPlan) -> FilterGraph {
    let mut chains: Vec<String> = Vec::new();

    let video_map = match &plan.video {
        VideoNode::Source { input } => format!("{input}:v"),
        node => video_label(node, &mut chains, "[vout]"),
    };

    let audio_map = plan.audio.as_ref().map(|audio| match audio {
        AudioNode::Source { input } => format!("{input}:a"),
        AudioNode::Mix { streams } => {
            let labels: String = streams
                .iter()
                .map(|node| match node {
                    AudioNode::Source { input } => format!("[{input}:a]"),
                    AudioNode::Mix { .. } => String::new(),
                })
                .collect();
            chains.push(format!("{labels}amix=inputs={}[aout]", streams.len()));
            "[aout]".to_string()
        }
    });

    FilterGraph {
        filter_complex: if chains.is_empty() {
            None
        } else {
            Some(chains.join(";"))
        },
        video_map,
        audio_map,
    }
}

/// Emits the filter chain for a video node and returns the label the output
/// should be mapped from. Pads keep the frame width (`width=0`) and center
/// the original picture inside the taller frame.
fn video_label(node: &VideoNode, chains: &mut Vec<String>, out_label: &str) -> String {
    match node {
        VideoNode::Source { input } => format!("[{input}:v]"),
        VideoNode::Pad {
            input,
            target_height,
        } => {
            chains.push(format!(
                "[{input}:v]{}{out_label}",
                pad_filter(*target_height)
            ));
            out_label.to_string()
        }
        VideoNode::HStack { streams } => {
            let labels: String = streams
                .iter()
                .map(|stream| match stream {
                    VideoNode::Source { input } => format!("[{input}:v]"),
                    VideoNode::Pad {
                        input,
                        target_height,
                    } => {
                        chains.push(format!(
                            "[{input}:v]{}[v{input}]",
                            pad_filter(*target_height)
                        ));
                        format!("[v{input}]")
                    }
                    VideoNode::HStack { .. } => String::new(),
                })
                .collect();
            chains.push(format!("{labels}hstack=inputs={}{out_label}", streams.len()));
            out_label.to_string()
        }
    }
}

fn pad_filter(target_height: u32) -> String {
    format!("pad=width=0:height={target_height}:x=(ow-iw)/2:y=(oh-ih)/2")
}
