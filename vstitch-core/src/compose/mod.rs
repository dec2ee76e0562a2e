use thiserror::Error;

use crate::probe::ProbedMedia;

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("composition requires at least one input")]
    NoInputs,
}

/// Video transform graph. Inputs are referenced by their position in the
/// probed list, which matches the order sources were supplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoNode {
    Source { input: usize },
    Pad { input: usize, target_height: u32 },
    HStack { streams: Vec<VideoNode> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioNode {
    Source { input: usize },
    Mix { streams: Vec<AudioNode> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCodec {
    Copy,
    Opus,
}

impl AudioCodec {
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            AudioCodec::Copy => "copy",
            AudioCodec::Opus => "libopus",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositionPlan {
    pub video: VideoNode,
    pub audio: Option<AudioNode>,
    pub audio_codec: Option<AudioCodec>,
}

/// Builds the stack-and-mix plan for the given inputs. Pure: identical
/// inputs always yield identical plans.
pub fn plan(inputs: &[ProbedMedia]) -> Result<CompositionPlan, ComposeError> {
    if inputs.is_empty() {
        return Err(ComposeError::NoInputs);
    }
    let video = plan_video(inputs);
    let (audio, audio_codec) = match plan_audio(inputs) {
        Some((node, codec)) => (Some(node), Some(codec)),
        None => (None, None),
    };
    Ok(CompositionPlan {
        video,
        audio,
        audio_codec,
    })
}

pub fn target_height(inputs: &[ProbedMedia]) -> u32 {
    inputs
        .iter()
        .map(|media| media.video_height)
        .max()
        .unwrap_or(0)
}

/// Pads every input shorter than the tallest one to the common height
/// (borders split evenly above and below), then stacks left to right in
/// input order. Inputs already at the target height pass through untouched.
fn plan_video(inputs: &[ProbedMedia]) -> VideoNode {
    let target = target_height(inputs);
    let mut streams: Vec<VideoNode> = inputs
        .iter()
        .enumerate()
        .map(|(input, media)| {
            if media.video_height == target {
                VideoNode::Source { input }
            } else {
                VideoNode::Pad {
                    input,
                    target_height: target,
                }
            }
        })
        .collect();
    if streams.len() == 1 {
        return streams.remove(0);
    }
    VideoNode::HStack { streams }
}

/// Audio policy keys off the number of inputs that carry audio, not the
/// number of inputs: zero tracks mean a silent output, a lone track is
/// copied through without re-encoding, two or more are downmixed and
/// re-encoded with a lossy codec.
fn plan_audio(inputs: &[ProbedMedia]) -> Option<(AudioNode, AudioCodec)> {
    let with_audio: Vec<usize> = inputs
        .iter()
        .enumerate()
        .filter(|(_, media)| media.has_audio)
        .map(|(input, _)| input)
        .collect();
    match with_audio.as_slice() {
        [] => None,
        [only] => Some((AudioNode::Source { input: *only }, AudioCodec::Copy)),
        many => Some((
            AudioNode::Mix {
                streams: many
                    .iter()
                    .map(|&input| AudioNode::Source { input })
                    .collect(),
            },
            AudioCodec::Opus,
        )),
    }
}
