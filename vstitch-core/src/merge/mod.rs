mod error;
mod types;

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info};

use crate::compose;
use crate::config::VstitchConfig;
use crate::encode::{EncodeDriver, EncodeRequest, VideoCodec};
use crate::probe::MediaProbe;
use crate::source::{SourceAcquirer, TransferProgress};

pub use error::{MergeError, MergeResult};
pub use types::{MergeOutcome, MergeReport, MergeRequest};

/// Drives one merge run end to end: acquire, probe, plan, encode, finalize.
pub struct Merger {
    config: VstitchConfig,
    probe: MediaProbe,
    acquirer: SourceAcquirer,
    encoder: EncodeDriver,
}

impl Merger {
    pub fn new(config: VstitchConfig) -> MergeResult<Self> {
        let probe = MediaProbe::new(&config.tools, &config.probe);
        let acquirer = SourceAcquirer::new(&config.tools, &config.download)?;
        let encoder = EncodeDriver::new(&config.tools);
        Ok(Self {
            config,
            probe,
            acquirer,
            encoder,
        })
    }

    pub async fn run(
        &self,
        request: &MergeRequest,
        progress: &mut dyn TransferProgress,
    ) -> MergeResult<MergeReport> {
        if request.sources.is_empty() {
            return Err(MergeError::NoSources);
        }
        let output_dir = output_directory(&request.output);
        fs::create_dir_all(&output_dir)
            .await
            .map_err(|source| MergeError::Io {
                path: output_dir.clone(),
                source,
            })?;

        // Sources are materialized on disk whenever the originals must
        // survive the run or there is only one of them; with several
        // throwaway sources the encoder reads the resolved stream URLs
        // directly unless the configuration insists on local files.
        let materialize = request.keep_originals
            || request.sources.len() == 1
            || self.config.download.always_materialize;
        let acquired = if materialize {
            self.acquirer
                .acquire(&request.sources, &output_dir, progress)
                .await?
        } else {
            self.acquirer.resolve_final_urls(&request.sources).await?
        };

        if let [only] = acquired.as_slice() {
            if let Some(path) = &only.downloaded {
                let destination = finalize_single(path, &request.output).await?;
                info!(output = %destination.display(), "single source moved into place");
                return Ok(MergeReport::new(destination, MergeOutcome::Moved, 1, Vec::new()));
            }
        }

        let mut probed = Vec::with_capacity(acquired.len());
        for media in &acquired {
            probed.push(self.probe.probe(&media.locator).await?);
        }
        let plan = compose::plan(&probed)?;

        let encode_request = EncodeRequest {
            inputs: acquired.iter().map(|media| media.locator.clone()).collect(),
            plan,
            output: request.output.clone(),
            video_codec: VideoCodec::from_x265_flag(request.x265),
            crf: request.crf,
            preset: request.preset,
        };
        self.encoder.encode(&encode_request).await?;

        let mut removed = Vec::new();
        if !request.keep_originals {
            for media in &acquired {
                if let Some(path) = &media.downloaded {
                    fs::remove_file(path)
                        .await
                        .map_err(|source| MergeError::Cleanup {
                            path: path.clone(),
                            source,
                        })?;
                    removed.push(path.clone());
                }
            }
        }
        info!(
            output = %request.output.display(),
            sources = acquired.len(),
            "merge complete"
        );
        Ok(MergeReport::new(
            request.output.clone(),
            MergeOutcome::Merged,
            acquired.len(),
            removed,
        ))
    }
}

/// Moves a lone acquired file to the requested output path, keeping the
/// source container extension when the requested name disagrees with it.
async fn finalize_single(source: &Path, requested: &Path) -> MergeResult<PathBuf> {
    let destination = destination_for(source, requested);
    move_file(source, &destination).await?;
    Ok(destination)
}

fn output_directory(output: &Path) -> PathBuf {
    match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Same extension (case-insensitive): the requested path is used verbatim.
/// Different extension: the source extension is appended so the container
/// format is never mislabeled. A source without an extension keeps the
/// requested name.
fn destination_for(source: &Path, requested: &Path) -> PathBuf {
    let source_ext = source.extension().map(|ext| ext.to_ascii_lowercase());
    let requested_ext = requested.extension().map(|ext| ext.to_ascii_lowercase());
    if source_ext == requested_ext {
        return requested.to_path_buf();
    }
    match source.extension() {
        Some(ext) => {
            let mut raw = requested.as_os_str().to_os_string();
            raw.push(".");
            raw.push(ext);
            PathBuf::from(raw)
        }
        None => requested.to_path_buf(),
    }
}

async fn move_file(from: &Path, to: &Path) -> MergeResult<()> {
    if fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    // Rename fails across filesystems; copy and remove instead.
    debug!(from = %from.display(), to = %to.display(), "rename failed, copying");
    fs::copy(from, to).await.map_err(|source| MergeError::Io {
        path: to.to_path_buf(),
        source,
    })?;
    fs::remove_file(from).await.map_err(|source| MergeError::Io {
        path: from.to_path_buf(),
        source,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_extension_uses_requested_path_verbatim() {
        let destination = destination_for(Path::new("dl/clip.mp4"), Path::new("out/final.mp4"));
        assert_eq!(destination, PathBuf::from("out/final.mp4"));
    }

    #[test]
    fn extension_match_ignores_case() {
        let destination = destination_for(Path::new("dl/clip.MP4"), Path::new("out/final.mp4"));
        assert_eq!(destination, PathBuf::from("out/final.mp4"));
    }

    #[test]
    fn differing_extension_is_appended() {
        let destination = destination_for(Path::new("dl/clip.ts"), Path::new("out/final.mp4"));
        assert_eq!(destination, PathBuf::from("out/final.mp4.ts"));
    }

    #[test]
    fn source_without_extension_keeps_requested_name() {
        let destination = destination_for(Path::new("dl/clip"), Path::new("out/final.mp4"));
        assert_eq!(destination, PathBuf::from("out/final.mp4"));
    }

    #[test]
    fn bare_output_name_lands_in_current_directory() {
        assert_eq!(output_directory(Path::new("final.mp4")), PathBuf::from("."));
        assert_eq!(
            output_directory(Path::new("videos/final.mp4")),
            PathBuf::from("videos")
        );
    }
}
