use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;
use vstitch_core::encode::Preset;
use vstitch_core::merge::{MergeOutcome, MergeReport, MergeRequest, Merger};
use vstitch_core::source::{SourceDescriptor, TransferProgress};
use vstitch_core::{load_vstitch_config, VstitchConfig};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] vstitch_core::ConfigError),
    #[error("{0}")]
    Merge(#[from] vstitch_core::MergeError),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Stack remote video sources side by side into one file",
    long_about = None
)]
pub struct Cli {
    /// Path of the merged output file
    pub output: PathBuf,
    /// Source URLs or paths (m3u8 playlists or direct media files)
    #[arg(required = true)]
    pub sources: Vec<String>,
    /// Extra camera source, appended after the positional sources
    #[arg(long)]
    pub camera: Option<String>,
    /// x264/x265 constant rate factor (lower means higher quality)
    #[arg(long, default_value_t = 23)]
    pub crf: i32,
    /// x264/x265 speed preset
    #[arg(long, default_value_t = Preset::Medium)]
    pub preset: Preset,
    /// Keep downloaded source files after a merge
    #[arg(long, default_value_t = false)]
    pub keep_originals: bool,
    /// Encode with libx265 instead of libx264
    #[arg(long, default_value_t = false)]
    pub x265: bool,
    /// Optional vstitch.toml with tool paths and download settings
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Output format for the final report
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => load_vstitch_config(path)?,
        None => VstitchConfig::default(),
    };

    let request = MergeRequest {
        sources: collect_sources(&cli),
        output: cli.output.clone(),
        crf: cli.crf,
        preset: cli.preset,
        x265: cli.x265,
        keep_originals: cli.keep_originals,
    };

    let merger = Merger::new(config)?;
    let mut progress = DownloadBars::default();
    let report = merger.run(&request, &mut progress).await?;
    render(&report, cli.format)
}

fn collect_sources(cli: &Cli) -> Vec<SourceDescriptor> {
    let mut sources: Vec<SourceDescriptor> =
        cli.sources.iter().map(SourceDescriptor::new).collect();
    if let Some(camera) = &cli.camera {
        sources.push(SourceDescriptor::new(camera));
    }
    sources
}

fn render(report: &MergeReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!("{}", report.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(report)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

impl DisplayFallback for MergeReport {
    fn display(&self) -> String {
        let mut lines = vec![format!("Output: {}", self.output.display())];
        match self.outcome {
            MergeOutcome::Moved => lines.push("Moved single source into place".to_string()),
            MergeOutcome::Merged => lines.push(format!("Merged {} sources", self.sources)),
        }
        if !self.removed_originals.is_empty() {
            lines.push(format!(
                "Removed {} downloaded file(s)",
                self.removed_originals.len()
            ));
        }
        lines.join("\n")
    }
}

/// One indicatif bar per transfer; indeterminate totals fall back to a
/// spinner with a running byte count.
#[derive(Default)]
struct DownloadBars {
    current: Option<ProgressBar>,
}

impl TransferProgress for DownloadBars {
    fn begin(&mut self, name: &str, total: Option<u64>) {
        let bar = match total {
            Some(total) => {
                let bar = ProgressBar::new(total);
                bar.set_style(
                    ProgressStyle::default_bar()
                        .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes}")
                        .unwrap()
                        .progress_chars("#>-"),
                );
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(
                    ProgressStyle::default_spinner()
                        .template("{spinner:.green} {msg} {bytes}")
                        .unwrap(),
                );
                bar
            }
        };
        bar.set_message(name.to_string());
        self.current = Some(bar);
    }

    fn advance(&mut self, bytes: u64) {
        if let Some(bar) = &self.current {
            bar.inc(bytes);
        }
    }

    fn finish(&mut self) {
        if let Some(bar) = self.current.take() {
            bar.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn defaults_match_the_common_case() {
        let cli = parse(&["vstitchctl", "out.mp4", "https://host/a.m3u8"]);
        assert_eq!(cli.crf, 23);
        assert_eq!(cli.preset, Preset::Medium);
        assert!(!cli.keep_originals);
        assert!(!cli.x265);
    }

    #[test]
    fn at_least_one_source_is_required() {
        assert!(Cli::try_parse_from(["vstitchctl", "out.mp4"]).is_err());
    }

    #[test]
    fn unknown_preset_is_rejected_at_parse_time() {
        let result = Cli::try_parse_from([
            "vstitchctl",
            "out.mp4",
            "https://host/a.m3u8",
            "--preset",
            "warp9",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn every_documented_preset_parses() {
        for name in [
            "ultrafast",
            "superfast",
            "veryfast",
            "faster",
            "fast",
            "medium",
            "slow",
            "slower",
            "veryslow",
            "placebo",
        ] {
            let cli = parse(&[
                "vstitchctl",
                "out.mp4",
                "https://host/a.m3u8",
                "--preset",
                name,
            ]);
            assert_eq!(cli.preset.as_str(), name);
        }
    }

    #[test]
    fn camera_flag_appends_a_trailing_source() {
        let cli = parse(&[
            "vstitchctl",
            "out.mp4",
            "https://host/presentation.m3u8",
            "--camera",
            "https://host/camera.m3u8",
        ]);
        let sources = collect_sources(&cli);
        assert_eq!(
            sources,
            vec![
                SourceDescriptor::new("https://host/presentation.m3u8"),
                SourceDescriptor::new("https://host/camera.m3u8"),
            ]
        );
    }

    #[test]
    fn sources_keep_command_line_order() {
        let cli = parse(&[
            "vstitchctl",
            "out.mp4",
            "https://host/one.m3u8",
            "https://host/two.m3u8",
            "https://host/three.m3u8",
        ]);
        let sources = collect_sources(&cli);
        let raw: Vec<&str> = sources.iter().map(|s| s.as_str()).collect();
        assert_eq!(
            raw,
            vec![
                "https://host/one.m3u8",
                "https://host/two.m3u8",
                "https://host/three.m3u8",
            ]
        );
    }
}
