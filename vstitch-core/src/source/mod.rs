mod error;
mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::Client;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};
use url::Url;

use crate::config::{DownloadSection, ToolsSection};
use crate::exec::{CommandExecutor, SystemCommandExecutor};

pub use error::{SourceError, SourceResult};
pub use types::{AcquiredMedia, SourceDescriptor};

/// Observer for byte-level transfer progress. `begin` is called once per
/// transfer with the advertised total (absent when the server does not send
/// a length), `advance` once per chunk on the same task.
pub trait TransferProgress: Send {
    fn begin(&mut self, name: &str, total: Option<u64>);
    fn advance(&mut self, bytes: u64);
    fn finish(&mut self);
}

#[derive(Debug, Default)]
pub struct NoProgress;

impl TransferProgress for NoProgress {
    fn begin(&mut self, _name: &str, _total: Option<u64>) {}
    fn advance(&mut self, _bytes: u64) {}
    fn finish(&mut self) {}
}

pub struct SourceAcquirer {
    http_client: Client,
    downloader: PathBuf,
    filename_template: String,
    restrict_filenames: bool,
    executor: Arc<dyn CommandExecutor>,
}

impl SourceAcquirer {
    pub fn new(tools: &ToolsSection, download: &DownloadSection) -> SourceResult<Self> {
        let http_client = Client::builder()
            .user_agent(download.user_agent.clone())
            .build()
            .map_err(|err| SourceError::Network(err.to_string()))?;
        Ok(Self {
            http_client,
            downloader: tools.downloader.clone(),
            filename_template: download.filename_template.clone(),
            restrict_filenames: download.restrict_filenames,
            executor: Arc::new(SystemCommandExecutor),
        })
    }

    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// Materializes every descriptor as a local file under `output_dir`.
    /// The result preserves the order of `descriptors`; the first failure
    /// aborts the whole acquisition and leaves partial files in place.
    pub async fn acquire(
        &self,
        descriptors: &[SourceDescriptor],
        output_dir: &Path,
        progress: &mut dyn TransferProgress,
    ) -> SourceResult<Vec<AcquiredMedia>> {
        let mut acquired = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let media = if descriptor.is_playlist() {
                let path = self.download_playlist(descriptor, output_dir).await?;
                info!(source = %descriptor, file = %path.display(), "playlist downloaded");
                AcquiredMedia::local(path)
            } else {
                let destination = output_dir.join(descriptor.file_name());
                self.download_file(descriptor, &destination, progress)
                    .await?;
                AcquiredMedia::local(destination)
            };
            acquired.push(media);
        }
        Ok(acquired)
    }

    /// Passthrough mode: resolves playlists to their final stream URL and
    /// leaves direct sources untouched, so the encoder can read the streams
    /// without a full download. Order is preserved.
    pub async fn resolve_final_urls(
        &self,
        descriptors: &[SourceDescriptor],
    ) -> SourceResult<Vec<AcquiredMedia>> {
        let mut resolved = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let locator = if descriptor.is_playlist() {
                let url = self.resolve_playlist_url(descriptor).await?;
                debug!(source = %descriptor, resolved = %url, "playlist resolved");
                url
            } else {
                descriptor.as_str().to_string()
            };
            resolved.push(AcquiredMedia::remote(locator));
        }
        Ok(resolved)
    }

    async fn download_playlist(
        &self,
        descriptor: &SourceDescriptor,
        output_dir: &Path,
    ) -> SourceResult<PathBuf> {
        let template = output_dir.join(&self.filename_template);
        let mut command = Command::new(&self.downloader);
        if self.restrict_filenames {
            command.arg("--restrict-filenames");
        }
        command
            .arg("--no-simulate")
            .arg("--print")
            .arg("after_move:filepath")
            .arg("-o")
            .arg(&template)
            .arg(descriptor.as_str());
        let output = self.run_downloader(command).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let path = stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or_else(|| {
                SourceError::DownloaderOutput("downloader printed no file path".to_string())
            })?;
        Ok(PathBuf::from(path))
    }

    async fn resolve_playlist_url(&self, descriptor: &SourceDescriptor) -> SourceResult<String> {
        let mut command = Command::new(&self.downloader);
        command.arg("--get-url").arg(descriptor.as_str());
        let output = self.run_downloader(command).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let url = stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or_else(|| {
                SourceError::DownloaderOutput("downloader printed no stream url".to_string())
            })?;
        Ok(url.to_string())
    }

    async fn run_downloader(&self, mut command: Command) -> SourceResult<std::process::Output> {
        command.kill_on_drop(true);
        let output = self
            .executor
            .run(&mut command)
            .await
            .map_err(|source| SourceError::Io {
                path: self.downloader.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(SourceError::Downloader {
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }

    async fn download_file(
        &self,
        descriptor: &SourceDescriptor,
        destination: &Path,
        progress: &mut dyn TransferProgress,
    ) -> SourceResult<()> {
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| SourceError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        match Url::parse(descriptor.as_str()) {
            Ok(parsed) if parsed.scheme() == "file" => {
                let source_path = parsed.to_file_path().map_err(|_| SourceError::InvalidUrl {
                    url: descriptor.as_str().to_string(),
                    reason: "not a valid file url".to_string(),
                })?;
                self.copy_local(&source_path, destination, progress).await
            }
            Ok(_) => self.fetch_http(descriptor, destination, progress).await,
            // A bare path never parses as a URL; copy it like a file url.
            Err(_) => {
                self.copy_local(Path::new(descriptor.as_str()), destination, progress)
                    .await
            }
        }
    }

    async fn fetch_http(
        &self,
        descriptor: &SourceDescriptor,
        destination: &Path,
        progress: &mut dyn TransferProgress,
    ) -> SourceResult<()> {
        let response = self
            .http_client
            .get(descriptor.as_str())
            .send()
            .await?
            .error_for_status()?;
        let total = response.content_length();
        progress.begin(&descriptor.file_name(), total);
        let mut stream = response.bytes_stream();
        let mut file = fs::File::create(destination)
            .await
            .map_err(|source| SourceError::Io {
                path: destination.to_path_buf(),
                source,
            })?;
        use futures::StreamExt;
        while let Some(chunk) = stream.next().await {
            let data = chunk?;
            file.write_all(&data)
                .await
                .map_err(|source| SourceError::Io {
                    path: destination.to_path_buf(),
                    source,
                })?;
            progress.advance(data.len() as u64);
        }
        progress.finish();
        Ok(())
    }

    async fn copy_local(
        &self,
        from: &Path,
        to: &Path,
        progress: &mut dyn TransferProgress,
    ) -> SourceResult<()> {
        let metadata = fs::metadata(from).await.map_err(|source| SourceError::Io {
            path: from.to_path_buf(),
            source,
        })?;
        progress.begin(
            &to.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default(),
            Some(metadata.len()),
        );
        fs::copy(from, to).await.map_err(|source| SourceError::Io {
            path: to.to_path_buf(),
            source,
        })?;
        progress.advance(metadata.len());
        progress.finish();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #[cfg(unix)]
    use std::sync::Mutex;

    use tempfile::TempDir;

    use super::*;
    use crate::config::VstitchConfig;

    #[cfg(unix)]
    use std::os::unix::process::ExitStatusExt;

    fn acquirer() -> SourceAcquirer {
        let config = VstitchConfig::default();
        SourceAcquirer::new(&config.tools, &config.download).unwrap()
    }

    #[test]
    fn playlist_extension_is_detected_case_insensitively() {
        assert!(SourceDescriptor::new("https://host/stream/index.m3u8").is_playlist());
        assert!(SourceDescriptor::new("https://host/stream/INDEX.M3U8").is_playlist());
        assert!(SourceDescriptor::new("https://host/a.m3u8?token=abc").is_playlist());
        assert!(!SourceDescriptor::new("https://host/clip.mp4").is_playlist());
        assert!(!SourceDescriptor::new("https://host/m3u8").is_playlist());
    }

    #[test]
    fn file_name_is_the_url_path_basename() {
        let descriptor = SourceDescriptor::new("https://host/media/session/video.mp4?sig=1");
        assert_eq!(descriptor.file_name(), "video.mp4");
        let plain = SourceDescriptor::new("/data/recordings/video.ts");
        assert_eq!(plain.file_name(), "video.ts");
    }

    struct CountingProgress {
        begun: Vec<(String, Option<u64>)>,
        bytes: u64,
        finished: usize,
    }

    impl CountingProgress {
        fn new() -> Self {
            Self {
                begun: Vec::new(),
                bytes: 0,
                finished: 0,
            }
        }
    }

    impl TransferProgress for CountingProgress {
        fn begin(&mut self, name: &str, total: Option<u64>) {
            self.begun.push((name.to_string(), total));
        }

        fn advance(&mut self, bytes: u64) {
            self.bytes += bytes;
        }

        fn finish(&mut self) {
            self.finished += 1;
        }
    }

    #[tokio::test]
    async fn acquire_preserves_descriptor_order() {
        let base = TempDir::new().unwrap();
        let fixtures = base.path().join("fixtures");
        std::fs::create_dir_all(&fixtures).unwrap();
        std::fs::write(fixtures.join("first.mp4"), b"FIRST").unwrap();
        std::fs::write(fixtures.join("second.mp4"), b"SECOND").unwrap();
        let descriptors = vec![
            SourceDescriptor::new(format!(
                "file://{}",
                fixtures.join("first.mp4").display()
            )),
            SourceDescriptor::new(format!(
                "file://{}",
                fixtures.join("second.mp4").display()
            )),
        ];
        let output_dir = base.path().join("out");

        let mut progress = CountingProgress::new();
        let acquired = acquirer()
            .acquire(&descriptors, &output_dir, &mut progress)
            .await
            .unwrap();

        assert_eq!(acquired.len(), 2);
        assert_eq!(
            acquired[0].downloaded.as_deref(),
            Some(output_dir.join("first.mp4").as_path())
        );
        assert_eq!(
            acquired[1].downloaded.as_deref(),
            Some(output_dir.join("second.mp4").as_path())
        );
        assert_eq!(
            std::fs::read(output_dir.join("second.mp4")).unwrap(),
            b"SECOND"
        );
        assert_eq!(
            progress.begun,
            vec![
                ("first.mp4".to_string(), Some(5)),
                ("second.mp4".to_string(), Some(6)),
            ]
        );
        assert_eq!(progress.bytes, 11);
        assert_eq!(progress.finished, 2);
    }

    #[tokio::test]
    async fn missing_local_source_aborts_acquisition() {
        let base = TempDir::new().unwrap();
        let descriptors = vec![SourceDescriptor::new(format!(
            "file://{}",
            base.path().join("missing.mp4").display()
        ))];
        let err = acquirer()
            .acquire(&descriptors, base.path(), &mut NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Io { .. }));
    }

    #[cfg(unix)]
    #[derive(Default)]
    struct ScriptedExecutor {
        calls: Mutex<Vec<Vec<String>>>,
        stdout: Vec<u8>,
        exit_code: i32,
    }

    #[cfg(unix)]
    #[async_trait::async_trait]
    impl CommandExecutor for ScriptedExecutor {
        async fn run(&self, command: &mut Command) -> std::io::Result<std::process::Output> {
            let args = command
                .as_std()
                .get_args()
                .map(|arg| arg.to_string_lossy().to_string())
                .collect();
            self.calls.lock().unwrap().push(args);
            Ok(std::process::Output {
                status: std::process::ExitStatus::from_raw(self.exit_code),
                stdout: self.stdout.clone(),
                stderr: Vec::new(),
            })
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn playlist_download_consumes_printed_filepath() {
        let base = TempDir::new().unwrap();
        let executor = Arc::new(ScriptedExecutor {
            stdout: b"/downloads/Lecture_01-abc123.mp4\n".to_vec(),
            ..Default::default()
        });
        let descriptors = vec![SourceDescriptor::new("https://host/session/index.m3u8")];

        let acquired = acquirer()
            .with_executor(executor.clone())
            .acquire(&descriptors, base.path(), &mut NoProgress)
            .await
            .unwrap();

        assert_eq!(
            acquired[0].downloaded.as_deref(),
            Some(Path::new("/downloads/Lecture_01-abc123.mp4"))
        );
        let calls = executor.calls.lock().unwrap();
        let args = &calls[0];
        assert!(args.contains(&"--restrict-filenames".to_string()));
        assert!(args.contains(&"--no-simulate".to_string()));
        let template = base
            .path()
            .join("%(title)s-%(id)s.%(ext)s")
            .to_string_lossy()
            .to_string();
        assert!(args.contains(&template));
        assert_eq!(args.last(), Some(&"https://host/session/index.m3u8".to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn passthrough_resolves_playlists_and_keeps_direct_urls() {
        let executor = Arc::new(ScriptedExecutor {
            stdout: b"https://cdn.host/stream/720p.m3u8\n".to_vec(),
            ..Default::default()
        });
        let descriptors = vec![
            SourceDescriptor::new("https://host/session/index.m3u8"),
            SourceDescriptor::new("https://host/camera.mp4"),
        ];

        let resolved = acquirer()
            .with_executor(executor.clone())
            .resolve_final_urls(&descriptors)
            .await
            .unwrap();

        assert_eq!(resolved[0].locator, "https://cdn.host/stream/720p.m3u8");
        assert_eq!(resolved[0].downloaded, None);
        assert_eq!(resolved[1].locator, "https://host/camera.mp4");
        let calls = executor.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].contains(&"--get-url".to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn downloader_failure_carries_status_and_stderr() {
        let executor = Arc::new(ScriptedExecutor {
            exit_code: 256, // raw wait status for exit code 1
            ..Default::default()
        });
        let descriptors = vec![SourceDescriptor::new("https://host/session/index.m3u8")];
        let err = acquirer()
            .with_executor(executor)
            .resolve_final_urls(&descriptors)
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Downloader { .. }));
    }
}
