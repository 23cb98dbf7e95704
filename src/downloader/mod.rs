pub mod executor;
pub mod fetcher;
pub mod planer;
pub mod probe;
pub mod stream;
pub mod writer;

use reqwest::Client;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::config::{DownloadConfig, Schedule};
use crate::error::{DownloadError, Result};
use fetcher::{Backoff, ChunkFetcher, Sleeper, TokioSleeper};
use probe::ProbeResult;
use writer::PositionalWriter;

/// Terminal result of one download. Read-only once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    success: bool,
    bytes_written: u64,
    message: Option<String>,
}

impl DownloadOutcome {
    fn succeeded(bytes_written: u64) -> Self {
        DownloadOutcome {
            success: true,
            bytes_written,
            message: None,
        }
    }

    fn failed(err: &DownloadError) -> Self {
        let bytes_written = match err {
            DownloadError::SizeMismatch { actual, .. } => *actual,
            _ => 0,
        };
        DownloadOutcome {
            success: false,
            bytes_written,
            message: Some(err.to_string()),
        }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

/// How the body will be transferred, decided from the probe alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    ChunkedParallel { total_length: u64 },
    SingleStream { expected_length: Option<u64> },
}

impl Strategy {
    pub fn choose(probe: &ProbeResult) -> Self {
        match probe.total_length {
            Some(total_length) if probe.supports_range && total_length > 0 => {
                Strategy::ChunkedParallel { total_length }
            }
            expected_length => Strategy::SingleStream { expected_length },
        }
    }
}

pub struct Downloader<S = TokioSleeper> {
    config: DownloadConfig,
    sleeper: Arc<S>,
}

impl Downloader<TokioSleeper> {
    pub fn new(config: DownloadConfig) -> Result<Self> {
        Self::with_sleeper(config, TokioSleeper)
    }
}

impl<S: Sleeper> Downloader<S> {
    pub fn with_sleeper(config: DownloadConfig, sleeper: S) -> Result<Self> {
        config.validate()?;
        Ok(Downloader {
            config,
            sleeper: Arc::new(sleeper),
        })
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Fetch `url` into `destination`. Failures are reported in the outcome,
    /// never raised.
    pub async fn download(&self, url: &str, destination: impl AsRef<Path>) -> DownloadOutcome {
        let destination = destination.as_ref();
        match self.try_download(url, destination).await {
            Ok(bytes_written) => {
                info!(url, path = %destination.display(), bytes_written, "download succeeded");
                DownloadOutcome::succeeded(bytes_written)
            }
            Err(err) => {
                warn!(url, path = %destination.display(), error = %err, "download failed");
                DownloadOutcome::failed(&err)
            }
        }
    }

    #[instrument(skip(self, destination), fields(path = %destination.display()))]
    async fn try_download(&self, url: &str, destination: &Path) -> Result<u64> {
        // Scoped to this call; dropped on every return path.
        let client = self.build_client()?;

        let probe = probe::probe(&client, url).await?;

        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        match Strategy::choose(&probe) {
            Strategy::ChunkedParallel { total_length } => {
                info!(total_length, "server supports ranges, downloading in chunks");
                match self
                    .download_chunked(&client, url, destination, total_length)
                    .await
                {
                    Err(err) if err.is_range_ignored() => {
                        warn!("server ignored Range, restarting as a single stream");
                        self.download_single(&client, url, destination, Some(total_length))
                            .await
                    }
                    result => result,
                }
            }
            Strategy::SingleStream { expected_length } => {
                info!(?expected_length, "downloading as a single stream");
                self.download_single(&client, url, destination, expected_length)
                    .await
            }
        }
    }

    fn build_client(&self) -> Result<Client> {
        Client::builder()
            .connect_timeout(self.config.connect_timeout)
            .read_timeout(self.config.read_timeout)
            .build()
            .map_err(DownloadError::Client)
    }

    async fn download_chunked(
        &self,
        client: &Client,
        url: &str,
        destination: &Path,
        total_length: u64,
    ) -> Result<u64> {
        let writer = Arc::new(PositionalWriter::create(destination, total_length).await?);
        let chunks = planer::plan(total_length, self.config.chunk_size);
        let fetcher = Arc::new(ChunkFetcher::new(
            client.clone(),
            url.to_string(),
            Arc::clone(&writer),
            Backoff::new(self.config.retry_base_delay),
            self.config.max_retries,
            self.config.write_timeout,
            Arc::clone(&self.sleeper),
        ));
        info!(
            chunks = chunks.len(),
            concurrency = self.config.concurrency,
            schedule = ?self.config.schedule,
            "planned chunks"
        );

        let executed = match self.config.schedule {
            Schedule::Batched => {
                executor::execute_batched(fetcher, &chunks, self.config.concurrency).await
            }
            Schedule::Pooled => {
                executor::execute_pooled(fetcher, &chunks, self.config.concurrency).await
            }
        };
        executed?;

        // Every chunk task has been joined, so this is the last reference.
        let writer = Arc::try_unwrap(writer).map_err(|_| {
            DownloadError::Io(std::io::Error::other("output file still shared after chunks finished"))
        })?;
        let actual = writer.finish().await?;
        check_size(destination, total_length, actual)?;
        Ok(actual)
    }

    async fn download_single(
        &self,
        client: &Client,
        url: &str,
        destination: &Path,
        expected_length: Option<u64>,
    ) -> Result<u64> {
        let streamed =
            stream::stream_to_file(client, url, destination, self.config.write_timeout).await?;
        let actual = tokio::fs::metadata(destination).await?.len();
        let expected = expected_length
            .or(streamed.content_length)
            .unwrap_or(streamed.written);
        check_size(destination, expected, actual)?;
        Ok(actual)
    }
}

fn check_size(path: &Path, expected: u64, actual: u64) -> Result<()> {
    if expected != actual {
        return Err(DownloadError::SizeMismatch {
            path: path.to_path_buf(),
            expected,
            actual,
        });
    }
    Ok(())
}

/// Download with the default configuration.
pub async fn download(url: &str, destination: impl AsRef<Path>) -> DownloadOutcome {
    match Downloader::new(DownloadConfig::default()) {
        Ok(downloader) => downloader.download(url, destination).await,
        Err(err) => DownloadOutcome::failed(&err),
    }
}
