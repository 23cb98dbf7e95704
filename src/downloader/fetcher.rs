use bytes::Bytes;
use reqwest::header::RANGE;
use reqwest::{Client, StatusCode};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::downloader::planer::Chunk;
use crate::downloader::writer::PositionalWriter;
use crate::error::{DownloadError, FetchError};

/// Suspends a task between retry attempts.
pub trait Sleeper: Send + Sync + 'static {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}

/// Linear backoff: the wait after failed attempt `n` is `base * n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
}

impl Backoff {
    pub fn new(base: Duration) -> Self {
        Backoff { base }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        self.base.saturating_mul(attempt)
    }
}

/// Fetches chunks of one URL and writes them into the shared output file.
pub struct ChunkFetcher<S> {
    client: Client,
    url: String,
    writer: Arc<PositionalWriter>,
    backoff: Backoff,
    max_attempts: u32,
    send_timeout: Duration,
    sleeper: Arc<S>,
}

impl<S: Sleeper> ChunkFetcher<S> {
    pub fn new(
        client: Client,
        url: String,
        writer: Arc<PositionalWriter>,
        backoff: Backoff,
        max_attempts: u32,
        send_timeout: Duration,
        sleeper: Arc<S>,
    ) -> Self {
        ChunkFetcher {
            client,
            url,
            writer,
            backoff,
            max_attempts: max_attempts.max(1),
            send_timeout,
            sleeper,
        }
    }

    /// One ranged GET. Only a 206 whose body exactly fills the chunk is accepted,
    /// or a 200 whose `Content-Length` shows the chunk already spans the whole
    /// resource.
    pub async fn fetch_range(&self, chunk: Chunk) -> Result<Bytes, FetchError> {
        let request = self
            .client
            .get(&self.url)
            .header(RANGE, chunk.range_header())
            .send();
        let response = tokio::time::timeout(self.send_timeout, request)
            .await
            .map_err(|_| FetchError::Timeout)??;

        let status = response.status();
        if status != StatusCode::PARTIAL_CONTENT && status != StatusCode::OK {
            return Err(FetchError::Status(status));
        }

        // Decide on a 200 from its headers; the full body is never read.
        if status == StatusCode::OK
            && (chunk.start != 0 || response.content_length() != Some(chunk.len()))
        {
            return Err(FetchError::RangeIgnored);
        }

        let body = response.bytes().await?;
        if body.is_empty() {
            return Err(FetchError::EmptyBody);
        }
        let actual = body.len() as u64;
        if actual != chunk.len() {
            return Err(FetchError::LengthMismatch {
                expected: chunk.len(),
                actual,
            });
        }
        Ok(body)
    }

    async fn attempt(&self, chunk: Chunk) -> Result<(), FetchError> {
        let body = self.fetch_range(chunk).await?;
        self.writer
            .write_at(chunk, &body)
            .await
            .map_err(FetchError::Write)
    }

    /// Fetch and write `chunk`, retrying the pair until it succeeds or the
    /// attempt budget runs out.
    pub async fn fetch_and_write(&self, chunk: Chunk) -> Result<(), DownloadError> {
        let mut attempt = 1;
        loop {
            match self.attempt(chunk).await {
                Ok(()) => {
                    debug!(%chunk, attempt, "chunk written");
                    return Ok(());
                }
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.backoff.delay(attempt);
                    warn!(%chunk, attempt, ?delay, error = %err, "chunk attempt failed, retrying");
                    self.sleeper.sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    warn!(%chunk, attempt, error = %err, "chunk failed");
                    return Err(DownloadError::ChunkFetch {
                        chunk,
                        attempts: attempt,
                        source: err,
                    });
                }
            }
        }
    }
}
