use std::io;
use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

use crate::downloader::planer::Chunk;

pub type Result<T> = std::result::Result<T, DownloadError>;

/// Failure of a single attempt at fetching and writing one chunk.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("timed out waiting for response headers")]
    Timeout,
    #[error("unexpected status {0}")]
    Status(StatusCode),
    #[error("server ignored the Range header and returned the full body")]
    RangeIgnored,
    #[error("empty response body")]
    EmptyBody,
    #[error("body length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: u64, actual: u64 },
    #[error("write failed: {0}")]
    Write(#[source] io::Error),
}

impl FetchError {
    /// Whether re-running the same chunk could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::RangeIgnored)
    }
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("probe of {url} failed: {reason}")]
    Probe { url: String, reason: String },
    #[error("chunk {chunk} failed after {attempts} attempt(s): {source}")]
    ChunkFetch {
        chunk: Chunk,
        attempts: u32,
        #[source]
        source: FetchError,
    },
    #[error("size mismatch for {}: expected {expected} bytes, found {actual}", .path.display())]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },
    #[error("single-stream download failed: {0}")]
    Stream(String),
    #[error("file I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("chunk task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("chunk scheduler closed: {0}")]
    Scheduler(#[from] tokio::sync::AcquireError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to parse configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl DownloadError {
    /// True when a chunk request came back as a full, unranged body.
    pub fn is_range_ignored(&self) -> bool {
        matches!(
            self,
            DownloadError::ChunkFetch {
                source: FetchError::RangeIgnored,
                ..
            }
        )
    }
}
