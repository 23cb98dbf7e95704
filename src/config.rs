use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::time::Duration;

use crate::error::{DownloadError, Result};

/// How chunk tasks are scheduled against the concurrency bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Schedule {
    /// Fixed-size batches joined at a barrier. Peak concurrency never exceeds
    /// the bound, but a slow chunk holds up the whole batch.
    #[default]
    Batched,
    /// A semaphore-bounded pool; a freed slot starts the next chunk at once.
    Pooled,
}

/// Tunables for one [`Downloader`](crate::Downloader).
///
/// Deserializable from JSON; every field is optional and durations are given
/// in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Bytes per ranged request.
    pub chunk_size: u64,
    /// Maximum chunk requests in flight.
    pub concurrency: usize,
    /// Total attempts per chunk, the first one included.
    pub max_retries: u32,
    /// Delay unit for linear backoff: attempt `n` failing waits `n * retry_base_delay`.
    #[serde(deserialize_with = "millis")]
    pub retry_base_delay: Duration,
    #[serde(deserialize_with = "millis")]
    pub connect_timeout: Duration,
    /// Ceiling on each read of a response body.
    #[serde(deserialize_with = "millis")]
    pub read_timeout: Duration,
    /// Ceiling on sending a request until the response head arrives.
    #[serde(deserialize_with = "millis")]
    pub write_timeout: Duration,
    pub schedule: Schedule,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024 * 1024,
            concurrency: 4,
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            schedule: Schedule::Batched,
        }
    }
}

impl DownloadConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: DownloadConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(DownloadError::InvalidConfig(
                "chunk_size must be positive".into(),
            ));
        }
        if self.concurrency == 0 {
            return Err(DownloadError::InvalidConfig(
                "concurrency must be positive".into(),
            ));
        }
        if self.max_retries == 0 {
            return Err(DownloadError::InvalidConfig(
                "max_retries must allow at least one attempt".into(),
            ));
        }
        Ok(())
    }
}

fn millis<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}
