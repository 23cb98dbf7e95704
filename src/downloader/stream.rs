use futures::TryStreamExt;
use reqwest::Client;
use std::io;
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;
use tracing::debug;

use crate::error::{DownloadError, Result};

/// Result of an unranged GET copied to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Streamed {
    pub written: u64,
    /// `Content-Length` of the GET response, when the server sent one.
    pub content_length: Option<u64>,
}

/// Copy the whole resource to `path` with one plain GET, without holding the
/// payload in memory.
pub async fn stream_to_file(
    client: &Client,
    url: &str,
    path: &Path,
    send_timeout: Duration,
) -> Result<Streamed> {
    let response = tokio::time::timeout(send_timeout, client.get(url).send())
        .await
        .map_err(|_| DownloadError::Stream(format!("GET {} timed out", url)))?
        .map_err(|err| DownloadError::Stream(err.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::Stream(format!(
            "GET {} returned status {}",
            url, status
        )));
    }
    let content_length = response.content_length();

    let mut file = File::create(path).await?;
    let mut reader = StreamReader::new(response.bytes_stream().map_err(io::Error::other));
    let written = tokio::io::copy(&mut reader, &mut file)
        .await
        .map_err(|err| DownloadError::Stream(format!("copying body failed: {}", err)))?;
    file.flush().await?;
    file.sync_all().await?;

    debug!(url, written, ?content_length, "streamed body to disk");
    Ok(Streamed {
        written,
        content_length,
    })
}
