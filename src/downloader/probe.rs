use reqwest::Client;
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, HeaderMap};
use tracing::debug;

use crate::error::{DownloadError, Result};

/// What a HEAD request revealed about the remote resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    pub total_length: Option<u64>,
    pub supports_range: bool,
}

impl ProbeResult {
    fn from_headers(headers: &HeaderMap) -> Self {
        // Read the header text; the body size hint of a HEAD response is always 0.
        let total_length = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let supports_range = headers
            .get(ACCEPT_RANGES)
            .is_some_and(|v| v.as_bytes().trim_ascii().eq_ignore_ascii_case(b"bytes"));

        ProbeResult {
            total_length,
            supports_range,
        }
    }
}

pub async fn probe(client: &Client, url: &str) -> Result<ProbeResult> {
    let response = client
        .head(url)
        .send()
        .await
        .map_err(|err| DownloadError::Probe {
            url: url.to_string(),
            reason: err.to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::Probe {
            url: url.to_string(),
            reason: format!("status {}", status),
        });
    }

    let result = ProbeResult::from_headers(response.headers());
    debug!(
        url,
        total_length = ?result.total_length,
        supports_range = result.supports_range,
        "probed resource"
    );
    Ok(result)
}
