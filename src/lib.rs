//! Single-file HTTP downloader.
//!
//! A HEAD probe decides the strategy: when the server advertises
//! `Accept-Ranges: bytes` and a positive `Content-Length`, the file is split
//! into chunks fetched concurrently with per-chunk retry and written at their
//! offsets into one pre-sized file. Otherwise the body is streamed with a
//! single GET.
//!
//! ```no_run
//! # async fn run() {
//! use rangefetch::{DownloadConfig, Downloader};
//!
//! let downloader = Downloader::new(DownloadConfig::default()).unwrap();
//! let outcome = downloader
//!     .download("http://example.com/big.iso", "downloads/big.iso")
//!     .await;
//! if !outcome.success() {
//!     eprintln!("{}", outcome.message().unwrap_or("download failed"));
//! }
//! # }
//! ```

pub mod config;
pub mod downloader;
pub mod error;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use config::{DownloadConfig, Schedule};
pub use downloader::planer::{Chunk, plan};
pub use downloader::probe::ProbeResult;
pub use downloader::{DownloadOutcome, Downloader, Strategy, download};
pub use error::{DownloadError, FetchError, Result};
