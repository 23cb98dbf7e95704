use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use rangefetch::{DownloadConfig, DownloadError, Downloader, Schedule};

#[derive(Parser)]
#[command(name = "rangefetch")]
#[command(about = "Download a file over HTTP using parallel range requests")]
#[command(version = "0.1")]
struct Cli {
    #[arg(help = "URL to download")]
    url: String,
    #[arg(help = "Destination path")]
    output: PathBuf,
    #[arg(long, help = "JSON configuration file")]
    config: Option<PathBuf>,
    #[arg(long, help = "chunk size in bytes")]
    chunk_size: Option<u64>,
    #[arg(short, long, help = "maximum concurrent chunk requests")]
    concurrency: Option<usize>,
    #[arg(long, help = "attempts per chunk")]
    max_retries: Option<u32>,
    #[arg(long, help = "base retry delay in milliseconds")]
    retry_delay_ms: Option<u64>,
    #[arg(long)]
    connect_timeout_ms: Option<u64>,
    #[arg(long)]
    read_timeout_ms: Option<u64>,
    #[arg(long)]
    write_timeout_ms: Option<u64>,
    #[arg(long, help = "start the next chunk as soon as any slot frees up")]
    pooled: bool,
}

impl Cli {
    fn to_config(&self) -> Result<DownloadConfig, DownloadError> {
        let mut config = match &self.config {
            Some(path) => DownloadConfig::load(path)?,
            None => DownloadConfig::default(),
        };

        if let Some(chunk_size) = self.chunk_size {
            config.chunk_size = chunk_size;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(max_retries) = self.max_retries {
            config.max_retries = max_retries;
        }
        if let Some(ms) = self.retry_delay_ms {
            config.retry_base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = self.connect_timeout_ms {
            config.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.read_timeout_ms {
            config.read_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.write_timeout_ms {
            config.write_timeout = Duration::from_millis(ms);
        }
        if self.pooled {
            config.schedule = Schedule::Pooled;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let downloader = match cli.to_config().and_then(Downloader::new) {
        Ok(downloader) => downloader,
        Err(err) => {
            eprintln!("{}", err);
            return ExitCode::FAILURE;
        }
    };

    let outcome = downloader.download(&cli.url, &cli.output).await;
    if outcome.success() {
        println!(
            "Downloaded {} bytes to {}",
            outcome.bytes_written(),
            cli.output.display()
        );
        ExitCode::SUCCESS
    } else {
        println!(
            "Download failed: {}",
            outcome.message().unwrap_or("unknown error")
        );
        ExitCode::FAILURE
    }
}
