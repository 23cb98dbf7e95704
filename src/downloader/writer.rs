use std::io::{self, SeekFrom};
use std::path::Path;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::downloader::planer::Chunk;

/// Shared handle to a pre-sized output file. Every seek-then-write pair runs
/// under one lock so concurrent chunk writers never move each other's cursor.
#[derive(Debug)]
pub struct PositionalWriter {
    file: Mutex<File>,
    len: u64,
}

impl PositionalWriter {
    pub async fn create(path: &Path, len: u64) -> io::Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .await?;
        file.set_len(len).await?;

        Ok(PositionalWriter {
            file: Mutex::new(file),
            len,
        })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    /// Write `data` over exactly the bytes covered by `chunk`.
    pub async fn write_at(&self, chunk: Chunk, data: &[u8]) -> io::Result<()> {
        if data.len() as u64 != chunk.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "buffer of {} bytes does not fill chunk {}",
                    data.len(),
                    chunk
                ),
            ));
        }
        if chunk.end >= self.len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("chunk {} lies beyond file length {}", chunk, self.len),
            ));
        }

        let mut file = self.file.lock().await;
        file.seek(SeekFrom::Start(chunk.start)).await?;
        file.write_all(data).await?;
        // tokio's File refuses to seek while a write is still in flight
        file.flush().await?;
        Ok(())
    }

    /// Sync and close the file, returning its length on disk.
    pub async fn finish(self) -> io::Result<u64> {
        let mut file = self.file.into_inner();
        file.flush().await?;
        file.sync_all().await?;
        Ok(file.metadata().await?.len())
    }
}
