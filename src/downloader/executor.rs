use futures::future::join_all;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::downloader::fetcher::{ChunkFetcher, Sleeper};
use crate::downloader::planer::Chunk;
use crate::error::Result;
use crate::utils::limited_spawner::LimitedSpawner;

type ChunkTask = JoinHandle<Result<()>>;

fn spawn_chunk<S: Sleeper>(fetcher: &Arc<ChunkFetcher<S>>, chunk: Chunk) -> ChunkTask {
    let fetcher = Arc::clone(fetcher);
    tokio::spawn(async move { fetcher.fetch_and_write(chunk).await })
}

/// Run the chunks in fixed batches of `concurrency`. A batch is spawned all at
/// once and fully awaited before the next one starts; the first failure in plan
/// order aborts after that barrier.
pub async fn execute_batched<S: Sleeper>(
    fetcher: Arc<ChunkFetcher<S>>,
    chunks: &[Chunk],
    concurrency: usize,
) -> Result<()> {
    for (index, batch) in chunks.chunks(concurrency.max(1)).enumerate() {
        debug!(batch = index, size = batch.len(), "starting batch");
        let handles = batch
            .iter()
            .map(|chunk| spawn_chunk(&fetcher, *chunk))
            .collect::<Vec<_>>();

        for result in join_all(handles).await {
            result??;
        }
    }
    Ok(())
}

/// Run the chunks through a pool of `concurrency` slots, starting the next
/// chunk as soon as any slot frees up. On the first failure the remaining
/// tasks are aborted and drained before the error is returned.
pub async fn execute_pooled<S: Sleeper>(
    fetcher: Arc<ChunkFetcher<S>>,
    chunks: &[Chunk],
    concurrency: usize,
) -> Result<()> {
    let spawner = LimitedSpawner::new(concurrency);
    let mut handles: Vec<ChunkTask> = Vec::new();

    for chunk in chunks.iter().copied() {
        let fetcher = Arc::clone(&fetcher);
        let spawned = spawner
            .spawn(async move { fetcher.fetch_and_write(chunk).await })
            .await;
        match spawned {
            Ok(handle) => handles.push(handle),
            Err(err) => {
                abort_all(handles).await;
                return Err(err.into());
            }
        }

        if let Err(err) = reap_finished(&mut handles).await {
            abort_all(handles).await;
            return Err(err);
        }
    }

    while !handles.is_empty() {
        let handle = handles.remove(0);
        let outcome = match handle.await {
            Ok(result) => result,
            Err(err) => Err(err.into()),
        };
        if let Err(err) = outcome {
            abort_all(handles).await;
            return Err(err);
        }
    }
    Ok(())
}

async fn reap_finished(handles: &mut Vec<ChunkTask>) -> Result<()> {
    let mut index = 0;
    while index < handles.len() {
        if handles[index].is_finished() {
            handles.remove(index).await??;
        } else {
            index += 1;
        }
    }
    Ok(())
}

async fn abort_all(handles: Vec<ChunkTask>) {
    for handle in handles.iter() {
        handle.abort();
    }
    // Wait so no aborted task still holds the file when the caller moves on.
    let _ = join_all(handles).await;
}
