//! Chunk fetcher: downloads one byte range into its own scratch file.
//!
//! Runs on the executor, concurrently with any number of other fetchers.
//! It only touches its scratch file and the completion queue; the
//! destination file and task progress belong to the merge consumer.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::sync::mpsc;
use std::sync::Arc;

use crate::merge::MergeEvent;
use crate::retry::{run_with_retry, FetchError, RetryPolicy};
use crate::task::Chunk;
use crate::transport::RangeTransport;

const SCRATCH_BUF_SIZE: usize = 64 * 1024;

/// Everything a fetch job needs, shared by all jobs of a `Downloader`.
pub(crate) struct FetchContext {
    pub(crate) transport: Arc<dyn RangeTransport>,
    pub(crate) retry: RetryPolicy,
    pub(crate) queue: mpsc::Sender<MergeEvent>,
}

/// Fetch `chunk` and hand the outcome to the merge consumer.
pub(crate) fn fetch_chunk(ctx: &FetchContext, chunk: Chunk) {
    if chunk.is_aborted() {
        tracing::debug!(url = %chunk.url, index = chunk.index, "task aborted before fetch; skipping chunk");
        return;
    }

    let result = run_with_retry(&ctx.retry, |attempt| {
        if attempt > 1 {
            tracing::debug!(url = %chunk.url, index = chunk.index, attempt, "refetching chunk");
        }
        download_to_scratch(ctx.transport.as_ref(), &chunk)
    });

    let event = match result {
        Ok(bytes) => {
            tracing::debug!(url = %chunk.url, index = chunk.index, bytes, "chunk fetched");
            MergeEvent::Fetched(chunk)
        }
        Err(FetchError::Aborted) => {
            tracing::debug!(url = %chunk.url, index = chunk.index, "chunk fetch aborted");
            chunk.remove_scratch();
            MergeEvent::FetchFailed {
                chunk,
                error: FetchError::Aborted,
            }
        }
        Err(error) => {
            tracing::warn!(url = %chunk.url, index = chunk.index, range = %chunk.range, "chunk fetch failed: {}", error);
            chunk.remove_scratch();
            MergeEvent::FetchFailed { chunk, error }
        }
    };

    if let Err(mpsc::SendError(event)) = ctx.queue.send(event) {
        if let Some(chunk) = event.chunk() {
            tracing::warn!(url = %chunk.url, index = chunk.index, "merge consumer stopped; dropping chunk");
            chunk.remove_scratch();
        }
    }
}

/// One attempt: (re)create the scratch file and stream the range into it.
/// The file is flushed and closed before this returns.
fn download_to_scratch(transport: &dyn RangeTransport, chunk: &Chunk) -> Result<u64, FetchError> {
    std::fs::create_dir_all(&chunk.scratch_dir).map_err(FetchError::Scratch)?;
    let file = match File::create(chunk.scratch_path()) {
        // The merge thread removes an empty scratch directory when the last
        // task using it ends.
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            std::fs::create_dir_all(&chunk.scratch_dir).map_err(FetchError::Scratch)?;
            File::create(chunk.scratch_path()).map_err(FetchError::Scratch)?
        }
        other => other.map_err(FetchError::Scratch)?,
    };
    let mut writer = BufWriter::with_capacity(SCRATCH_BUF_SIZE, file);

    let received = transport.fetch_range(&chunk.url, chunk.range, &mut writer, &chunk.abort)?;

    writer.flush().map_err(FetchError::Scratch)?;
    let file = writer
        .into_inner()
        .map_err(|e| FetchError::Scratch(e.into_error()))?;
    drop(file);
    Ok(received)
}
