//! Completion queue and merge consumer.
//!
//! Fetchers push `MergeEvent`s onto an unbounded mpsc channel; one merge
//! thread drains it strictly one event at a time. Being the only writer of
//! destination files and the only mutator of task progress, it needs no
//! per-range locking, and it is also the only thread that calls the listener.

mod consumer;

pub(crate) use consumer::MergeConsumer;

use std::path::PathBuf;

use crate::retry::FetchError;
use crate::task::{Chunk, TaskId};

/// Message on the completion queue.
#[derive(Debug)]
pub(crate) enum MergeEvent {
    /// Chunk bytes are in its scratch file, ready to merge.
    Fetched(Chunk),
    /// Chunk failed permanently or was aborted; its scratch file is already gone.
    FetchFailed { chunk: Chunk, error: FetchError },
    /// Task was cancelled or shut down; drop its partial destination file.
    Cancelled { task_id: TaskId, scratch_dir: PathBuf },
    /// Stop the merge thread.
    Shutdown,
}

impl MergeEvent {
    pub(crate) fn chunk(&self) -> Option<&Chunk> {
        match self {
            MergeEvent::Fetched(chunk) | MergeEvent::FetchFailed { chunk, .. } => Some(chunk),
            MergeEvent::Cancelled { .. } | MergeEvent::Shutdown => None,
        }
    }
}
