//! One byte-range unit of a task.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use super::{FileTask, TaskId};
use crate::planner::ByteRange;

/// A chunk descriptor. Value-like: handed by the dispatcher to a fetcher and
/// by the fetcher to the merge consumer, never mutated in between.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub task_id: TaskId,
    /// Parent task URL (registry key).
    pub url: String,
    /// Sequence index within the task.
    pub index: usize,
    pub range: ByteRange,
    pub scratch_dir: PathBuf,
    pub scratch_name: String,
    /// Abort token of the parent task.
    pub abort: Arc<AtomicBool>,
}

impl Chunk {
    pub(crate) fn for_task(task: &FileTask, index: usize, range: ByteRange) -> Self {
        Self {
            task_id: task.id,
            url: task.url.clone(),
            index,
            range,
            scratch_dir: task.scratch_dir.clone(),
            scratch_name: task.scratch_name(index),
            abort: task.abort_token(),
        }
    }

    pub(crate) fn len(&self) -> u64 {
        self.range.len()
    }

    pub fn scratch_path(&self) -> PathBuf {
        self.scratch_dir.join(&self.scratch_name)
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Delete the scratch file if present.
    pub(crate) fn remove_scratch(&self) {
        let path = self.scratch_path();
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), "could not remove scratch file: {}", e);
            }
        }
    }
}
