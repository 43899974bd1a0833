//! Concurrent URL → task map with admission control.
//!
//! Every operation takes the write lock for its whole read-modify-write, so
//! duplicate checks and progress updates never expose a window where a URL
//! looks unregistered. At most one active task writes to a given destination.

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use super::{FileTask, TaskId, TaskSnapshot};

/// Progress of a task right after the merge consumer recorded a chunk outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeProgress {
    pub accumulated: u64,
    pub total_length: u64,
    pub failed_chunks: usize,
    /// Every chunk has either merged or failed.
    pub settled: bool,
}

impl MergeProgress {
    pub fn is_complete(&self) -> bool {
        self.accumulated == self.total_length
    }
}

/// Why `try_insert` refused a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    /// The URL is already in flight as this task.
    Url(TaskId),
    /// Another URL is downloading to the same destination path.
    Destination { url: String, id: TaskId },
}

#[derive(Default)]
pub struct TaskRegistry {
    tasks: RwLock<HashMap<String, FileTask>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `task` unless its URL is already in flight or another task
    /// owns its destination path.
    pub fn try_insert(&self, task: FileTask) -> Result<TaskId, Conflict> {
        let mut tasks = self.tasks.write().unwrap();
        if let Some(existing) = tasks.get(&task.url) {
            return Err(Conflict::Url(existing.id));
        }
        let dest = task.dest_path();
        if let Some(owner) = tasks.values().find(|t| t.dest_path() == dest) {
            return Err(Conflict::Destination {
                url: owner.url.clone(),
                id: owner.id,
            });
        }
        let id = task.id;
        tasks.insert(task.url.clone(), task);
        Ok(id)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.tasks.read().unwrap().contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.tasks.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clone of the task registered under `url`, if it is still the task `id`.
    pub fn get_matching(&self, url: &str, id: TaskId) -> Option<FileTask> {
        self.tasks
            .read()
            .unwrap()
            .get(url)
            .filter(|t| t.id == id)
            .cloned()
    }

    pub fn snapshot(&self, url: &str) -> Option<TaskSnapshot> {
        self.tasks.read().unwrap().get(url).map(FileTask::snapshot)
    }

    /// Add `len` merged bytes to task `id`. `None` if the task is gone or was replaced.
    pub fn record_merged(&self, url: &str, id: TaskId, len: u64) -> Option<MergeProgress> {
        let mut tasks = self.tasks.write().unwrap();
        let task = tasks.get_mut(url).filter(|t| t.id == id)?;
        let next = task.accumulated.saturating_add(len);
        if next > task.total_length {
            tracing::error!(
                url,
                task_id = %id,
                accumulated = task.accumulated,
                len,
                total = task.total_length,
                "merged length would exceed total; ignoring chunk"
            );
            return None;
        }
        task.accumulated = next;
        task.merged_chunks += 1;
        Some(progress_of(task))
    }

    /// Count one permanently failed chunk for task `id`.
    pub fn record_failed(&self, url: &str, id: TaskId) -> Option<MergeProgress> {
        let mut tasks = self.tasks.write().unwrap();
        let task = tasks.get_mut(url).filter(|t| t.id == id)?;
        task.failed_chunks += 1;
        Some(progress_of(task))
    }

    /// Deregister `url` only if it still maps to task `id`.
    pub fn remove_matching(&self, url: &str, id: TaskId) -> Option<FileTask> {
        let mut tasks = self.tasks.write().unwrap();
        if tasks.get(url).map(|t| t.id) != Some(id) {
            return None;
        }
        tasks.remove(url)
    }

    /// Deregister whatever task is registered under `url`.
    pub fn remove(&self, url: &str) -> Option<FileTask> {
        self.tasks.write().unwrap().remove(url)
    }

    /// True if an active task other than `id` keeps scratch files in `dir`.
    pub fn scratch_dir_in_use(&self, dir: &Path, id: TaskId) -> bool {
        self.tasks
            .read()
            .unwrap()
            .values()
            .any(|t| t.id != id && t.scratch_dir == dir)
    }

    /// Deregister every task (shutdown).
    pub fn drain(&self) -> Vec<FileTask> {
        self.tasks.write().unwrap().drain().map(|(_, t)| t).collect()
    }
}

fn progress_of(task: &FileTask) -> MergeProgress {
    MergeProgress {
        accumulated: task.accumulated,
        total_length: task.total_length,
        failed_chunks: task.failed_chunks,
        settled: task.all_chunks_settled(),
    }
}
