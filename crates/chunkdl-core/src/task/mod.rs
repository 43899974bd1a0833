//! Download tasks and their chunks.
//!
//! A `FileTask` is one logical download, keyed by its trimmed URL in the
//! `TaskRegistry`. Each task is split into `Chunk`s that travel from the
//! dispatcher to a fetcher and from the fetcher to the merge consumer.

mod chunk;
mod registry;

pub use chunk::Chunk;
pub use registry::{Conflict, MergeProgress, TaskRegistry};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::checksum::Checksum;

/// Process-unique identity of a task. A URL that is cancelled and submitted
/// again gets a new id, so chunks of the old task are never merged into the new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl TaskId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        TaskId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A download request as accepted by `Downloader::submit`.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    /// Expected digest, e.g. `sha256:<hex>` or bare hex.
    pub checksum: String,
    /// Expected total length in bytes.
    pub total_length: u64,
    pub dest_dir: PathBuf,
    pub dest_name: String,
}

impl DownloadRequest {
    pub fn new(
        url: impl Into<String>,
        checksum: impl Into<String>,
        total_length: u64,
        dest_dir: impl Into<PathBuf>,
        dest_name: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            checksum: checksum.into(),
            total_length,
            dest_dir: dest_dir.into(),
            dest_name: dest_name.into(),
        }
    }
}

/// Authoritative record of one in-flight download. Owned by the registry;
/// only the merge consumer advances `accumulated`.
#[derive(Debug, Clone)]
pub struct FileTask {
    pub id: TaskId,
    pub url: String,
    pub total_length: u64,
    pub checksum: Checksum,
    pub dest_dir: PathBuf,
    pub dest_name: String,
    pub scratch_dir: PathBuf,
    pub chunk_count: usize,
    accumulated: u64,
    merged_chunks: usize,
    failed_chunks: usize,
    abort: Arc<AtomicBool>,
}

impl FileTask {
    pub(crate) fn new(
        url: String,
        checksum: Checksum,
        total_length: u64,
        dest_dir: PathBuf,
        dest_name: String,
        scratch_dir: PathBuf,
        chunk_count: usize,
    ) -> Self {
        Self {
            id: TaskId::next(),
            url,
            total_length,
            checksum,
            dest_dir,
            dest_name,
            scratch_dir,
            chunk_count,
            accumulated: 0,
            merged_chunks: 0,
            failed_chunks: 0,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Final path of the verified download.
    pub fn dest_path(&self) -> PathBuf {
        self.dest_dir.join(&self.dest_name)
    }

    /// Shared token that stops this task's fetchers when raised.
    pub fn abort_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    pub(crate) fn request_abort(&self) {
        self.abort.store(true, Ordering::Relaxed);
    }

    /// Every chunk has either merged or failed.
    pub(crate) fn all_chunks_settled(&self) -> bool {
        self.merged_chunks + self.failed_chunks >= self.chunk_count
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id,
            url: self.url.clone(),
            total_length: self.total_length,
            accumulated: self.accumulated,
            chunk_count: self.chunk_count,
            merged_chunks: self.merged_chunks,
            failed_chunks: self.failed_chunks,
            dest_path: self.dest_path(),
        }
    }

    /// Scratch file name for chunk `index`: `{dest_name}.t{id}.c{index}.chunk`.
    pub(crate) fn scratch_name(&self, index: usize) -> String {
        scratch_file_name(&self.dest_name, self.id, index)
    }
}

pub(crate) fn scratch_file_name(dest_name: &str, id: TaskId, index: usize) -> String {
    format!("{}.t{}.c{}.chunk", dest_name, id.0, index)
}

/// Read-only copy of a task's progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub url: String,
    pub total_length: u64,
    pub accumulated: u64,
    pub chunk_count: usize,
    pub merged_chunks: usize,
    pub failed_chunks: usize,
    pub dest_path: PathBuf,
}

impl TaskSnapshot {
    /// Fraction complete in [0.0, 1.0].
    pub fn fraction(&self) -> f64 {
        if self.total_length == 0 {
            return 1.0;
        }
        (self.accumulated as f64 / self.total_length as f64).min(1.0)
    }
}

/// Name of the scratch directory created under a destination directory.
pub const SCRATCH_DIR_NAME: &str = ".chunkdl";

/// Default scratch directory for a destination directory.
pub fn default_scratch_dir(dest_dir: &Path) -> PathBuf {
    dest_dir.join(SCRATCH_DIR_NAME)
}

/// Remove `dir` if it is empty. Anything else (missing, not empty, still
/// being filled by another task) leaves it alone.
pub(crate) fn remove_scratch_dir_if_empty(dir: &Path) {
    match std::fs::remove_dir(dir) {
        Ok(()) => tracing::debug!(path = %dir.display(), "removed empty scratch directory"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::trace!(path = %dir.display(), "scratch directory kept: {}", e),
    }
}

#[cfg(test)]
pub(crate) fn test_task(url: &str, total_length: u64, chunk_count: usize) -> FileTask {
    let checksum: Checksum = "0".repeat(64).parse().unwrap();
    FileTask::new(
        url.to_string(),
        checksum,
        total_length,
        PathBuf::from("/tmp/dest"),
        "file.bin".to_string(),
        PathBuf::from("/tmp/dest/.chunkdl"),
        chunk_count,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_ids_are_unique() {
        let a = TaskId::next();
        let b = TaskId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn scratch_names_are_deterministic() {
        assert_eq!(scratch_file_name("a.iso", TaskId(7), 3), "a.iso.t7.c3.chunk");
        let t = test_task("https://example.com/f", 10, 3);
        assert_eq!(t.scratch_name(0), format!("file.bin.t{}.c0.chunk", t.id));
    }

    #[test]
    fn snapshot_fraction() {
        let t = test_task("https://example.com/f", 10, 3);
        let mut s = t.snapshot();
        assert_eq!(s.fraction(), 0.0);
        s.accumulated = 5;
        assert!((s.fraction() - 0.5).abs() < 1e-9);
        assert_eq!(s.dest_path, PathBuf::from("/tmp/dest/file.bin"));
    }

    #[test]
    fn empty_scratch_dir_is_removed_and_busy_one_kept() {
        let root = tempfile::tempdir().unwrap();
        let dir = default_scratch_dir(root.path());
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(dir.join("x.chunk"), b"1").unwrap();
        remove_scratch_dir_if_empty(&dir);
        assert!(dir.exists());

        std::fs::remove_file(dir.join("x.chunk")).unwrap();
        remove_scratch_dir_if_empty(&dir);
        assert!(!dir.exists());
        remove_scratch_dir_if_empty(&dir);
    }

    #[test]
    fn abort_token_is_shared() {
        let t = test_task("https://example.com/f", 10, 1);
        let token = t.abort_token();
        assert!(!token.load(Ordering::Relaxed));
        t.clone().request_abort();
        assert!(token.load(Ordering::Relaxed));
    }
}
