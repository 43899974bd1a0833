use std::collections::HashMap;
use std::ffi::OsStr;
use std::io;
use std::path::Path;
use std::sync::mpsc;
use std::sync::Arc;

use super::MergeEvent;
use crate::config::FailurePolicy;
use crate::listener::{DownloadError, ListenerSlot};
use crate::retry::FetchError;
use crate::storage::{temp_path, StorageWriter, StorageWriterBuilder};
use crate::task::{remove_scratch_dir_if_empty, Chunk, FileTask, TaskId, TaskRegistry, SCRATCH_DIR_NAME};

pub(crate) struct MergeConsumer {
    registry: Arc<TaskRegistry>,
    listener: Arc<ListenerSlot>,
    policy: FailurePolicy,
    /// Open `.part` files of tasks that have merged at least one chunk.
    writers: HashMap<TaskId, StorageWriter>,
}

impl MergeConsumer {
    pub(crate) fn new(registry: Arc<TaskRegistry>, listener: Arc<ListenerSlot>, policy: FailurePolicy) -> Self {
        Self {
            registry,
            listener,
            policy,
            writers: HashMap::new(),
        }
    }

    /// Drain `rx` until `Shutdown` (or every sender is gone), then clean up
    /// whatever is still queued or open.
    pub(crate) fn run(mut self, rx: mpsc::Receiver<MergeEvent>) {
        while let Ok(event) = rx.recv() {
            if !self.handle(event) {
                break;
            }
        }
        while let Ok(event) = rx.try_recv() {
            if let Some(chunk) = event.chunk() {
                chunk.remove_scratch();
                self.tidy_scratch_dir(&chunk.scratch_dir, chunk.task_id);
            }
        }
        for (_, writer) in self.writers.drain() {
            writer.discard();
        }
        tracing::debug!("merge consumer stopped");
    }

    /// Process one event. Returns false on `Shutdown`.
    pub(crate) fn handle(&mut self, event: MergeEvent) -> bool {
        match event {
            MergeEvent::Fetched(chunk) => self.merge_chunk(chunk),
            MergeEvent::FetchFailed { chunk, error } => self.chunk_failed(chunk, error),
            MergeEvent::Cancelled { task_id, scratch_dir } => {
                self.discard_writer(task_id);
                self.tidy_scratch_dir(&scratch_dir, task_id);
            }
            MergeEvent::Shutdown => return false,
        }
        true
    }

    fn merge_chunk(&mut self, chunk: Chunk) {
        let Some(task) = self.registry.get_matching(&chunk.url, chunk.task_id) else {
            tracing::debug!(url = %chunk.url, index = chunk.index, "task no longer active; discarding chunk");
            chunk.remove_scratch();
            self.tidy_scratch_dir(&chunk.scratch_dir, chunk.task_id);
            return;
        };

        let written = self.write_chunk(&task, &chunk);
        chunk.remove_scratch();
        if let Err(source) = written {
            tracing::error!(url = %task.url, index = chunk.index, "merge failed: {}", source);
            self.fail_task(&task, DownloadError::MergeIo { index: chunk.index, source });
            return;
        }

        let Some(progress) = self.registry.record_merged(&chunk.url, chunk.task_id, chunk.len()) else {
            return;
        };
        tracing::debug!(
            url = %task.url,
            index = chunk.index,
            accumulated = progress.accumulated,
            total = progress.total_length,
            "chunk merged"
        );
        self.listener.get().on_chunk_complete(&task.url);

        if progress.is_complete() {
            self.finish_task(&task);
        } else if progress.settled {
            self.drop_settled(&task, progress.failed_chunks);
        }
    }

    /// Copy the chunk's scratch bytes into the task's `.part` file at its offset.
    fn write_chunk(&mut self, task: &FileTask, chunk: &Chunk) -> io::Result<()> {
        if !self.writers.contains_key(&task.id) {
            let mut builder = StorageWriterBuilder::create(&temp_path(&task.dest_path()))?;
            if let Err(e) = builder.preallocate(task.total_length) {
                builder.build().discard();
                return Err(e);
            }
            self.writers.insert(task.id, builder.build());
        }
        let writer = &self.writers[&task.id];
        let copied = writer.copy_file_at(chunk.range.start, &chunk.scratch_path())?;
        if copied != chunk.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("scratch file holds {} bytes, expected {}", copied, chunk.len()),
            ));
        }
        Ok(())
    }

    /// All bytes are in: verify the checksum and move the file into place.
    fn finish_task(&mut self, task: &FileTask) {
        let Some(writer) = self.writers.remove(&task.id) else {
            return;
        };
        if self.registry.remove_matching(&task.url, task.id).is_none() {
            tracing::debug!(url = %task.url, task_id = %task.id, "task cancelled after its last merge; discarding");
            writer.discard();
            self.tidy_scratch_dir(&task.scratch_dir, task.id);
            return;
        }
        self.tidy_scratch_dir(&task.scratch_dir, task.id);

        let verified = writer
            .sync()
            .and_then(|()| task.checksum.verify_file(writer.temp_path()));
        let error = match verified {
            Ok(Ok(())) => {
                let temp = writer.temp_path().to_path_buf();
                let dest = task.dest_path();
                match writer.finalize(&dest) {
                    Ok(()) => {
                        tracing::info!(url = %task.url, task_id = %task.id, path = %dest.display(), "download complete");
                        self.listener.get().on_task_complete(&task.url);
                        return;
                    }
                    Err(e) => {
                        let _ = std::fs::remove_file(&temp);
                        DownloadError::Finalize(e)
                    }
                }
            }
            Ok(Err(actual)) => {
                writer.discard();
                DownloadError::IntegrityMismatch {
                    expected: task.checksum.to_string(),
                    actual: format!("{}:{}", task.checksum.algorithm.name(), actual),
                }
            }
            Err(e) => {
                writer.discard();
                DownloadError::Verify(e)
            }
        };
        tracing::warn!(url = %task.url, task_id = %task.id, "download failed: {}", error);
        self.listener.get().on_failure(&task.url, &error);
    }

    fn chunk_failed(&mut self, chunk: Chunk, source: FetchError) {
        chunk.remove_scratch();
        let Some(task) = self.registry.get_matching(&chunk.url, chunk.task_id) else {
            tracing::debug!(url = %chunk.url, index = chunk.index, "failure for inactive task ignored: {}", source);
            self.tidy_scratch_dir(&chunk.scratch_dir, chunk.task_id);
            return;
        };
        let error = DownloadError::Transport {
            index: chunk.index,
            range: chunk.range,
            source,
        };

        match self.policy {
            FailurePolicy::AbortTask => self.fail_task(&task, error),
            FailurePolicy::KeepSiblings => {
                let Some(progress) = self.registry.record_failed(&task.url, task.id) else {
                    return;
                };
                self.listener.get().on_failure(&task.url, &error);
                if progress.settled {
                    self.drop_settled(&task, progress.failed_chunks);
                }
            }
        }
    }

    /// Terminal failure: deregister, stop siblings, drop the `.part`, notify once.
    fn fail_task(&mut self, task: &FileTask, error: DownloadError) {
        if self.registry.remove_matching(&task.url, task.id).is_none() {
            return;
        }
        task.request_abort();
        self.discard_writer(task.id);
        self.tidy_scratch_dir(&task.scratch_dir, task.id);
        tracing::warn!(url = %task.url, task_id = %task.id, "download failed: {}", error);
        self.listener.get().on_failure(&task.url, &error);
    }

    /// Every chunk of a task has merged or failed but some failed: the task
    /// can never complete. Its failures were already reported.
    fn drop_settled(&mut self, task: &FileTask, failed_chunks: usize) {
        if self.registry.remove_matching(&task.url, task.id).is_none() {
            return;
        }
        self.discard_writer(task.id);
        self.tidy_scratch_dir(&task.scratch_dir, task.id);
        tracing::warn!(url = %task.url, task_id = %task.id, failed_chunks, "task settled with failed chunks; dropped");
    }

    fn discard_writer(&mut self, task_id: TaskId) {
        if let Some(writer) = self.writers.remove(&task_id) {
            writer.discard();
        }
    }

    /// Remove a default scratch directory once task `id` is done with it and
    /// no other active task uses it. Configured directories are left alone.
    fn tidy_scratch_dir(&self, dir: &Path, id: TaskId) {
        if dir.file_name() != Some(OsStr::new(SCRATCH_DIR_NAME)) {
            return;
        }
        if !self.registry.scratch_dir_in_use(dir, id) {
            remove_scratch_dir_if_empty(dir);
        }
    }
}
