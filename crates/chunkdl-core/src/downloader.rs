//! Task dispatcher: the long-lived `Downloader` value.
//!
//! `submit` registers a task, plans its byte ranges and hands one fetch job
//! per chunk to the executor. Fetch outcomes flow through the completion
//! queue to the merge thread spawned by `Downloader::new`.

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;

use thiserror::Error;

use crate::checksum::Checksum;
use crate::config::{ChunkdlConfig, FailurePolicy};
use crate::executor::{Executor, WorkerPool};
use crate::fetcher::{fetch_chunk, FetchContext};
use crate::listener::{DownloadListener, ListenerSlot};
use crate::merge::{MergeConsumer, MergeEvent};
use crate::naming::is_plain_file_name;
use crate::planner::plan_ranges;
use crate::retry::RetryPolicy;
use crate::task::{
    default_scratch_dir, Chunk, Conflict, DownloadRequest, FileTask, TaskId, TaskRegistry, TaskSnapshot,
};
use crate::transport::{CurlTransport, RangeTransport};

/// Synchronous rejection of a `submit` or `set_max_segment_size` call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("a download of {0} is already in progress")]
    DuplicateTask(String),
    #[error("{} is already the destination of {url}", path.display())]
    DestinationInUse { path: PathBuf, url: String },
    #[error("downloader is shut down")]
    ShutDown,
}

pub struct Downloader {
    registry: Arc<TaskRegistry>,
    listener: Arc<ListenerSlot>,
    executor: Arc<dyn Executor>,
    fetch: Arc<FetchContext>,
    queue: mpsc::Sender<MergeEvent>,
    merge_thread: Mutex<Option<JoinHandle<()>>>,
    max_segment_size: AtomicU64,
    scratch_dir: Option<PathBuf>,
    /// False once shutdown has begun; guarded so admission and shutdown
    /// cannot interleave.
    accepting: RwLock<bool>,
}

impl Downloader {
    /// Build a downloader around `transport` and `executor` and start its
    /// merge thread.
    pub fn new(
        config: &ChunkdlConfig,
        transport: Arc<dyn RangeTransport>,
        executor: Arc<dyn Executor>,
    ) -> io::Result<Self> {
        if config.max_segment_size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "max_segment_size must be greater than zero",
            ));
        }
        let registry = Arc::new(TaskRegistry::new());
        let listener = Arc::new(ListenerSlot::new());
        let (tx, rx) = mpsc::channel();

        let consumer = MergeConsumer::new(
            Arc::clone(&registry),
            Arc::clone(&listener),
            config.failure_policy,
        );
        let merge_thread = std::thread::Builder::new()
            .name("chunkdl-merge".into())
            .spawn(move || consumer.run(rx))?;

        if config.failure_policy == FailurePolicy::KeepSiblings {
            tracing::debug!("chunk failures leave sibling chunks running");
        }

        Ok(Self {
            registry,
            listener,
            executor,
            fetch: Arc::new(FetchContext {
                transport,
                retry: RetryPolicy::from_config(config.retry.as_ref()),
                queue: tx.clone(),
            }),
            queue: tx,
            merge_thread: Mutex::new(Some(merge_thread)),
            max_segment_size: AtomicU64::new(config.max_segment_size),
            scratch_dir: config.scratch_dir.clone(),
            accepting: RwLock::new(true),
        })
    }

    /// Downloader with the curl transport and a worker pool sized from `config`.
    pub fn from_config(config: &ChunkdlConfig) -> io::Result<Self> {
        let transport = Arc::new(CurlTransport::new(config.curl));
        let pool = Arc::new(WorkerPool::new(config.workers)?);
        Self::new(config, transport, pool)
    }

    /// Admit a download and schedule its chunks. Returns as soon as every
    /// fetch job is handed to the executor.
    pub fn submit(&self, request: DownloadRequest) -> Result<TaskId, SubmitError> {
        let accepting = self.accepting.read().unwrap();
        if !*accepting {
            return Err(SubmitError::ShutDown);
        }

        let url = request.url.trim();
        if url.is_empty() {
            return Err(SubmitError::InvalidArgument("url is empty".into()));
        }
        ::url::Url::parse(url)
            .map_err(|e| SubmitError::InvalidArgument(format!("url {url:?}: {e}")))?;
        if request.total_length == 0 {
            return Err(SubmitError::InvalidArgument("total length must be greater than zero".into()));
        }
        let dest_name = request.dest_name.trim();
        if dest_name.is_empty() {
            return Err(SubmitError::InvalidArgument("destination name is empty".into()));
        }
        if !is_plain_file_name(dest_name) {
            return Err(SubmitError::InvalidArgument(format!(
                "destination name {dest_name:?} must be a single path component"
            )));
        }
        let checksum: Checksum = request
            .checksum
            .parse()
            .map_err(|e| SubmitError::InvalidArgument(format!("checksum: {e}")))?;

        let max_segment_size = self.max_segment_size.load(Ordering::Relaxed);
        let ranges = plan_ranges(request.total_length, max_segment_size)
            .map_err(|e| SubmitError::InvalidArgument(e.to_string()))?;

        let scratch_dir = self
            .scratch_dir
            .clone()
            .unwrap_or_else(|| default_scratch_dir(&request.dest_dir));
        let task = FileTask::new(
            url.to_string(),
            checksum,
            request.total_length,
            request.dest_dir.clone(),
            dest_name.to_string(),
            scratch_dir,
            ranges.len(),
        );
        let chunks: Vec<Chunk> = ranges
            .into_iter()
            .enumerate()
            .map(|(index, range)| Chunk::for_task(&task, index, range))
            .collect();

        let dest = task.dest_path();
        let id = self.registry.try_insert(task).map_err(|conflict| match conflict {
            Conflict::Url(existing) => {
                tracing::debug!(url, task_id = %existing, "duplicate submission rejected");
                SubmitError::DuplicateTask(url.to_string())
            }
            Conflict::Destination { url: owner, id: existing } => {
                tracing::debug!(url, owner = %owner, task_id = %existing, "destination already in use");
                SubmitError::DestinationInUse { path: dest, url: owner }
            }
        })?;
        tracing::info!(
            url,
            task_id = %id,
            total = request.total_length,
            chunks = chunks.len(),
            "download accepted"
        );

        for chunk in chunks {
            let ctx = Arc::clone(&self.fetch);
            self.executor.execute(Box::new(move || fetch_chunk(&ctx, chunk)));
        }
        drop(accepting);
        Ok(id)
    }

    /// Chunk size for tasks submitted from now on.
    pub fn set_max_segment_size(&self, bytes: u64) -> Result<(), SubmitError> {
        if bytes == 0 {
            return Err(SubmitError::InvalidArgument("max segment size must be greater than zero".into()));
        }
        self.max_segment_size.store(bytes, Ordering::Relaxed);
        Ok(())
    }

    pub fn max_segment_size(&self) -> u64 {
        self.max_segment_size.load(Ordering::Relaxed)
    }

    /// Replace the listener. Notifications already being delivered finish
    /// on the previous one.
    pub fn set_listener(&self, listener: Arc<dyn DownloadListener>) {
        self.listener.set(listener);
    }

    /// Stop the download of `url`. Returns false if nothing was registered.
    pub fn cancel(&self, url: &str) -> bool {
        let url = url.trim();
        let Some(task) = self.registry.remove(url) else {
            return false;
        };
        task.request_abort();
        tracing::info!(url, task_id = %task.id, "download cancelled");
        let _ = self.queue.send(MergeEvent::Cancelled {
            task_id: task.id,
            scratch_dir: task.scratch_dir,
        });
        true
    }

    pub fn progress(&self, url: &str) -> Option<TaskSnapshot> {
        self.registry.snapshot(url.trim())
    }

    pub fn active_tasks(&self) -> usize {
        self.registry.len()
    }

    /// Stop admission, abort every task, let queued work drain, and join the
    /// merge thread.
    pub fn shutdown(self) {
        self.stop();
    }

    fn stop(&self) {
        {
            let mut accepting = self.accepting.write().unwrap();
            if !*accepting {
                return;
            }
            *accepting = false;
        }

        let tasks = self.registry.drain();
        if !tasks.is_empty() {
            tracing::info!(count = tasks.len(), "aborting active downloads");
        }
        for task in tasks {
            task.request_abort();
            let _ = self.queue.send(MergeEvent::Cancelled {
                task_id: task.id,
                scratch_dir: task.scratch_dir,
            });
        }

        self.executor.wait_idle();
        let _ = self.queue.send(MergeEvent::Shutdown);
        if let Some(handle) = self.merge_thread.lock().unwrap().take() {
            if handle.join().is_err() {
                tracing::error!("merge thread panicked");
            }
        }
        tracing::debug!("downloader stopped");
    }
}

impl Drop for Downloader {
    fn drop(&mut self) {
        self.stop();
    }
}
