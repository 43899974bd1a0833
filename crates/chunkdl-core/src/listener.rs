//! Listener dispatch: failure, per-chunk and completion notifications.
//!
//! Every notification is delivered from the merge thread, so a listener is
//! never called concurrently with itself. A slow listener slows merging of
//! all tasks.

use serde::Serialize;
use std::io;
use std::sync::{Arc, RwLock};
use thiserror::Error;

use crate::planner::ByteRange;
use crate::retry::FetchError;

/// Failure delivered to `DownloadListener::on_failure`.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("chunk {index} {range} failed: {source}")]
    Transport {
        index: usize,
        range: ByteRange,
        source: FetchError,
    },
    #[error("merging chunk {index} failed: {source}")]
    MergeIo { index: usize, source: io::Error },
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },
    #[error("could not read download for verification: {0}")]
    Verify(#[source] io::Error),
    #[error("could not move download into place: {0}")]
    Finalize(#[source] io::Error),
}

/// Coarse category of a `DownloadError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transport,
    MergeIo,
    IntegrityMismatch,
    Verify,
    Finalize,
}

impl DownloadError {
    pub fn kind(&self) -> FailureKind {
        match self {
            DownloadError::Transport { .. } => FailureKind::Transport,
            DownloadError::MergeIo { .. } => FailureKind::MergeIo,
            DownloadError::IntegrityMismatch { .. } => FailureKind::IntegrityMismatch,
            DownloadError::Verify(_) => FailureKind::Verify,
            DownloadError::Finalize(_) => FailureKind::Finalize,
        }
    }
}

/// Receiver of download notifications, implemented by the caller.
pub trait DownloadListener: Send + Sync {
    fn on_failure(&self, url: &str, error: &DownloadError);

    /// A chunk of `url` was merged into the destination.
    fn on_chunk_complete(&self, _url: &str) {}

    /// `url` was fully merged, verified and moved into place.
    fn on_task_complete(&self, url: &str);
}

/// Listener installed until `Downloader::set_listener` is called.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl DownloadListener for NoopListener {
    fn on_failure(&self, url: &str, error: &DownloadError) {
        tracing::debug!(url, "unobserved failure: {}", error);
    }

    fn on_task_complete(&self, _url: &str) {}
}

/// Owned form of a notification, for listeners that forward events elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DownloadEvent {
    Failure {
        url: String,
        kind: FailureKind,
        message: String,
    },
    ChunkComplete {
        url: String,
    },
    TaskComplete {
        url: String,
    },
}

impl DownloadEvent {
    pub fn url(&self) -> &str {
        match self {
            DownloadEvent::Failure { url, .. }
            | DownloadEvent::ChunkComplete { url }
            | DownloadEvent::TaskComplete { url } => url,
        }
    }

    /// Failure or completion; no further events follow for this task.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DownloadEvent::ChunkComplete { .. })
    }
}

/// Forwards notifications into a tokio unbounded channel so async code can
/// `recv().await` them. Sending never blocks the merge thread.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: tokio::sync::mpsc::UnboundedSender<DownloadEvent>,
}

impl ChannelListener {
    pub fn new() -> (Self, tokio::sync::mpsc::UnboundedReceiver<DownloadEvent>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: DownloadEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("event receiver dropped");
        }
    }
}

impl DownloadListener for ChannelListener {
    fn on_failure(&self, url: &str, error: &DownloadError) {
        self.send(DownloadEvent::Failure {
            url: url.to_string(),
            kind: error.kind(),
            message: error.to_string(),
        });
    }

    fn on_chunk_complete(&self, url: &str) {
        self.send(DownloadEvent::ChunkComplete { url: url.to_string() });
    }

    fn on_task_complete(&self, url: &str) {
        self.send(DownloadEvent::TaskComplete { url: url.to_string() });
    }
}

/// Holder for the single installed listener. The lock is released before any
/// callback runs.
pub(crate) struct ListenerSlot {
    inner: RwLock<Arc<dyn DownloadListener>>,
}

impl ListenerSlot {
    pub(crate) fn new() -> Self {
        Self {
            inner: RwLock::new(Arc::new(NoopListener)),
        }
    }

    pub(crate) fn set(&self, listener: Arc<dyn DownloadListener>) {
        *self.inner.write().unwrap() = listener;
    }

    pub(crate) fn get(&self) -> Arc<dyn DownloadListener> {
        Arc::clone(&self.inner.read().unwrap())
    }
}
