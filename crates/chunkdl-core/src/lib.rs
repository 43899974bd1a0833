//! Segmented, resumable HTTP downloader.
//!
//! A [`Downloader`] splits each submitted file into fixed-size byte ranges,
//! fetches the ranges concurrently into scratch files, merges them into the
//! destination at their offsets on a single merge thread, verifies the
//! checksum, and reports the outcome through a [`DownloadListener`].

pub mod checksum;
pub mod config;
pub mod downloader;
pub mod executor;
mod fetcher;
pub mod listener;
pub mod logging;
mod merge;
pub mod naming;
pub mod planner;
pub mod retry;
pub mod storage;
pub mod task;
pub mod transport;

pub use checksum::{Checksum, ChecksumAlgorithm};
pub use config::{ChunkdlConfig, FailurePolicy};
pub use downloader::{Downloader, SubmitError};
pub use executor::{Executor, InlineExecutor, WorkerPool};
pub use listener::{ChannelListener, DownloadError, DownloadEvent, DownloadListener, FailureKind, NoopListener};
pub use planner::{plan_ranges, ByteRange, PlanError};
pub use task::{DownloadRequest, TaskId, TaskSnapshot};
pub use transport::{CurlTransport, RangeTransport};
