//! Chunk fetch error type for retry classification.

use std::fmt;

/// Error returned by a single chunk fetch. Kept separate from `DownloadError`
/// so the fetcher can classify and retry before reporting.
#[derive(Debug)]
pub enum FetchError {
    /// Curl reported an error (timeout, connection, etc.).
    Curl(curl::Error),
    /// HTTP response had a non-2xx status.
    Http(u32),
    /// Server sent a body whose length differs from the requested range
    /// (closed early, or ignored the Range header).
    PartialTransfer { expected: u64, received: u64 },
    /// Writing the scratch file failed (disk full, permission denied). Not retried.
    Scratch(std::io::Error),
    /// The task was cancelled or failed while this chunk was in flight.
    Aborted,
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Curl(e) => write!(f, "{}", e),
            FetchError::Http(code) => write!(f, "HTTP {}", code),
            FetchError::PartialTransfer { expected, received } => {
                write!(f, "partial transfer: expected {} bytes, got {}", expected, received)
            }
            FetchError::Scratch(e) => write!(f, "scratch file: {}", e),
            FetchError::Aborted => write!(f, "aborted"),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Curl(e) => Some(e),
            FetchError::Scratch(e) => Some(e),
            FetchError::Http(_) | FetchError::PartialTransfer { .. } | FetchError::Aborted => None,
        }
    }
}
