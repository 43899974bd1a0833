//! HTTP transport seam.
//!
//! The fetcher only needs "stream bytes `[start, end)` of this URL into a
//! sink"; `CurlTransport` provides that with libcurl range GETs. Tests and
//! embedders can plug in their own `RangeTransport`.

mod range_get;
mod head;

pub use range_get::CurlTransport;
pub use head::{probe, HeadResult};

use std::io::Write;
use std::sync::atomic::AtomicBool;

use crate::planner::ByteRange;
use crate::retry::FetchError;

/// Partial-content fetch capability.
pub trait RangeTransport: Send + Sync {
    /// Stream exactly `range.len()` bytes of `url` starting at `range.start`
    /// into `sink`, returning the byte count. Implementations must stop early
    /// with `FetchError::Aborted` once `abort` is raised.
    fn fetch_range(
        &self,
        url: &str,
        range: ByteRange,
        sink: &mut dyn Write,
        abort: &AtomicBool,
    ) -> Result<u64, FetchError>;
}
