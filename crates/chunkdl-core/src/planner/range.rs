//! Byte range type and fixed-size range planning.

use std::fmt;
use thiserror::Error;

/// A byte range `[start, end)` (half-open).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    /// Start offset (inclusive).
    pub start: u64,
    /// End offset (exclusive).
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Length of this range in bytes.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// HTTP Range header value (inclusive end): `bytes=start-(end-1)`.
    pub fn range_header_value(&self) -> String {
        format!("bytes={}", self.curl_range())
    }

    /// Range in the form libcurl expects for `CURLOPT_RANGE`: `start-(end-1)`.
    pub fn curl_range(&self) -> String {
        if self.is_empty() {
            "0-0".to_string()
        } else {
            format!("{}-{}", self.start, self.end - 1)
        }
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

/// Builds the range plan for `total_length` bytes in pieces of at most `max_segment_size`.
///
/// Every range but the last is exactly `max_segment_size` long; the last one
/// holds the remainder (or a full segment when the length divides evenly).
pub fn plan_ranges(total_length: u64, max_segment_size: u64) -> Result<Vec<ByteRange>, PlanError> {
    if total_length == 0 {
        return Err(PlanError::InvalidArgument("total length must be positive"));
    }
    if max_segment_size == 0 {
        return Err(PlanError::InvalidArgument("max segment size must be positive"));
    }

    let count = total_length.div_ceil(max_segment_size);
    let mut out = Vec::with_capacity(count as usize);
    let mut offset = 0u64;
    while offset < total_length {
        let end = offset.saturating_add(max_segment_size).min(total_length);
        out.push(ByteRange { start: offset, end });
        offset = end;
    }

    Ok(out)
}
