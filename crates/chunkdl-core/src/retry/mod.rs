//! Retry and backoff policy for chunk fetches.
//!
//! Classifies fetch errors (timeouts, throttling, connection failures, short
//! bodies) and decides on exponential backoff so a transient failure does
//! not cost the whole chunk.

mod classify;
mod error;
mod policy;
mod run;

pub use classify::{classify, classify_curl_error, classify_http_status};
pub use error::FetchError;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::run_with_retry;
