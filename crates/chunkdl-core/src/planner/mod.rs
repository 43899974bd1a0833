//! Range math and chunk planning.
//!
//! Splits a download of known length into fixed-size byte ranges and
//! computes the HTTP Range directive for each of them.

mod range;

pub use range::{plan_ranges, ByteRange, PlanError};
