//! CLI command handlers, one per file.

mod checksum;
mod get;
mod plan;
mod probe;

pub use checksum::run_checksum;
pub use get::{run_get, GetArgs};
pub use plan::run_plan;
pub use probe::run_probe;
