//! Plan command: print the chunk ranges for a given length.

use anyhow::Result;
use chunkdl_core::planner::plan_ranges;

pub fn run_plan(length: u64, segment_size: u64) -> Result<()> {
    let ranges = plan_ranges(length, segment_size)?;
    println!("{} chunk(s) of at most {} bytes", ranges.len(), segment_size);
    for (i, r) in ranges.iter().enumerate() {
        println!("{:>6}  {:<28} {}", i, r.range_header_value(), r.len());
    }
    Ok(())
}
