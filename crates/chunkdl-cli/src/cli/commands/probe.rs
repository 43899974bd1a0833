//! Probe command: HEAD a URL and print what the downloader would use.

use anyhow::Result;
use chunkdl_core::config::ChunkdlConfig;
use chunkdl_core::naming::dest_name_for;
use chunkdl_core::transport::probe;

pub async fn run_probe(url: &str, cfg: &ChunkdlConfig) -> Result<()> {
    let owned = url.to_string();
    let curl = cfg.curl;
    let head = tokio::task::spawn_blocking(move || probe(&owned, &curl)).await??;

    match head.content_length {
        Some(n) => println!("length:         {}", n),
        None => println!("length:         unknown"),
    }
    println!("accept-ranges:  {}", if head.accept_ranges { "bytes" } else { "no" });
    if let Some(etag) = &head.etag {
        println!("etag:           {}", etag);
    }
    if let Some(lm) = &head.last_modified {
        println!("last-modified:  {}", lm);
    }
    println!(
        "file name:      {}",
        dest_name_for(url, head.content_disposition.as_deref())
    );
    if !head.accept_ranges {
        println!("warning: server does not advertise byte ranges; chunked download may fail");
    }
    Ok(())
}
