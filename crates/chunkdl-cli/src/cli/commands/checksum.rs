//! Checksum command: digest a file the way finished downloads are verified.

use anyhow::{Context, Result};
use chunkdl_core::checksum::{self, ChecksumAlgorithm};
use std::path::Path;

/// Compute and print the digest of `path` as `<hex>  <path>`.
pub async fn run_checksum(path: &Path, algorithm: ChecksumAlgorithm) -> Result<()> {
    let owned = path.to_path_buf();
    let digest = tokio::task::spawn_blocking(move || checksum::digest_path(algorithm, &owned))
        .await?
        .with_context(|| format!("read {}", path.display()))?;
    println!("{}  {}", digest, path.display());
    Ok(())
}
