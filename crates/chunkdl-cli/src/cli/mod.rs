//! CLI for the chunkdl segmented downloader.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use chunkdl_core::checksum::ChecksumAlgorithm;
use chunkdl_core::config;
use std::path::PathBuf;

use commands::{run_checksum, run_get, run_plan, run_probe, GetArgs};

/// Top-level CLI for chunkdl.
#[derive(Debug, Parser)]
#[command(name = "chunkdl")]
#[command(about = "chunkdl: segmented, checksum-verified HTTP downloader", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download a URL in parallel byte ranges and verify its checksum.
    Get {
        /// Direct HTTP/HTTPS URL to download.
        url: String,

        /// Expected digest: `sha256:<hex>`, `md5:<hex>`, or bare hex.
        #[arg(long, short = 'c')]
        checksum: String,

        /// Total length in bytes. Probed with HEAD when omitted.
        #[arg(long, value_name = "BYTES")]
        length: Option<u64>,

        /// Destination directory (default: current directory).
        #[arg(long, short = 'd')]
        dir: Option<PathBuf>,

        /// Destination file name (default: derived from the server or URL).
        #[arg(long, short = 'o')]
        name: Option<String>,

        /// Maximum bytes per chunk (default from config).
        #[arg(long, value_name = "BYTES")]
        segment_size: Option<u64>,

        /// Print events as JSON lines.
        #[arg(long)]
        json: bool,
    },

    /// Show the byte ranges a download of LENGTH bytes is split into.
    Plan {
        /// Total length in bytes.
        length: u64,

        /// Maximum bytes per chunk (default from config).
        #[arg(long, value_name = "BYTES")]
        segment_size: Option<u64>,
    },

    /// Compute the digest of a file.
    Checksum {
        /// Path to the file.
        path: PathBuf,

        #[arg(long, value_enum, default_value_t = Algo::Sha256)]
        algo: Algo,
    },

    /// Show HEAD metadata of a URL (length, range support, validators).
    Probe {
        url: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Algo {
    Sha256,
    Md5,
}

impl From<Algo> for ChecksumAlgorithm {
    fn from(a: Algo) -> Self {
        match a {
            Algo::Sha256 => ChecksumAlgorithm::Sha256,
            Algo::Md5 => ChecksumAlgorithm::Md5,
        }
    }
}

impl CliCommand {
    /// Parse arguments and run the command. Returns the process exit code.
    pub async fn run_from_args() -> Result<i32> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Get {
                url,
                checksum,
                length,
                dir,
                name,
                segment_size,
                json,
            } => {
                let args = GetArgs {
                    url,
                    checksum,
                    length,
                    dir,
                    name,
                    segment_size,
                    json,
                };
                return run_get(&cfg, args).await;
            }
            CliCommand::Plan { length, segment_size } => {
                run_plan(length, segment_size.unwrap_or(cfg.max_segment_size))?;
            }
            CliCommand::Checksum { path, algo } => run_checksum(&path, algo.into()).await?,
            CliCommand::Probe { url } => run_probe(&url, &cfg).await?,
        }

        Ok(0)
    }
}

#[cfg(test)]
mod tests;
