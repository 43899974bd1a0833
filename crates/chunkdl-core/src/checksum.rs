//! Integrity check run once the last chunk of a task is merged.
//!
//! Digests are computed by streaming the finished file; nothing is hashed
//! inline with the fetch path.

use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

const BUF_SIZE: usize = 64 * 1024;

/// Digest algorithm of an expected checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    Sha256,
    Md5,
}

impl ChecksumAlgorithm {
    fn hex_len(self) -> usize {
        match self {
            ChecksumAlgorithm::Sha256 => 64,
            ChecksumAlgorithm::Md5 => 32,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ChecksumAlgorithm::Sha256 => "sha256",
            ChecksumAlgorithm::Md5 => "md5",
        }
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = ChecksumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(ChecksumAlgorithm::Sha256),
            "md5" => Ok(ChecksumAlgorithm::Md5),
            other => Err(ChecksumParseError::UnknownAlgorithm(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChecksumParseError {
    #[error("unknown checksum algorithm: {0}")]
    UnknownAlgorithm(String),
    #[error("checksum is not valid hex: {0}")]
    NotHex(String),
    #[error("{algorithm} checksum must be {expected} hex chars, got {actual}")]
    BadLength {
        algorithm: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Expected digest of a download: `sha256:<hex>`, `md5:<hex>`, or bare hex
/// (32 chars → MD5, 64 chars → SHA-256). Stored as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    pub algorithm: ChecksumAlgorithm,
    pub hex: String,
}

impl Checksum {
    pub fn new(algorithm: ChecksumAlgorithm, hex_digest: &str) -> Result<Self, ChecksumParseError> {
        let hex_digest = hex_digest.trim().to_ascii_lowercase();
        if hex_digest.len() != algorithm.hex_len() {
            return Err(ChecksumParseError::BadLength {
                algorithm: algorithm.name(),
                expected: algorithm.hex_len(),
                actual: hex_digest.len(),
            });
        }
        if hex::decode(&hex_digest).is_err() {
            return Err(ChecksumParseError::NotHex(hex_digest));
        }
        Ok(Self {
            algorithm,
            hex: hex_digest,
        })
    }

    /// Stream `path` and compare its digest with this checksum.
    /// Returns the actual digest on mismatch.
    pub fn verify_file(&self, path: &Path) -> io::Result<Result<(), String>> {
        let actual = digest_path(self.algorithm, path)?;
        if actual == self.hex {
            Ok(Ok(()))
        } else {
            Ok(Err(actual))
        }
    }
}

impl FromStr for Checksum {
    type Err = ChecksumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some((algo, digest)) = s.split_once(':') {
            return Checksum::new(algo.parse()?, digest);
        }
        let algorithm = match s.len() {
            32 => ChecksumAlgorithm::Md5,
            _ => ChecksumAlgorithm::Sha256,
        };
        Checksum::new(algorithm, s)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.name(), self.hex)
    }
}

/// Compute the digest of a file with `algorithm`, as lowercase hex.
pub fn digest_path(algorithm: ChecksumAlgorithm, path: &Path) -> io::Result<String> {
    match algorithm {
        ChecksumAlgorithm::Sha256 => sha256_path(path),
        ChecksumAlgorithm::Md5 => md5_path(path),
    }
}

/// Compute SHA-256 of a file and return the digest as lowercase hex.
/// Reads in chunks to keep memory use bounded; suitable for large files.
pub fn sha256_path(path: &Path) -> io::Result<String> {
    let mut hasher = Sha256::new();
    stream_file(path, |block| hasher.update(block))?;
    Ok(hex::encode(hasher.finalize()))
}

/// Compute MD5 of a file and return the digest as lowercase hex.
pub fn md5_path(path: &Path) -> io::Result<String> {
    let mut ctx = md5::Context::new();
    stream_file(path, |block| ctx.consume(block))?;
    Ok(format!("{:x}", ctx.compute()))
}

fn stream_file(path: &Path, mut update: impl FnMut(&[u8])) -> io::Result<()> {
    let mut f = File::open(path)?;
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = f.read(&mut buf)?;
        if n == 0 {
            return Ok(());
        }
        update(&buf[..n]);
    }
}
