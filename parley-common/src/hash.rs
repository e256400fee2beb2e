//! SHA-256 hashing utilities
//!
//! Used for the optional content hash carried in `file-start`. File hashing
//! runs under `spawn_blocking` so large files don't stall tokio's async
//! worker threads.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::HASH_BUFFER_SIZE;

/// Lowercase hex SHA-256 of an in-memory buffer
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Compute SHA-256 hash of an entire file
///
/// Runs on a blocking thread pool to avoid blocking async workers.
pub async fn compute_sha256(path: &Path) -> io::Result<String> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || compute_sha256_sync(&path))
        .await
        .map_err(|e| io::Error::other(format!("hash task failed: {e}")))?
}

/// Compute SHA-256 hash of an entire file (synchronous)
pub fn compute_sha256_sync(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}
