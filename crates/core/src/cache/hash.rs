//! Content hashing for source images and lock keys.

use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Read buffer size for streaming image hashes.
const HASH_CHUNK: usize = 64 * 1024;

/// Compute the SHA-256 of a byte slice as lowercase hex.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Stream a file through SHA-256 without loading it whole.
pub async fn file_hash(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_CHUNK];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Stable key for one (lane, project, page) slot.
pub fn slot_key(lane: &str, project: &str, page_index: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(lane.as_bytes());
    hasher.update(b"\n");
    hasher.update(project.as_bytes());
    hasher.update(b"\n");
    hasher.update(page_index.to_le_bytes());
    hex::encode(hasher.finalize())
}
