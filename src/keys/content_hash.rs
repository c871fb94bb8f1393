//! Streaming content hashing for media files.
//!
//! The key is derived from file bytes only, never from the name or path, so
//! renaming or re-downloading a file can never cause reprocessing.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, BufReader};

/// Read chunk size for hashing (1 MiB keeps memory bounded on large files)
const CHUNK_SIZE: usize = 1024 * 1024;

/// Compute the SHA-256 digest of a file's contents as lowercase hex.
pub async fn hash_file(path: &Path) -> Result<String, std::io::Error> {
    let file = File::open(path).await?;
    let mut reader = BufReader::with_capacity(CHUNK_SIZE, file);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}
