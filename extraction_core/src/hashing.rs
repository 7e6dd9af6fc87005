//! Content digests identifying pool entries.

use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::filesystem::Filesystem;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Streams the file at `path` and returns its SHA-256 digest as 64 lowercase
/// hex characters
pub async fn sha256_hex(fs: &dyn Filesystem, path: &Path) -> io::Result<String> {
    let mut reader = fs.open_read(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let read = reader.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}
