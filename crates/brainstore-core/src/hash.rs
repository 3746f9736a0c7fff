//! Content addressing for uploaded files.
//!
//! A file's identity is the hex SHA-256 of its full byte content. The same
//! bytes uploaded under a different name share one identity.

use std::io::Read;

use sha2::{Digest, Sha256};

/// Hash a fully buffered file.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Hash a file by streaming it through the hasher in fixed-size blocks.
pub fn content_hash_reader<R: Read>(mut reader: R) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Lowercased extension including the leading dot, or `""` when absent.
///
/// `"Report.PDF"` → `".pdf"`, `"archive.tar.gz"` → `".gz"`, `".env"` → `""`.
pub fn file_extension(file_name: &str) -> String {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    match base.rfind('.') {
        Some(0) | None => String::new(),
        Some(pos) => base[pos..].to_lowercase(),
    }
}
