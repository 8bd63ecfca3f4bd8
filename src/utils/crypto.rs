// file: src/utils/crypto.rs
// version: 1.0.0
// guid: 6fa3d0b8-2c5e-4e91-b7a4-c83e1f09d26a

//! Checksums for downloaded artifacts

use crate::error::ProvisionError;
use crate::Result;
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Lowercase hex SHA-256 of a file
pub async fn sha256_file(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];

    loop {
        let read = file.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Fail with an integrity error unless the file's digest equals `expected`
pub async fn verify_sha256(path: &Path, expected: &str) -> Result<()> {
    let actual = sha256_file(path).await?;
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(ProvisionError::integrity(format!(
            "SHA-256 of {} is {}, expected {}",
            path.display(),
            actual,
            expected.trim()
        )))
    }
}
