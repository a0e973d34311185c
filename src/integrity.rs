//! Package hash verification

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{Result, UpdateError};

/// SHA-256 of a file as lowercase hex
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn is_sha256_hex(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Check a downloaded package against the record's hash
///
/// Returns `Ok(true)` if the hash was verified, `Ok(false)` if the hash is
/// empty or not a SHA-256 digest and was skipped.
pub fn verify_package(path: &Path, expected: &str) -> Result<bool> {
    let expected = expected.trim();
    if expected.is_empty() {
        return Ok(false);
    }
    if !is_sha256_hex(expected) {
        tracing::warn!(
            path = %path.display(),
            hash = expected,
            "Package hash is not a SHA-256 digest, skipping verification"
        );
        return Ok(false);
    }

    let actual = sha256_file(path)?;
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(UpdateError::HashMismatch {
            path: path.to_path_buf(),
            expected: expected.to_ascii_lowercase(),
            actual,
        });
    }
    tracing::debug!(path = %path.display(), "Package hash verified");
    Ok(true)
}
