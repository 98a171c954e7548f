// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! SHA-256 content digests.
//!
//! Manifest entries record the lowercase hex SHA-256 digest of a file's
//! content with no prefix, which keeps manifests written by older releases
//! readable.

use sha2::{Digest, Sha256};
use std::{fs, io, path::Path};

/// Compute lowercase hex SHA-256 digest of byte content.
pub fn sha256_hex(content: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_ref());
    format!("{:x}", hasher.finalize())
}

/// Compute lowercase hex SHA-256 digest of a file's content.
///
/// # Errors
///
/// - Return [`io::Error`] if the file cannot be read.
pub fn sha256_file(path: impl AsRef<Path>) -> io::Result<String> {
    fs::read(path.as_ref()).map(sha256_hex)
}
