// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Change detection fingerprints.
//!
//! A __fingerprint__ is the value recorded in a manifest entry that lets the
//! sync engine decide whether a source file changed since it was last copied.
//! Pbk writes content hashes only. Modification times are still understood
//! when reading manifests produced by older releases, but they never match a
//! freshly computed hash, so such entries are recopied once and upgraded.

use sha2::{Digest, Sha256};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::File,
    io::{self, Read},
    path::Path,
};

/// Recorded fingerprint of a synchronized file.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum Fingerprint {
    /// Entry carries no fingerprint at all.
    #[default]
    None,

    /// Source modification time in milliseconds since the Unix epoch.
    ModTime(i64),

    /// Hex encoded SHA-256 digest of the full file content.
    ContentHash(String),
}

impl Fingerprint {
    /// Compute content hash of file at target path.
    ///
    /// Streams the file through SHA-256 so large files are never held in
    /// memory all at once.
    ///
    /// # Errors
    ///
    /// - Return [`io::Error`] if the file cannot be opened or read.
    pub fn of_file(path: impl AsRef<Path>) -> io::Result<Self> {
        let mut file = File::open(path.as_ref())?;
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; 8192];

        loop {
            let count = file.read(&mut buffer)?;
            if count == 0 {
                break;
            }
            hasher.update(&buffer[..count]);
        }

        Ok(Self::ContentHash(hex::encode(hasher.finalize())))
    }

    /// Compute content hash of in-memory bytes.
    pub fn of_bytes(bytes: impl AsRef<[u8]>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes.as_ref());
        Self::ContentHash(hex::encode(hasher.finalize()))
    }

    /// Check if recorded fingerprint proves the file is unchanged.
    ///
    /// Only two equal content hashes match. A missing fingerprint or a
    /// modification time is always treated as stale.
    pub fn matches(&self, current: &Fingerprint) -> bool {
        match (self, current) {
            (Self::ContentHash(recorded), Self::ContentHash(current)) => recorded == current,
            (Self::None, _) | (Self::ModTime(_), _) | (Self::ContentHash(_), _) => false,
        }
    }

    /// Hex digest if fingerprint is a content hash.
    pub fn content_hash(&self) -> Option<&str> {
        match self {
            Self::ContentHash(hash) => Some(hash.as_str()),
            _ => None,
        }
    }

    /// Modification time if fingerprint is one.
    pub fn mod_time(&self) -> Option<i64> {
        match self {
            Self::ModTime(millis) => Some(*millis),
            _ => None,
        }
    }
}

impl Display for Fingerprint {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::None => fmt.write_str("<none>"),
            Self::ModTime(millis) => write!(fmt, "mtime:{millis}"),
            Self::ContentHash(hash) => write!(fmt, "sha256:{hash}"),
        }
    }
}
