//! Clone verification and seal reports
//!
//! Captures what a clone contains and how it is protected, for diagnostics.
//! Digests are computed by streaming both files, so large binaries are never
//! held in memory.

use crate::error::{CloneError, FileKind, Result};
use crate::handle::ClonedBinary;
use crate::seals::{seals_of, SealSet};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Read;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

const HASH_BUFFER_SIZE: usize = 8192;

/// SHA-256 of a file's content.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    /// Hash everything readable from `reader`.
    pub fn of_reader<R: Read>(mut reader: R) -> std::io::Result<Self> {
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; HASH_BUFFER_SIZE];
        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }
        Ok(Self(hasher.finalize().into()))
    }

    #[must_use]
    pub fn of_bytes(content: &[u8]) -> Self {
        Self(Sha256::digest(content).into())
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({})", self)
    }
}

/// Serializable summary of a clone and its source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneReport {
    /// Path the clone was made from
    pub source: PathBuf,
    /// Source size in bytes, as read back now
    pub source_size: u64,
    /// Source permission bits
    pub source_mode: u32,
    /// SHA-256 of the source, hex encoded
    pub source_sha256: String,
    /// `/proc/self/fd/<N>` reference to the clone
    pub reference: PathBuf,
    /// Clone size in bytes
    pub clone_size: u64,
    /// Clone permission bits
    pub clone_mode: u32,
    /// SHA-256 of the clone, hex encoded
    pub clone_sha256: String,
    /// Names of the seals on the clone
    pub seals: Vec<String>,
    /// Digests match and the clone is fully immutable
    pub verified: bool,
}

impl CloneReport {
    /// Re-read `source` and `clone` and describe both.
    pub fn capture(source: &Path, clone: &ClonedBinary) -> Result<Self> {
        let source_file = File::open(source).map_err(|e| CloneError::SourceOpen {
            path: source.to_path_buf(),
            source: e,
        })?;
        let source_meta = source_file
            .metadata()
            .map_err(|e| CloneError::SourceStat {
                path: source.to_path_buf(),
                source: e,
            })?;
        let source_digest =
            ContentDigest::of_reader(&source_file).map_err(|e| CloneError::Verify {
                path: source.to_path_buf(),
                source: e,
            })?;

        let clone_err = |e| CloneError::Verify {
            path: clone.path().to_path_buf(),
            source: e,
        };
        // A fresh open gets its own file offset, leaving the clone's untouched
        let clone_file = File::open(clone.path()).map_err(clone_err)?;
        let clone_meta = clone_file.metadata().map_err(clone_err)?;
        let clone_digest = ContentDigest::of_reader(&clone_file).map_err(clone_err)?;

        let seals = clone.seals().map_err(CloneError::Inspect)?;

        Ok(Self {
            source: source.to_path_buf(),
            source_size: source_meta.len(),
            source_mode: source_meta.permissions().mode() & 0o7777,
            source_sha256: source_digest.to_string(),
            reference: clone.path().to_path_buf(),
            clone_size: clone_meta.len(),
            clone_mode: clone_meta.permissions().mode() & 0o7777,
            clone_sha256: clone_digest.to_string(),
            seals: seals.names().into_iter().map(String::from).collect(),
            verified: source_digest == clone_digest && seals.is_immutable(),
        })
    }

    /// Serialize the report to pretty-printed JSON
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize a report from JSON
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Seal state of an arbitrary file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealReport {
    /// Path that was inspected
    pub path: PathBuf,
    /// File type of the resolved path
    pub kind: String,
    /// Size in bytes
    pub size: u64,
    /// Permission bits
    pub mode: u32,
    /// Whether the file answers `F_GET_SEALS` at all
    pub sealable: bool,
    /// Names of the seals present
    pub seals: Vec<String>,
    /// All four immutability seals are present
    pub immutable: bool,
}

impl SealReport {
    /// Open `path` and read its seals.
    pub fn capture(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
            .map_err(|e| CloneError::SourceOpen {
                path: path.to_path_buf(),
                source: e,
            })?;
        let meta = file.metadata().map_err(|e| CloneError::SourceStat {
            path: path.to_path_buf(),
            source: e,
        })?;
        let seals = seals_of(&file).map_err(CloneError::Inspect)?;

        Ok(Self {
            path: path.to_path_buf(),
            kind: FileKind::from(meta.file_type()).to_string(),
            size: meta.len(),
            mode: meta.permissions().mode() & 0o7777,
            sealable: seals.is_some(),
            seals: seals
                .map(|s| s.names().into_iter().map(String::from).collect())
                .unwrap_or_default(),
            immutable: seals.is_some_and(SealSet::is_immutable),
        })
    }

    /// Serialize the report to pretty-printed JSON
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
