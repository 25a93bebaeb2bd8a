//! Error types for the execlone library

use nix::errno::Errno;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Kernel-level failures of the anonymous sealed file.
///
/// Every variant that touches a specific memfd carries the tag it was
/// created with, so failures can be matched to `/proc/<pid>/fd` listings.
#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("memfd_create {tag}: {source}")]
    Create {
        tag: String,
        #[source]
        source: Errno,
    },

    #[error("memfd tag {tag:?} contains a NUL byte")]
    InvalidTag { tag: String },

    #[error("memfd sealing {tag}: {source}")]
    Seal {
        tag: String,
        #[source]
        source: Errno,
    },

    #[error("Failed to read seals: {0}")]
    QuerySeals(#[source] Errno),

    #[error("Failed to update descriptor flags: {0}")]
    DescriptorFlags(#[source] Errno),
}

/// The step of the clone pipeline a [`CloneError`] was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClonePhase {
    Open,
    Stat,
    Validate,
    Allocate,
    Copy,
    Chmod,
    Seal,
    Inspect,
    Verify,
}

impl fmt::Display for ClonePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClonePhase::Open => "open",
            ClonePhase::Stat => "stat",
            ClonePhase::Validate => "validate",
            ClonePhase::Allocate => "allocate",
            ClonePhase::Copy => "copy",
            ClonePhase::Chmod => "chmod",
            ClonePhase::Seal => "seal",
            ClonePhase::Inspect => "inspect",
            ClonePhase::Verify => "verify",
        };
        f.write_str(name)
    }
}

/// Classification of a filesystem entry, used to explain rejected sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Regular,
    Directory,
    Symlink,
    CharDevice,
    BlockDevice,
    Fifo,
    Socket,
    Unknown,
}

impl From<std::fs::FileType> for FileKind {
    fn from(ft: std::fs::FileType) -> Self {
        use std::os::unix::fs::FileTypeExt;

        if ft.is_file() {
            FileKind::Regular
        } else if ft.is_dir() {
            FileKind::Directory
        } else if ft.is_symlink() {
            FileKind::Symlink
        } else if ft.is_char_device() {
            FileKind::CharDevice
        } else if ft.is_block_device() {
            FileKind::BlockDevice
        } else if ft.is_fifo() {
            FileKind::Fifo
        } else if ft.is_socket() {
            FileKind::Socket
        } else {
            FileKind::Unknown
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileKind::Regular => "regular file",
            FileKind::Directory => "directory",
            FileKind::Symlink => "symlink",
            FileKind::CharDevice => "character device",
            FileKind::BlockDevice => "block device",
            FileKind::Fifo => "fifo",
            FileKind::Socket => "socket",
            FileKind::Unknown => "unknown file type",
        };
        f.write_str(name)
    }
}

/// Errors raised while cloning a binary into a sealed memfd
#[derive(Error, Debug)]
pub enum CloneError {
    #[error("Failed to open clone-from binary {path}: {source}")]
    SourceOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to stat clone-from binary {path}: {source}")]
    SourceStat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Clone-from binary {path} is not a regular file (found {kind})")]
    NotRegularFile { path: PathBuf, kind: FileKind },

    #[error("Failed to create clone-to binary: {0}")]
    Allocate(#[source] ResourceError),

    #[error("Failed to copy binary {path}: {source}")]
    Copy {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to make clone-to binary {tag} executable: {source}")]
    Chmod {
        tag: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to seal binary copy: {0}")]
    Seal(#[source] ResourceError),

    #[error("Failed to inspect seals: {0}")]
    Inspect(#[source] ResourceError),

    #[error("Failed to read back {path} for verification: {source}")]
    Verify {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CloneError {
    /// The pipeline step that failed.
    #[must_use]
    pub fn phase(&self) -> ClonePhase {
        match self {
            CloneError::SourceOpen { .. } => ClonePhase::Open,
            CloneError::SourceStat { .. } => ClonePhase::Stat,
            CloneError::NotRegularFile { .. } => ClonePhase::Validate,
            CloneError::Allocate(_) => ClonePhase::Allocate,
            CloneError::Copy { .. } => ClonePhase::Copy,
            CloneError::Chmod { .. } => ClonePhase::Chmod,
            CloneError::Seal(_) => ClonePhase::Seal,
            CloneError::Inspect(_) => ClonePhase::Inspect,
            CloneError::Verify { .. } => ClonePhase::Verify,
        }
    }
}

/// Result type alias for execlone operations
pub type Result<T> = std::result::Result<T, CloneError>;
