//! The caller-owned handle to a sealed clone

use crate::error::ResourceError;
use crate::reference::reference_for;
use crate::seals::{seals_of, SealSet};
use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use std::fs::File;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, IntoRawFd, RawFd};
use std::path::{Path, PathBuf};

/// A sealed, executable in-memory copy of a binary.
///
/// Owns the memfd descriptor. Dropping the handle closes the descriptor and
/// invalidates [`ClonedBinary::path`]; use [`ClonedBinary::into_reference`]
/// to keep it open for the rest of the process.
#[derive(Debug)]
pub struct ClonedBinary {
    file: File,
    path: PathBuf,
    size: u64,
}

impl ClonedBinary {
    pub(crate) fn new(file: File, size: u64) -> ClonedBinary {
        let path = reference_for(&file);
        ClonedBinary { file, path, size }
    }

    /// The `/proc/self/fd/<N>` path naming the sealed copy.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of bytes copied from the source.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn seals(&self) -> Result<SealSet, ResourceError> {
        Ok(seals_of(&self.file)?.unwrap_or_default())
    }

    /// Control whether the descriptor stays open across `execve`.
    ///
    /// Clones are created close-on-exec. A consumer that execs some other
    /// image and expects the reference to resolve there must opt in.
    pub fn set_inherit_on_exec(&self, inherit: bool) -> Result<(), ResourceError> {
        let raw = fcntl(self.file.as_raw_fd(), FcntlArg::F_GETFD)
            .map_err(ResourceError::DescriptorFlags)?;
        let mut flags = FdFlag::from_bits_truncate(raw);
        flags.set(FdFlag::FD_CLOEXEC, !inherit);
        fcntl(self.file.as_raw_fd(), FcntlArg::F_SETFD(flags))
            .map_err(ResourceError::DescriptorFlags)?;
        Ok(())
    }

    /// Give up ownership of the descriptor and return its reference path.
    ///
    /// The descriptor is never closed by this crate afterwards; it lives
    /// until the caller closes it or the process exits.
    #[must_use]
    pub fn into_reference(self) -> PathBuf {
        let _fd = self.file.into_raw_fd();
        self.path
    }

    #[must_use]
    pub fn into_file(self) -> File {
        self.file
    }
}

impl AsFd for ClonedBinary {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl AsRawFd for ClonedBinary {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}
