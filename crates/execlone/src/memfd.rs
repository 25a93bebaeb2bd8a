//! Anonymous sealed files backed by `memfd_create(2)`
//!
//! An [`AnonymousFile`] is a memory-backed file with no path on any mounted
//! filesystem. It is created sealable and close-on-exec, filled by its owner,
//! and then sealed with [`SealSet::IMMUTABLE`] in one `F_ADD_SEALS` request.
//!
//! The [`SealBackend`] trait is the seam between the clone pipeline and the
//! kernel. [`KernelBackend`] is the only production implementation.

use crate::error::ResourceError;
use crate::seals::{seals_of, SealSet};
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg};
use nix::sys::memfd::{memfd_create, MemFdCreateFlag};
use std::ffi::CString;
use std::fs::File;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use tracing::{debug, warn};

/// Longest name `memfd_create` accepts, excluding the NUL terminator.
///
/// The kernel limit is 255 bytes including the `memfd:` prefix it adds.
pub const MEMFD_NAME_MAX: usize = 249;

// linux: include/uapi/linux/memfd.h, kernels before 6.3 reject it with EINVAL
const MFD_EXEC: libc::c_uint = 0x0010;

/// An unnamed, memory-backed file that supports sealing.
#[derive(Debug)]
pub struct AnonymousFile {
    file: File,
    tag: String,
}

impl AnonymousFile {
    /// Allocate a new memfd with `MFD_CLOEXEC | MFD_ALLOW_SEALING`.
    ///
    /// `MFD_EXEC` is requested as well, so a `vm.memfd_noexec=1` default
    /// cannot leave the file with `F_SEAL_EXEC` and mode 0666. Kernels that
    /// predate the flag get a plain sealable memfd, which is executable there
    /// anyway.
    ///
    /// `tag` is advisory and only shows up in descriptor listings. Tags longer
    /// than [`MEMFD_NAME_MAX`] are truncated.
    pub fn create(tag: &str) -> Result<AnonymousFile, ResourceError> {
        let name = memfd_name(tag)?;
        let flags = MemFdCreateFlag::MFD_CLOEXEC | MemFdCreateFlag::MFD_ALLOW_SEALING;

        let fd = match memfd_create(
            name.as_c_str(),
            flags | MemFdCreateFlag::from_bits_retain(MFD_EXEC),
        ) {
            Err(Errno::EINVAL) => {
                debug!("MFD_EXEC not supported by this kernel, creating without it");
                memfd_create(name.as_c_str(), flags)
            }
            other => other,
        }
        .map_err(|source| ResourceError::Create {
            tag: tag.to_string(),
            source,
        })?;

        let file = File::from(fd);
        debug!("Allocated memfd {} for {}", file.as_raw_fd(), tag);

        Ok(AnonymousFile {
            file,
            tag: tag.to_string(),
        })
    }

    /// Apply the full immutability seal set in a single request.
    ///
    /// On error no seal has been applied and the file must be treated as
    /// fully mutable.
    pub fn seal(&self) -> Result<(), ResourceError> {
        fcntl(
            self.file.as_raw_fd(),
            FcntlArg::F_ADD_SEALS(SealSet::IMMUTABLE.to_nix()),
        )
        .map_err(|source| ResourceError::Seal {
            tag: self.tag.clone(),
            source,
        })?;

        debug!("Sealed memfd {} ({})", self.file.as_raw_fd(), SealSet::IMMUTABLE);
        Ok(())
    }

    /// Seals currently applied to this file.
    pub fn seals(&self) -> Result<SealSet, ResourceError> {
        // A memfd created with MFD_ALLOW_SEALING always answers F_GET_SEALS
        Ok(seals_of(&self.file)?.unwrap_or_default())
    }

    /// The tag this file was created with.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    #[must_use]
    pub fn as_file(&self) -> &File {
        &self.file
    }

    #[must_use]
    pub fn into_file(self) -> File {
        self.file
    }
}

impl AsFd for AnonymousFile {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl AsRawFd for AnonymousFile {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

/// Allocation and sealing of anonymous files.
pub trait SealBackend {
    /// Allocate a fresh, unsealed anonymous file.
    fn create(&self, tag: &str) -> Result<AnonymousFile, ResourceError>;

    /// Seal `file` with [`SealSet::IMMUTABLE`], all at once or not at all.
    fn seal(&self, file: &AnonymousFile) -> Result<(), ResourceError>;
}

/// [`SealBackend`] that talks to the kernel directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct KernelBackend;

impl SealBackend for KernelBackend {
    fn create(&self, tag: &str) -> Result<AnonymousFile, ResourceError> {
        AnonymousFile::create(tag)
    }

    fn seal(&self, file: &AnonymousFile) -> Result<(), ResourceError> {
        file.seal()
    }
}

impl<B: SealBackend + ?Sized> SealBackend for &B {
    fn create(&self, tag: &str) -> Result<AnonymousFile, ResourceError> {
        (**self).create(tag)
    }

    fn seal(&self, file: &AnonymousFile) -> Result<(), ResourceError> {
        (**self).seal(file)
    }
}

fn memfd_name(tag: &str) -> Result<CString, ResourceError> {
    let mut end = tag.len().min(MEMFD_NAME_MAX);
    while !tag.is_char_boundary(end) {
        end -= 1;
    }
    if end < tag.len() {
        warn!(
            "memfd tag truncated to {} bytes (was {} bytes)",
            end,
            tag.len()
        );
    }

    CString::new(&tag[..end]).map_err(|_| ResourceError::InvalidTag {
        tag: tag.to_string(),
    })
}
