//! File seal sets and seal inspection
//!
//! Seals are irrevocable restrictions on a memfd. The kernel applies a set
//! passed to `F_ADD_SEALS` in one step, so a request either takes effect in
//! full or not at all.

use crate::error::ResourceError;
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, SealFlag};
use std::fmt;
use std::ops::BitOr;
use std::os::fd::{AsFd, AsRawFd};

// linux: include/uapi/linux/fcntl.h, not exported by every libc release
const F_SEAL_EXEC: libc::c_int = 0x0020;

/// A set of memfd seals as reported by `F_GET_SEALS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SealSet(libc::c_int);

impl SealSet {
    /// Forbid further seal changes
    pub const SEAL: SealSet = SealSet(libc::F_SEAL_SEAL);
    /// Forbid shrinking the file
    pub const SHRINK: SealSet = SealSet(libc::F_SEAL_SHRINK);
    /// Forbid growing the file
    pub const GROW: SealSet = SealSet(libc::F_SEAL_GROW);
    /// Forbid writes, including through shared writable mappings
    pub const WRITE: SealSet = SealSet(libc::F_SEAL_WRITE);
    /// Forbid new writable mappings and writes
    pub const FUTURE_WRITE: SealSet = SealSet(libc::F_SEAL_FUTURE_WRITE);
    /// Forbid changes to the executable permission bits
    pub const EXEC: SealSet = SealSet(F_SEAL_EXEC);

    /// The seals that make a file permanently immutable.
    pub const IMMUTABLE: SealSet = SealSet(
        libc::F_SEAL_SHRINK | libc::F_SEAL_GROW | libc::F_SEAL_WRITE | libc::F_SEAL_SEAL,
    );

    const NAMED: [(SealSet, &'static str); 6] = [
        (SealSet::SHRINK, "shrink"),
        (SealSet::GROW, "grow"),
        (SealSet::WRITE, "write"),
        (SealSet::SEAL, "seal"),
        (SealSet::FUTURE_WRITE, "future-write"),
        (SealSet::EXEC, "exec"),
    ];

    #[must_use]
    pub const fn empty() -> SealSet {
        SealSet(0)
    }

    /// Wrap the raw value returned by `F_GET_SEALS`.
    #[must_use]
    pub const fn from_bits(bits: libc::c_int) -> SealSet {
        SealSet(bits)
    }

    #[must_use]
    pub const fn bits(self) -> libc::c_int {
        self.0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn contains(self, other: SealSet) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when no process can shrink, grow, write or reseal the file.
    #[must_use]
    pub const fn is_immutable(self) -> bool {
        self.contains(SealSet::IMMUTABLE)
    }

    /// Human-readable names of the seals in this set.
    #[must_use]
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMED
            .iter()
            .filter(|(seal, _)| self.contains(*seal))
            .map(|(_, name)| *name)
            .collect()
    }

    pub(crate) fn to_nix(self) -> SealFlag {
        SealFlag::from_bits_retain(self.0)
    }
}

impl BitOr for SealSet {
    type Output = SealSet;

    fn bitor(self, rhs: SealSet) -> SealSet {
        SealSet(self.0 | rhs.0)
    }
}

impl fmt::Display for SealSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        f.write_str(&self.names().join(","))
    }
}

/// Read the seals of any descriptor.
///
/// Returns `Ok(None)` when the descriptor does not support sealing at all,
/// which is the case for files on ordinary filesystems.
pub fn seals_of<F: AsFd>(fd: F) -> Result<Option<SealSet>, ResourceError> {
    match fcntl(fd.as_fd().as_raw_fd(), FcntlArg::F_GET_SEALS) {
        Ok(bits) => Ok(Some(SealSet::from_bits(bits))),
        Err(Errno::EINVAL) => Ok(None),
        Err(e) => Err(ResourceError::QuerySeals(e)),
    }
}

/// True if the descriptor carries the full immutability seal set.
pub fn is_immutable<F: AsFd>(fd: F) -> Result<bool, ResourceError> {
    Ok(seals_of(fd)?.is_some_and(SealSet::is_immutable))
}
