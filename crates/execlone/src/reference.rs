//! Self-referential descriptor paths
//!
//! A path under `/proc/self/fd` names an open descriptor of the process that
//! resolves it. This is how a sealed memfd is handed to anything that
//! expects an executable path.

use std::os::fd::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

/// Directory through which a process sees its own descriptor table
pub const SELF_FD_DIR: &str = "/proc/self/fd";

/// Build the `/proc/self/fd/<N>` path for a descriptor.
///
/// Pure string construction: no syscall is made and the descriptor is not
/// checked for liveness.
#[must_use]
pub fn reference_for<F: AsRawFd + ?Sized>(fd: &F) -> PathBuf {
    Path::new(SELF_FD_DIR).join(fd.as_raw_fd().to_string())
}

/// Recover the descriptor number from a path built by [`reference_for`].
#[must_use]
pub fn descriptor_of(reference: &Path) -> Option<RawFd> {
    let name = reference.strip_prefix(SELF_FD_DIR).ok()?;
    let name = name.to_str()?;
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}
