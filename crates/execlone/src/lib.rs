//! execlone - sealed in-memory clones of executables
//!
//! A container runtime that re-executes its own launcher binary inside a
//! container must not expose the host's binary through `/proc/self/exe`. A
//! process in the container could otherwise open that path and overwrite the
//! host binary.
//!
//! This library copies a binary into an anonymous memory-backed file
//! (`memfd_create(2)`), makes it executable, and seals it so that nobody can
//! shrink, grow, write or reseal it. The caller receives a
//! `/proc/self/fd/<N>` path that can be exec'd like any other executable.
//!
//! # Overview
//!
//! execlone is a mechanism, not a policy: it never decides when to clone and
//! keeps no global state. Each call allocates and seals its own copy.
//!
//! # Example
//!
//! ```no_run
//! use execlone::clone_binary;
//!
//! fn main() -> execlone::Result<()> {
//!     let clone = clone_binary("/usr/local/bin/launcher")?;
//!     assert!(clone.seals().map(|s| s.is_immutable()).unwrap_or(false));
//!
//!     // Keep the descriptor open for the rest of the process
//!     let exe = clone.into_reference();
//!     println!("exec {}", exe.display());
//!     Ok(())
//! }
//! ```
//!
//! # Platform Support
//!
//! Linux 3.17+ (memfd_create and file sealing). Use [`support_info`] to check.

#[cfg(not(target_os = "linux"))]
compile_error!("execlone requires Linux: memfd_create and file sealing are Linux-only");

pub mod cloner;
pub mod error;
pub mod handle;
pub mod memfd;
pub mod reference;
pub mod report;
pub mod seals;
pub mod support;

// Re-exports for convenience
pub use cloner::{clone_binary, clone_self, is_self_cloned, BinaryCloner, CLONE_MODE, SELF_EXE};
pub use error::{CloneError, ClonePhase, FileKind, ResourceError, Result};
pub use handle::ClonedBinary;
pub use memfd::{AnonymousFile, KernelBackend, SealBackend};
pub use reference::{descriptor_of, reference_for};
pub use report::{CloneReport, ContentDigest, SealReport};
pub use seals::{is_immutable, seals_of, SealSet};
pub use support::{support_info, SupportInfo};
