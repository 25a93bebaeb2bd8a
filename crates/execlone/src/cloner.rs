//! Cloning a binary into a sealed memfd
//!
//! The pipeline is strictly linear:
//! open → stat → validate → allocate → copy → chmod → seal → return.
//! Any failure aborts the call. The source is always closed, and the memfd
//! is closed unless the call returns successfully. An unsealed copy is never
//! handed out.

use crate::error::{CloneError, FileKind, Result};
use crate::handle::ClonedBinary;
use crate::memfd::{AnonymousFile, KernelBackend, SealBackend};
use crate::seals::is_immutable;
use std::fs::{File, OpenOptions, Permissions};
use std::io::{self, Seek, SeekFrom};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::Path;
use tracing::{debug, info};

/// Path through which a process opens its own executable
pub const SELF_EXE: &str = "/proc/self/exe";

/// Mode given to every clone, regardless of the source's own bits.
pub const CLONE_MODE: u32 = 0o777;

/// Clones binaries into sealed anonymous files.
///
/// Stateless apart from the backend: concurrent calls never share a memfd.
#[derive(Debug, Clone, Default)]
pub struct BinaryCloner<B = KernelBackend> {
    backend: B,
}

impl BinaryCloner<KernelBackend> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            backend: KernelBackend,
        }
    }
}

impl<B: SealBackend> BinaryCloner<B> {
    /// Use a custom backend for allocation and sealing.
    #[must_use]
    pub fn with_backend(backend: B) -> Self {
        Self { backend }
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Copy `source` into a sealed, executable memfd.
    ///
    /// # Errors
    ///
    /// Fails closed: every error means no reference exists and the anonymous
    /// file, if one was allocated, has been closed.
    pub fn clone_binary<P: AsRef<Path>>(&self, source: P) -> Result<ClonedBinary> {
        let source = source.as_ref();

        let mut binary = open_source(source)?;

        let metadata = binary.metadata().map_err(|e| CloneError::SourceStat {
            path: source.to_path_buf(),
            source: e,
        })?;

        let kind = FileKind::from(metadata.file_type());
        if kind != FileKind::Regular {
            return Err(CloneError::NotRegularFile {
                path: source.to_path_buf(),
                kind,
            });
        }
        debug!(
            "Cloning {} ({} bytes, mode {:o})",
            source.display(),
            metadata.len(),
            metadata.permissions().mode() & 0o7777
        );

        let tag = source.to_string_lossy();
        let memfd = self.backend.create(&tag).map_err(CloneError::Allocate)?;

        let copied = copy_into(&mut binary, &memfd).map_err(|e| CloneError::Copy {
            path: source.to_path_buf(),
            source: e,
        })?;
        drop(binary);
        debug!("Copied {} bytes into memfd {}", copied, memfd.tag());

        memfd
            .as_file()
            .set_permissions(Permissions::from_mode(CLONE_MODE))
            .map_err(|e| CloneError::Chmod {
                tag: memfd.tag().to_string(),
                source: e,
            })?;

        self.backend.seal(&memfd).map_err(CloneError::Seal)?;

        let cloned = ClonedBinary::new(memfd.into_file(), copied);
        info!(
            "Cloned {} into sealed memfd at {}",
            source.display(),
            cloned.path().display()
        );
        Ok(cloned)
    }

    /// Clone the running executable through `/proc/self/exe`.
    pub fn clone_self(&self) -> Result<ClonedBinary> {
        self.clone_binary(SELF_EXE)
    }
}

/// Clone `source` with the kernel backend.
///
/// See [`BinaryCloner::clone_binary`].
pub fn clone_binary<P: AsRef<Path>>(source: P) -> Result<ClonedBinary> {
    BinaryCloner::new().clone_binary(source)
}

/// Clone the running executable with the kernel backend.
pub fn clone_self() -> Result<ClonedBinary> {
    BinaryCloner::new().clone_self()
}

/// Whether the running executable is already a fully sealed memfd.
///
/// A launcher that re-executes itself from a clone can use this to avoid
/// cloning a second time.
pub fn is_self_cloned() -> Result<bool> {
    let exe = File::open(SELF_EXE).map_err(|e| CloneError::SourceOpen {
        path: SELF_EXE.into(),
        source: e,
    })?;
    is_immutable(&exe).map_err(CloneError::Inspect)
}

fn open_source(path: &Path) -> Result<File> {
    // O_NONBLOCK keeps a FIFO without writers from blocking the open; it has
    // no effect on reads from regular files.
    let opened = OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path);

    match opened {
        Ok(file) => Ok(file),
        Err(e) => {
            // Sockets cannot be opened at all; report them by type
            if let Ok(meta) = std::fs::metadata(path) {
                let kind = FileKind::from(meta.file_type());
                if kind != FileKind::Regular {
                    return Err(CloneError::NotRegularFile {
                        path: path.to_path_buf(),
                        kind,
                    });
                }
            }
            Err(CloneError::SourceOpen {
                path: path.to_path_buf(),
                source: e,
            })
        }
    }
}

fn copy_into(source: &mut File, memfd: &AnonymousFile) -> io::Result<u64> {
    let mut dest = memfd.as_file();
    let copied = io::copy(source, &mut dest)?;
    dest.seek(SeekFrom::Start(0))?;
    Ok(copied)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::{ClonePhase, ResourceError};
    use crate::reference::descriptor_of;
    use crate::seals::SealSet;
    use std::fs;
    use std::io::{Read, Write};
    use std::os::fd::{AsFd, AsRawFd, OwnedFd};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Kernel backend that records how many files it allocated.
    #[derive(Default)]
    struct CountingBackend {
        created: AtomicUsize,
    }

    impl SealBackend for CountingBackend {
        fn create(&self, tag: &str) -> std::result::Result<AnonymousFile, ResourceError> {
            self.created.fetch_add(1, Ordering::SeqCst);
            KernelBackend.create(tag)
        }

        fn seal(&self, file: &AnonymousFile) -> std::result::Result<(), ResourceError> {
            KernelBackend.seal(file)
        }
    }

    /// Backend whose seal request is always rejected, keeping a duplicate of
    /// the descriptor so the test can look at the file afterwards.
    #[derive(Default)]
    struct RejectingBackend {
        kept: Mutex<Option<OwnedFd>>,
    }

    impl SealBackend for RejectingBackend {
        fn create(&self, tag: &str) -> std::result::Result<AnonymousFile, ResourceError> {
            let memfd = KernelBackend.create(tag)?;
            let dup = memfd.as_fd().try_clone_to_owned().unwrap();
            *self.kept.lock().unwrap() = Some(dup);
            Ok(memfd)
        }

        fn seal(&self, file: &AnonymousFile) -> std::result::Result<(), ResourceError> {
            Err(ResourceError::Seal {
                tag: file.tag().to_string(),
                source: nix::errno::Errno::EPERM,
            })
        }
    }

    /// Backend that overwrites the copy of the first file it seals.
    #[derive(Default)]
    struct TamperingBackend {
        sealed: AtomicUsize,
    }

    impl SealBackend for TamperingBackend {
        fn create(&self, tag: &str) -> std::result::Result<AnonymousFile, ResourceError> {
            KernelBackend.create(tag)
        }

        fn seal(&self, file: &AnonymousFile) -> std::result::Result<(), ResourceError> {
            if self.sealed.fetch_add(1, Ordering::SeqCst) == 0 {
                use std::os::unix::fs::FileExt;
                file.as_file().write_all_at(b"XXXX", 0).unwrap();
            }
            KernelBackend.seal(file)
        }
    }

    /// Backend that hands out memfds already carrying `seals`.
    struct PreSealedBackend {
        seals: SealSet,
    }

    impl SealBackend for PreSealedBackend {
        fn create(&self, tag: &str) -> std::result::Result<AnonymousFile, ResourceError> {
            let memfd = KernelBackend.create(tag)?;
            add_seals(&memfd, self.seals).unwrap();
            Ok(memfd)
        }

        fn seal(&self, file: &AnonymousFile) -> std::result::Result<(), ResourceError> {
            KernelBackend.seal(file)
        }
    }

    /// Backend that hands out non-executable memfds whose exec bits are
    /// sealed, as `vm.memfd_noexec=1` does for memfds created without
    /// `MFD_EXEC`.
    struct ExecLockedBackend;

    impl SealBackend for ExecLockedBackend {
        fn create(&self, tag: &str) -> std::result::Result<AnonymousFile, ResourceError> {
            let memfd = KernelBackend.create(tag)?;
            memfd
                .as_file()
                .set_permissions(Permissions::from_mode(0o666))
                .unwrap();
            add_seals(&memfd, SealSet::EXEC).unwrap();
            Ok(memfd)
        }

        fn seal(&self, file: &AnonymousFile) -> std::result::Result<(), ResourceError> {
            KernelBackend.seal(file)
        }
    }

    fn add_seals(memfd: &AnonymousFile, seals: SealSet) -> nix::Result<libc::c_int> {
        use nix::fcntl::{fcntl, FcntlArg};

        fcntl(memfd.as_raw_fd(), FcntlArg::F_ADD_SEALS(seals.to_nix()))
    }

    /// F_SEAL_EXEC arrived in Linux 6.3.
    fn exec_seal_supported() -> bool {
        let memfd = KernelBackend.create("execlone-exec-seal").unwrap();
        add_seals(&memfd, SealSet::EXEC).is_ok()
    }

    /// Memfds of this process whose name starts with `tag`.
    fn open_memfds(tag: &str) -> usize {
        let prefix = format!("/memfd:{tag}");
        fs::read_dir("/proc/self/fd")
            .unwrap()
            .filter_map(|entry| fs::read_link(entry.ok()?.path()).ok())
            .filter(|target| target.to_string_lossy().starts_with(&prefix))
            .count()
    }

    fn write_source(dir: &Path, name: &str, content: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        fs::set_permissions(&path, Permissions::from_mode(0o640)).unwrap();
        path
    }

    fn sample_binary() -> Vec<u8> {
        let mut content = b"\x7fELF\x02\x01\x01\0".to_vec();
        content.extend((0..64 * 1024).map(|i| (i % 251) as u8));
        content.extend_from_slice(b"\r\n\r\n\0trailing");
        content
    }

    #[test]
    fn test_clone_matches_source_bytes() {
        let dir = tempdir().unwrap();
        let content = sample_binary();
        let source = write_source(dir.path(), "launcher", &content);

        let clone = clone_binary(&source).unwrap();

        assert_eq!(clone.size(), content.len() as u64);
        assert_eq!(fs::read(clone.path()).unwrap(), content);
    }

    #[test]
    fn test_clone_handle_reads_from_start() {
        let dir = tempdir().unwrap();
        let source = write_source(dir.path(), "launcher", b"from the top");

        let clone = clone_binary(&source).unwrap();
        let mut file = clone.into_file();
        let mut buf = String::new();
        file.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "from the top");
    }

    #[test]
    fn test_clone_of_empty_file() {
        let dir = tempdir().unwrap();
        let source = write_source(dir.path(), "empty", b"");

        let clone = clone_binary(&source).unwrap();
        assert_eq!(clone.size(), 0);
        assert!(clone.seals().unwrap().is_immutable());
        assert!(fs::read(clone.path()).unwrap().is_empty());
    }

    #[test]
    fn test_clone_is_sealed_against_mutation() {
        let dir = tempdir().unwrap();
        let source = write_source(dir.path(), "launcher", b"immutable bytes");

        let clone = clone_binary(&source).unwrap();
        assert!(clone.seals().unwrap().contains(SealSet::IMMUTABLE));

        let mut file = File::from(clone.as_fd().try_clone_to_owned().unwrap());
        assert!(file.write_all(b"evil").is_err(), "write must fail");
        assert!(file.set_len(3).is_err(), "truncate must fail");
        assert!(file.set_len(1 << 20).is_err(), "grow must fail");

        assert_eq!(fs::read(clone.path()).unwrap(), b"immutable bytes");
    }

    #[test]
    fn test_clone_is_world_executable() {
        let dir = tempdir().unwrap();
        let source = write_source(dir.path(), "launcher", b"#!/bin/true\n");

        let clone = clone_binary(&source).unwrap();
        let mode = fs::metadata(clone.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, CLONE_MODE);
    }

    #[test]
    fn test_clone_can_be_executed() {
        let Some(truth) = ["/bin/true", "/usr/bin/true"]
            .into_iter()
            .map(Path::new)
            .find(|p| p.is_file())
        else {
            return;
        };

        let clone = clone_binary(truth).unwrap();
        let status = std::process::Command::new(clone.path()).status().unwrap();
        assert!(status.success());
    }

    #[test]
    fn test_source_is_left_untouched() {
        let dir = tempdir().unwrap();
        let source = write_source(dir.path(), "launcher", b"original");

        let _clone = clone_binary(&source).unwrap();

        let meta = fs::metadata(&source).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o640);
        assert_eq!(fs::read(&source).unwrap(), b"original");
    }

    #[test]
    fn test_reference_names_clone_descriptor() {
        let dir = tempdir().unwrap();
        let source = write_source(dir.path(), "launcher", b"ref");

        let clone = clone_binary(&source).unwrap();
        assert_eq!(descriptor_of(clone.path()), Some(clone.as_raw_fd()));
    }

    #[test]
    fn test_missing_source_allocates_nothing() {
        let dir = tempdir().unwrap();
        let cloner = BinaryCloner::with_backend(CountingBackend::default());

        let err = cloner
            .clone_binary(dir.path().join("does-not-exist"))
            .unwrap_err();

        assert_eq!(err.phase(), ClonePhase::Open);
        assert!(matches!(err, CloneError::SourceOpen { .. }));
        assert_eq!(cloner.backend().created.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_directory_is_rejected_before_allocation() {
        let dir = tempdir().unwrap();
        let cloner = BinaryCloner::with_backend(CountingBackend::default());

        let err = cloner.clone_binary(dir.path()).unwrap_err();

        assert!(matches!(
            err,
            CloneError::NotRegularFile {
                kind: FileKind::Directory,
                ..
            }
        ));
        assert_eq!(cloner.backend().created.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_fifo_is_rejected_without_blocking() {
        let dir = tempdir().unwrap();
        let fifo = dir.path().join("pipe");
        nix::unistd::mkfifo(&fifo, nix::sys::stat::Mode::S_IRWXU).unwrap();
        let cloner = BinaryCloner::with_backend(CountingBackend::default());

        let err = cloner.clone_binary(&fifo).unwrap_err();

        assert!(matches!(
            err,
            CloneError::NotRegularFile {
                kind: FileKind::Fifo,
                ..
            }
        ));
        assert_eq!(cloner.backend().created.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_socket_is_rejected_before_allocation() {
        let dir = tempdir().unwrap();
        let sock = dir.path().join("sock");
        let _listener = std::os::unix::net::UnixListener::bind(&sock).unwrap();
        let cloner = BinaryCloner::with_backend(CountingBackend::default());

        let err = cloner.clone_binary(&sock).unwrap_err();

        assert_eq!(err.phase(), ClonePhase::Validate);
        assert!(matches!(
            err,
            CloneError::NotRegularFile {
                kind: FileKind::Socket,
                ..
            }
        ));
        assert_eq!(cloner.backend().created.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_char_device_is_rejected() {
        let err = clone_binary("/dev/null").unwrap_err();
        assert!(matches!(
            err,
            CloneError::NotRegularFile {
                kind: FileKind::CharDevice,
                ..
            }
        ));
    }

    #[test]
    fn test_symlink_to_regular_file_is_followed() {
        let dir = tempdir().unwrap();
        let target = write_source(dir.path(), "real", b"via link");
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let clone = clone_binary(&link).unwrap();
        assert_eq!(fs::read(clone.path()).unwrap(), b"via link");
    }

    #[test]
    fn test_dangling_symlink_fails_to_open() {
        let dir = tempdir().unwrap();
        let link = dir.path().join("dangling");
        std::os::unix::fs::symlink(dir.path().join("gone"), &link).unwrap();

        let err = clone_binary(&link).unwrap_err();
        assert!(matches!(err, CloneError::SourceOpen { .. }));
    }

    #[test]
    fn test_seal_failure_returns_no_reference() {
        let dir = tempdir().unwrap();
        let source = write_source(dir.path(), "launcher", b"never exposed");
        let cloner = BinaryCloner::with_backend(RejectingBackend::default());

        let err = cloner.clone_binary(&source).unwrap_err();
        assert_eq!(err.phase(), ClonePhase::Seal);
        assert!(err.to_string().contains("seal"));

        let kept = cloner.backend().kept.lock().unwrap().take().unwrap();
        let file = File::from(kept);
        let seals = crate::seals::seals_of(&file).unwrap().unwrap();
        assert!(seals.is_empty(), "rejected seal must leave no seals behind");
    }

    #[test]
    fn test_copy_failure_releases_memfd() {
        let dir = tempdir().unwrap();
        let source = write_source(dir.path(), "launcher", b"does not fit");
        let tag = source.to_string_lossy().into_owned();
        let cloner = BinaryCloner::with_backend(PreSealedBackend {
            seals: SealSet::GROW,
        });

        let err = cloner.clone_binary(&source).unwrap_err();
        assert_eq!(err.phase(), ClonePhase::Copy);
        assert!(err.to_string().contains(&tag));
        assert_eq!(open_memfds(&tag), 0, "failed copy must close the memfd");
    }

    #[test]
    fn test_chmod_failure_releases_memfd() {
        if !exec_seal_supported() {
            return;
        }
        let dir = tempdir().unwrap();
        let source = write_source(dir.path(), "launcher", b"never executable");
        let tag = source.to_string_lossy().into_owned();
        let cloner = BinaryCloner::with_backend(ExecLockedBackend);

        let err = cloner.clone_binary(&source).unwrap_err();
        assert_eq!(err.phase(), ClonePhase::Chmod);
        match &err {
            CloneError::Chmod { tag: reported, source } => {
                assert_eq!(reported, &tag);
                assert_eq!(source.raw_os_error(), Some(libc::EPERM));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(open_memfds(&tag), 0, "failed chmod must close the memfd");
    }

    #[test]
    fn test_successful_clone_holds_one_memfd() {
        let dir = tempdir().unwrap();
        let source = write_source(dir.path(), "launcher", b"held");
        let tag = source.to_string_lossy().into_owned();

        let clone = clone_binary(&source).unwrap();
        assert_eq!(open_memfds(&tag), 1);
        drop(clone);
        assert_eq!(open_memfds(&tag), 0);
    }

    #[test]
    fn test_concurrent_clones_are_independent() {
        let dir = tempdir().unwrap();
        let source = write_source(dir.path(), "launcher", b"shared source bytes");
        let cloner = BinaryCloner::with_backend(TamperingBackend::default());

        let (a, b) = std::thread::scope(|s| {
            let first = s.spawn(|| cloner.clone_binary(&source).unwrap());
            let second = s.spawn(|| cloner.clone_binary(&source).unwrap());
            (first.join().unwrap(), second.join().unwrap())
        });

        assert_ne!(a.as_raw_fd(), b.as_raw_fd());
        assert_ne!(a.path(), b.path());

        let contents = [fs::read(a.path()).unwrap(), fs::read(b.path()).unwrap()];
        let tampered = contents
            .iter()
            .filter(|c| c.as_slice() == b"XXXXed source bytes")
            .count();
        let pristine = contents
            .iter()
            .filter(|c| c.as_slice() == b"shared source bytes")
            .count();
        assert_eq!((tampered, pristine), (1, 1));
    }

    #[test]
    fn test_clone_self() {
        let clone = clone_self().unwrap();
        let exe = fs::read(SELF_EXE).unwrap();
        assert_eq!(fs::read(clone.path()).unwrap(), exe);
        assert!(clone.seals().unwrap().is_immutable());
    }

    #[test]
    fn test_test_binary_is_not_a_clone() {
        assert!(!is_self_cloned().unwrap());
    }
}
