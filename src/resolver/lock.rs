//! Cross-process file locking around engine acquisition.
//!
//! Serialises downloads and builds into the same install directory so that
//! parallel first runs do not clobber each other's artefacts. On Unix systems
//! this uses `flock(2)` for advisory locking; elsewhere locking is a no-op.

use camino::{Utf8Path, Utf8PathBuf};
use std::fs::{File, OpenOptions};
use std::io;

#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// Name of the lock file kept inside the install directory.
const LOCK_FILE_NAME: &str = ".pg0-install.lock";

/// Guard that holds the acquisition lock until dropped.
#[derive(Debug)]
pub(crate) struct InstallLock {
    _file: File,
}

impl InstallLock {
    /// Blocks until the exclusive acquisition lock for `install_dir` is held.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file cannot be created or locked.
    #[cfg(unix)]
    pub(crate) fn acquire(install_dir: &Utf8Path) -> io::Result<Self> {
        let file = open_lock_file(install_dir)?;

        // SAFETY: The file descriptor obtained from `file.as_raw_fd()` is valid
        // because `file` was opened via `OpenOptions::open` and remains owned by
        // this scope until after the `flock` call completes.
        let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
        if result != 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self { _file: file })
    }

    /// Opens the lock file without locking on non-Unix platforms.
    #[cfg(not(unix))]
    pub(crate) fn acquire(install_dir: &Utf8Path) -> io::Result<Self> {
        let file = open_lock_file(install_dir)?;
        Ok(Self { _file: file })
    }
}

fn lock_path(install_dir: &Utf8Path) -> Utf8PathBuf {
    install_dir.join(LOCK_FILE_NAME)
}

fn open_lock_file(install_dir: &Utf8Path) -> io::Result<File> {
    std::fs::create_dir_all(install_dir)?;
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path(install_dir))
}
