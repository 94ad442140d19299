// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Advisory run lock
//!
//! Two provisioning runs against the same root would read the same registry
//! and allocate the same port. Runs therefore hold an exclusive `flock` on
//! `{root}/.tenancy.lock` from the registry read until the last write.
//! The lock is released when the guard is dropped, or by the kernel when the
//! process dies.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::domain::provisioning::ProvisionError;

/// RAII guard for the provisioning lock.
#[derive(Debug)]
pub struct ProvisionLock {
    path: PathBuf,
    // Held for its file descriptor; closing it releases the flock.
    _file: File,
}

impl ProvisionLock {
    /// Take the lock, waiting for a concurrent run to finish if necessary.
    pub fn acquire(path: &Path) -> Result<Self, ProvisionError> {
        let file = open_lock_file(path)?;

        if !try_flock_exclusive(&file).map_err(|e| ProvisionError::io(path, e))? {
            warn!(lock = %path.display(), "Another provisioning run holds the lock, waiting");
            flock_exclusive(&file).map_err(|e| ProvisionError::io(path, e))?;
        }

        debug!(lock = %path.display(), "Provisioning lock acquired");
        Ok(Self {
            path: path.to_path_buf(),
            _file: file,
        })
    }

    /// Take the lock only if nobody else holds it.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>, ProvisionError> {
        let file = open_lock_file(path)?;
        if try_flock_exclusive(&file).map_err(|e| ProvisionError::io(path, e))? {
            Ok(Some(Self {
                path: path.to_path_buf(),
                _file: file,
            }))
        } else {
            Ok(None)
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ProvisionLock {
    fn drop(&mut self) {
        debug!(lock = %self.path.display(), "Provisioning lock released");
    }
}

fn open_lock_file(path: &Path) -> Result<File, ProvisionError> {
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .map_err(|e| ProvisionError::io(path, e))
}

/// Returns `Ok(false)` when another process already holds the lock.
fn try_flock_exclusive(file: &File) -> io::Result<bool> {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        let fd = file.as_raw_fd();
        // SAFETY: fd is a valid descriptor owned by `file` for the whole call.
        let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
        if result == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::WouldBlock || err.raw_os_error() == Some(libc::EWOULDBLOCK)
        {
            return Ok(false);
        }
        Err(err)
    }
    #[cfg(not(unix))]
    {
        let _ = file;
        Ok(true)
    }
}

fn flock_exclusive(file: &File) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        let fd = file.as_raw_fd();
        loop {
            // SAFETY: as above; blocks until the holder releases the lock.
            let result = unsafe { libc::flock(fd, libc::LOCK_EX) };
            if result == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = file;
        Ok(())
    }
}
