//! Advisory file locks.
//!
//! A [`FileLock`] holds a shared or exclusive `flock(2)` lock on a table
//! data file for as long as it lives. Locks are advisory and only exclude
//! other nodestore handles, including handles opened by the same process.

use std::fs::File;
use std::io;

/// Lock mode requested for a table file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Any number of readers.
    Shared,
    /// One writer, no readers.
    Exclusive,
}

/// RAII guard over an advisory lock on a file.
///
/// The guard owns a duplicate of the file descriptor so that it shares the
/// lock with the original handle. Dropping the guard releases the lock.
pub struct FileLock {
    file: File,
    mode: Option<LockMode>,
}

impl FileLock {
    /// Create an unlocked guard for `file`.
    pub fn new(file: &File) -> io::Result<Self> {
        Ok(Self {
            file: file.try_clone()?,
            mode: None,
        })
    }

    /// Create a guard and try to lock `file` in `mode`.
    ///
    /// Returns `Ok(None)` if an incompatible lock is held elsewhere.
    pub fn try_lock(file: &File, mode: LockMode) -> io::Result<Option<Self>> {
        let mut lock = Self::new(file)?;
        Ok(if lock.acquire(mode)? { Some(lock) } else { None })
    }

    /// Switch to `mode` without blocking.
    ///
    /// Does nothing if the lock is already held in that mode. A conversion
    /// is not atomic: when it fails, the previous lock is gone as well and
    /// `Ok(false)` is returned.
    pub fn acquire(&mut self, mode: LockMode) -> io::Result<bool> {
        if self.mode == Some(mode) {
            return Ok(true);
        }
        self.mode = None;
        if sys::try_lock(&self.file, mode)? {
            self.mode = Some(mode);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Release the lock, keeping the guard for a later [`FileLock::acquire`].
    pub fn release(&mut self) -> io::Result<()> {
        if self.mode.take().is_some() {
            sys::unlock(&self.file)?;
        }
        Ok(())
    }

    /// Currently held mode, if any.
    #[inline]
    pub fn mode(&self) -> Option<LockMode> {
        self.mode
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // closing the duplicate alone would not release a lock still shared
        // with the original descriptor
        let _ = self.release();
    }
}

#[cfg(unix)]
mod sys {
    use std::fs::File;
    use std::io;
    use std::os::unix::io::AsRawFd;

    use libc::{flock, LOCK_EX, LOCK_NB, LOCK_SH, LOCK_UN};

    use super::LockMode;

    pub fn try_lock(file: &File, mode: LockMode) -> io::Result<bool> {
        let op = match mode {
            LockMode::Shared => LOCK_SH,
            LockMode::Exclusive => LOCK_EX,
        };
        let result = unsafe { flock(file.as_raw_fd(), op | LOCK_NB) };
        if result == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::WouldBlock {
            Ok(false)
        } else {
            Err(err)
        }
    }

    pub fn unlock(file: &File) -> io::Result<()> {
        let result = unsafe { flock(file.as_raw_fd(), LOCK_UN) };
        if result != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

#[cfg(not(unix))]
mod sys {
    use std::fs::File;
    use std::io;

    use super::LockMode;

    // No advisory locking on this platform; every request succeeds.
    pub fn try_lock(_file: &File, _mode: LockMode) -> io::Result<bool> {
        Ok(true)
    }

    pub fn unlock(_file: &File) -> io::Result<()> {
        Ok(())
    }
}
