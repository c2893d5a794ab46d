use crate::error::{Error, Result};
use std::fs::{File, OpenOptions, TryLockError};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Advisory lock on the `<file>.lock` sidecar of a store file.
///
/// Released when dropped. Locks are per open file description, so two
/// guards in the same process exclude each other just like two processes.
pub struct StoreLock {
    file: File,
}

impl StoreLock {
    pub fn exclusive(target: &Path) -> io::Result<Self> {
        let file = open_lock_file(&sidecar_path(target))?;
        file.lock()?;
        Ok(Self { file })
    }

    pub fn shared(target: &Path) -> io::Result<Self> {
        let file = open_lock_file(&sidecar_path(target))?;
        file.lock_shared()?;
        Ok(Self { file })
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Single-flight guard for a pass (`arbiter`, `reconciler`).
///
/// Acquisition never waits: an overlapping run fails with
/// [`Error::AlreadyRunning`].
pub struct RunGuard {
    file: File,
    role: &'static str,
}

impl RunGuard {
    pub fn try_acquire(dir: &Path, role: &'static str) -> Result<Self> {
        let path = dir.join(format!("{role}.run.lock"));
        let file = open_lock_file(&path).map_err(|source| Error::Store {
            name: role,
            path: path.clone(),
            source,
        })?;

        match file.try_lock() {
            Ok(()) => {
                debug!("Acquired run guard {}", path.display());
                Ok(Self { file, role })
            }
            Err(TryLockError::WouldBlock) => Err(Error::AlreadyRunning(role)),
            Err(TryLockError::Error(source)) => Err(Error::Store {
                name: role,
                path,
                source,
            }),
        }
    }

}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        debug!("Released {} run guard", self.role);
    }
}

fn sidecar_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    target.with_file_name(name)
}

fn open_lock_file(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
}
