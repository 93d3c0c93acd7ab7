// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Run-wide mutual exclusion.
//!
//! Only one run may mutate a given history file at a time. The guard is an
//! exclusive advisory lock on `<history-file>.lock`, released when the guard
//! is dropped or the process dies.

use std::fs::{File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};

use crate::error::LockError;

/// Held for the whole run; dropping it releases the lock
#[derive(Debug)]
pub struct RunLock {
    _file: File,
    path: PathBuf,
}

impl RunLock {
    /// Path of the lock file guarding `history_file`
    pub fn lock_path(history_file: &Path) -> PathBuf {
        let mut name = history_file.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Try to take the lock without blocking
    ///
    /// Returns `Ok(None)` when another process holds it.
    pub fn try_acquire(history_file: &Path) -> Result<Option<Self>, LockError> {
        let path = Self::lock_path(history_file);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| LockError::OpenFailed {
                path: path.clone(),
                source: e,
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| LockError::OpenFailed {
                path: path.clone(),
                source: e,
            })?;

        match file.try_lock() {
            Ok(()) => Ok(Some(Self { _file: file, path })),
            Err(TryLockError::WouldBlock) => Ok(None),
            Err(TryLockError::Error(e)) => Err(LockError::LockFailed { path, source: e }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn second_acquire_is_refused_while_held() {
        let dir = tempdir().unwrap();
        let history = dir.path().join("history.json");

        let first = RunLock::try_acquire(&history).unwrap();
        assert!(first.is_some());
        assert!(RunLock::try_acquire(&history).unwrap().is_none());
    }

    #[test]
    fn lock_is_released_on_drop() {
        let dir = tempdir().unwrap();
        let history = dir.path().join("history.json");

        let first = RunLock::try_acquire(&history).unwrap().unwrap();
        assert_eq!(first.path(), dir.path().join("history.json.lock"));
        drop(first);

        assert!(RunLock::try_acquire(&history).unwrap().is_some());
    }
}
