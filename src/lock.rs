//! Exclusive run guard. Two runs writing the same "latest" file would race.
//!
//! The lock file holds the owner's PID. A lock whose owner is no longer alive
//! (killed before `Drop` ran) is taken over instead of blocking every later run.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::{FragilityError, Result};

pub const LOCK_FILE: &str = ".fragility.lock";

/// Held for the whole run; the lock file is removed on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| {
            FragilityError::FileError(format!("Failed to create {}: {}", dir.display(), e))
        })?;

        let path = dir.join(LOCK_FILE);
        let file = match create_lock_file(&path)? {
            Some(file) => file,
            None => match owner_pid(&path) {
                Some(pid) if !process_alive(pid) => {
                    tracing::warn!(path = %path.display(), pid, "Taking over stale run lock");
                    remove_stale(&path)?;
                    create_lock_file(&path)?
                        .ok_or_else(|| FragilityError::RunInProgress { path: path.clone() })?
                }
                _ => return Err(FragilityError::RunInProgress { path }),
            },
        };

        if let Err(e) = write_pid(file) {
            let _ = fs::remove_file(&path);
            return Err(FragilityError::FileError(format!(
                "Failed to write lock {}: {}",
                path.display(),
                e
            )));
        }

        tracing::debug!(path = %path.display(), "Acquired run lock");
        Ok(RunLock { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to release run lock");
        }
    }
}

/// `None` when the file already exists.
fn create_lock_file(path: &Path) -> Result<Option<File>> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => Ok(Some(file)),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(None),
        Err(e) => Err(FragilityError::FileError(format!(
            "Failed to create lock {}: {}",
            path.display(),
            e
        ))),
    }
}

fn write_pid(mut file: File) -> std::io::Result<()> {
    writeln!(file, "{}", std::process::id())?;
    file.sync_all()
}

/// An unreadable or empty lock counts as held: its owner may still be
/// between creating the file and writing its PID.
fn owner_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

fn remove_stale(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(FragilityError::FileError(format!(
            "Failed to remove stale lock {}: {}",
            path.display(),
            e
        ))),
    }
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // Safety: signal 0 only checks that the process exists and may be signalled.
    let ret = unsafe { libc::kill(pid, 0) };
    ret == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn second_run_is_refused_while_first_holds_the_lock() {
        let dir = tempfile::tempdir().unwrap();
        let first = RunLock::acquire(dir.path()).unwrap();

        assert_matches!(
            RunLock::acquire(dir.path()),
            Err(FragilityError::RunInProgress { path }) if path == first.path()
        );
    }

    #[test]
    fn lock_is_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = {
            let lock = RunLock::acquire(dir.path()).unwrap();
            lock.path().to_path_buf()
        };
        assert!(!lock_path.exists());
        assert!(RunLock::acquire(dir.path()).is_ok());
    }

    #[test]
    fn lock_records_the_owner_pid() {
        let dir = tempfile::tempdir().unwrap();
        let lock = RunLock::acquire(dir.path()).unwrap();
        assert_eq!(owner_pid(lock.path()), Some(std::process::id()));
    }

    #[cfg(unix)]
    #[test]
    fn lock_left_by_a_dead_run_is_taken_over() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let dead_pid = child.id();
        child.wait().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOCK_FILE);
        fs::write(&path, format!("{dead_pid}\n")).unwrap();

        let lock = RunLock::acquire(dir.path()).unwrap();
        assert_eq!(owner_pid(lock.path()), Some(std::process::id()));
        drop(lock);
        assert!(!path.exists());
    }

    #[test]
    fn lock_held_by_a_live_process_is_respected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOCK_FILE);
        fs::write(&path, format!("{}\n", std::process::id())).unwrap();

        assert_matches!(RunLock::acquire(dir.path()), Err(FragilityError::RunInProgress { .. }));
        assert!(path.exists());
    }

    #[test]
    fn lock_without_a_pid_is_treated_as_held() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(LOCK_FILE), "").unwrap();

        assert_matches!(RunLock::acquire(dir.path()), Err(FragilityError::RunInProgress { .. }));
    }
}
