//! Single-instance guard.
//!
//! An advisory exclusive lock on a well-known file serializes concurrent
//! invocations on the same host.  The lock is released when the guard drops,
//! which also covers panic unwinding inside job drivers; the lock file itself
//! is never removed.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs2::FileExt;

use crate::error::{Error, Result};

/// Default lock path shared by every invocation on the host.
pub const LOCK_PATH: &str = "/tmp/rotbak.lock";

#[derive(Debug)]
pub struct ProcessLock {
    file: File,
}

impl ProcessLock {
    /// Acquire the lock at `path`.
    ///
    /// On contention: without a `wait_budget` the call fails immediately with
    /// [`Error::AlreadyRunning`]; with one it polls every `retry_interval`
    /// until the budget is exhausted, then fails with
    /// [`Error::LockWaitExpired`].
    pub fn acquire(
        path: &Path,
        wait_budget: Option<Duration>,
        retry_interval: Duration,
    ) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Never truncate before the lock is held — the file may carry the
        // PID of a running instance.
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let mut waited = Duration::ZERO;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => break,
                Err(e) if is_contended(&e) => match wait_budget {
                    None => return Err(Error::AlreadyRunning(PathBuf::from(path))),
                    Some(budget) => {
                        if waited >= budget {
                            return Err(Error::LockWaitExpired(budget.as_secs()));
                        }
                        std::thread::sleep(retry_interval);
                        waited += retry_interval;
                    }
                },
                Err(e) => return Err(Error::Io(e)),
            }
        }

        let mut file = file;
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        Ok(Self { file })
    }

    /// Explicit release; dropping the guard has the same effect.
    pub fn release(self) {}
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn is_contended(e: &std::io::Error) -> bool {
    e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.lock");

        let first = ProcessLock::acquire(&path, None, Duration::from_millis(10)).unwrap();
        let second = ProcessLock::acquire(&path, None, Duration::from_millis(10));
        assert!(matches!(second, Err(Error::AlreadyRunning(_))));
        drop(first);
    }

    #[test]
    fn lock_can_be_reacquired_after_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.lock");

        let first = ProcessLock::acquire(&path, None, Duration::from_millis(10)).unwrap();
        first.release();
        ProcessLock::acquire(&path, None, Duration::from_millis(10))
            .expect("lock should be free again");
    }

    #[test]
    fn waiter_acquires_once_holder_releases() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.lock");

        let holder = ProcessLock::acquire(&path, None, Duration::from_millis(10)).unwrap();
        let waiter_path = path.clone();
        let waiter = std::thread::spawn(move || {
            ProcessLock::acquire(
                &waiter_path,
                Some(Duration::from_secs(5)),
                Duration::from_millis(20),
            )
        });
        std::thread::sleep(Duration::from_millis(100));
        drop(holder);

        assert!(waiter.join().unwrap().is_ok());
    }

    #[test]
    fn exhausted_budget_reports_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.lock");

        let _holder = ProcessLock::acquire(&path, None, Duration::from_millis(10)).unwrap();
        let second = ProcessLock::acquire(
            &path,
            Some(Duration::from_millis(50)),
            Duration::from_millis(20),
        );
        assert!(matches!(second, Err(Error::LockWaitExpired(_))));
    }

    #[test]
    fn pid_is_written_into_the_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.lock");

        let _lock = ProcessLock::acquire(&path, None, Duration::from_millis(10)).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim(), std::process::id().to_string());
    }
}
