//! The error taxonomy shared by every engine module.
//!
//! Job drivers catch and log these per source so one bad target cannot stop
//! the rest of the job; the run controller only ever aborts on `Config` and
//! the lock variants.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing/empty required key, unknown type or storage, duplicate job name.
    #[error("configuration error: {0}")]
    Config(String),

    /// Another instance holds the lock and no wait budget was configured.
    #[error("script already is running (lock held on '{0}')")]
    AlreadyRunning(PathBuf),

    /// The wait budget ran out while polling for the lock.
    #[error("gave up waiting for the instance lock after {0} seconds")]
    LockWaitExpired(u64),

    /// A helper tool required to mount a storage is not installed.
    #[error("required package '{0}' not installed")]
    PackageMissing(String),

    /// The well-known mount point is occupied by something else.
    #[error("{0}")]
    MountBusy(String),

    #[error("mount failed: {0}")]
    MountFailed(String),

    #[error("unmount failed: {0}")]
    UnmountFailed(String),

    /// Writing davfs2 / s3fs credential files failed.
    #[error("can't record authentication data: {0}")]
    AuthWriteFailed(String),

    /// Dump subprocess exited non-zero or produced fatal stderr.
    #[error("{0}")]
    DumpFailed(String),

    /// A tar archive could not be written.
    #[error("{0}")]
    ArchiveFailed(String),

    /// A `.inc` index file required as diff basis is unreadable.
    #[error("couldn't open meta info file '{0}': {1}")]
    IndexReadFailed(PathBuf, String),

    #[error("couldn't write meta info file '{0}': {1}")]
    IndexWriteFailed(PathBuf, String),

    /// A move/copy/symlink/delete inside the rotation layout failed.
    #[error("{0}")]
    RotationFailed(String),

    /// The external job's stdout descriptor was malformed.
    #[error("{0}")]
    ExternalDescriptorInvalid(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
