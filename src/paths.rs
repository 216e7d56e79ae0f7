//! Artifact naming and small filesystem operations.
//!
//! The filename grammar is shared by every job driver and the rotation
//! engine's pruning glob:
//!
//! ```text
//! (<prefix>-)?<basename>_YYYY-MM-DD_HH-MM.<ext>(.gz)?
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::calendar::Calendar;
use crate::error::{Error, Result};

/// Extensions the rotation engine recognizes when counting/pruning artifacts.
pub const BACKUP_EXTENSIONS: &[&str] = &[
    ".sql",
    ".sql.gz",
    ".tar",
    ".tar.gz",
    ".pgdump",
    ".pgdump.gz",
    ".mongodump",
    ".mongodump.gz",
    ".rdb",
    ".rdb.gz",
];

/// Directory whose *contents* are flushed after every job (davfs keeps its
/// cache here; the directory itself must survive).
pub const DAVFS_CACHE_DIR: &str = "/var/cache/davfs2";

/// Whether `name` ends in one of the recognized artifact extensions.
pub fn has_backup_extension(name: &str) -> bool {
    BACKUP_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

/// `<base>_<stamp>.<ext>[.gz]`
pub fn artifact_name(base: &str, ext: &str, gzip: bool, cal: &Calendar) -> String {
    if gzip {
        format!("{base}_{}.{ext}.gz", cal.artifact_stamp())
    } else {
        format!("{base}_{}.{ext}", cal.artifact_stamp())
    }
}

/// Full path of a fresh artifact inside `dir`.
pub fn artifact_path(dir: &Path, base: &str, ext: &str, gzip: bool, cal: &Calendar) -> PathBuf {
    dir.join(artifact_name(base, ext, gzip, cal))
}

/// Create (and return) the per-run staging directory `<tmp_dir>/<tag>_<stamp>/`.
pub fn job_tmp_dir(tmp_dir: &Path, tag: &str, cal: &Calendar) -> Result<PathBuf> {
    let dir = tmp_dir.join(format!("{tag}_{}", cal.artifact_stamp()));
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

pub fn create_dirs(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(Error::from)
}

/// Copy `src` into the directory `dst_dir`, keeping its file name.
pub fn copy_into(src: &Path, dst_dir: &Path) -> Result<PathBuf> {
    let name = src
        .file_name()
        .ok_or_else(|| Error::RotationFailed(format!("'{}' has no file name", src.display())))?;
    let dst = dst_dir.join(name);
    fs::copy(src, &dst).map_err(|e| {
        Error::RotationFailed(format!(
            "can't copy '{}' -> '{}': {e}",
            src.display(),
            dst.display()
        ))
    })?;
    Ok(dst)
}

/// Copy `src` to the exact path `dst`.
pub fn copy_to(src: &Path, dst: &Path) -> Result<()> {
    fs::copy(src, dst).map_err(|e| {
        Error::RotationFailed(format!(
            "can't copy '{}' -> '{}': {e}",
            src.display(),
            dst.display()
        ))
    })?;
    Ok(())
}

/// Move `src` into the directory `dst_dir`, falling back to copy+remove when
/// the rename crosses filesystems.
pub fn move_into(src: &Path, dst_dir: &Path) -> Result<PathBuf> {
    let name = src
        .file_name()
        .ok_or_else(|| Error::RotationFailed(format!("'{}' has no file name", src.display())))?;
    let dst = dst_dir.join(name);
    if fs::rename(src, &dst).is_err() {
        fs::copy(src, &dst).map_err(|e| {
            Error::RotationFailed(format!(
                "can't move '{}' -> '{}': {e}",
                src.display(),
                dst.display()
            ))
        })?;
        fs::remove_file(src).map_err(|e| {
            Error::RotationFailed(format!("can't remove '{}': {e}", src.display()))
        })?;
    }
    Ok(dst)
}

pub fn symlink(src: &Path, dst: &Path) -> Result<()> {
    std::os::unix::fs::symlink(src, dst).map_err(|e| {
        Error::RotationFailed(format!(
            "can't create symlink '{}' -> '{}': {e}",
            src.display(),
            dst.display()
        ))
    })
}

/// Remove a file, symlink, or directory tree.  Missing paths are fine.
pub fn remove_any(path: &Path) -> Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(_) => return Ok(()),
    };
    let res = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    res.map_err(|e| Error::RotationFailed(format!("can't delete '{}': {e}", path.display())))
}

/// Remove everything inside `dir` without touching `dir` itself.
pub fn clear_dir_contents(dir: &Path) -> Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return Ok(()),
    };
    for entry in entries.flatten() {
        remove_any(&entry.path())?;
    }
    Ok(())
}

// ─── Tests ────────────────────────────────────────────────────────────────────
