//! Incremental file backups: a year/month/decade chain of archives driven
//! by JSON mtime indexes, with per-directory `GNU.dumpdir` catalogues in PAX
//! headers so standard tools can reconstruct the tree.
//!
//! Chain layout per source and destination:
//!
//! ```text
//! <root>/<YYYY>/
//!   year/                    year.inc + full tar
//!   month_<MM>/
//!     monthly/               month.inc + diff-vs-year tar
//!     daily/day_{01,11,21}/  daily.inc + diff-vs-closest-parent tars
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use walkdir::WalkDir;

use crate::archive::{member_name, ArchiveWriter};
use crate::calendar::Calendar;
use crate::error::{Error, Result};
use crate::globwalk::ExcludeSet;
use crate::logging::RunLog;
use crate::paths;
use crate::storage::{StorageData, StorageKind};

/// `absolute path -> mtime` snapshot of a source tree.
pub type FileIndex = BTreeMap<String, f64>;

pub const YEAR_INDEX: &str = "year.inc";
pub const MONTH_INDEX: &str = "month.inc";
pub const DAILY_INDEX: &str = "daily.inc";

/// Decade directory for a day of month.
pub fn daily_prefix(dom: u32) -> &'static str {
    if dom < 11 {
        "day_01"
    } else if dom < 21 {
        "day_11"
    } else {
        "day_21"
    }
}

/// Every chain path for the current date.
#[derive(Debug)]
pub struct DatedPaths {
    pub year_dir: PathBuf,
    /// Home of the full backup.
    pub initial_dir: PathBuf,
    pub month_dir: PathBuf,
    pub daily_dir: PathBuf,
    pub year_inc: PathBuf,
    pub month_inc: PathBuf,
    pub daily_inc: PathBuf,
    pub old_year_dir: PathBuf,
}

pub fn dated_paths(root: &Path, cal: &Calendar) -> DatedPaths {
    let year_dir = root.join(cal.year_label());
    let initial_dir = year_dir.join("year");
    let month_dir = year_dir.join(format!("month_{}", cal.moy_label())).join("monthly");
    let daily_dir = year_dir
        .join(format!("month_{}", cal.moy_label()))
        .join("daily")
        .join(daily_prefix(cal.dom()));
    DatedPaths {
        year_inc: initial_dir.join(YEAR_INDEX),
        month_inc: month_dir.join(MONTH_INDEX),
        daily_inc: daily_dir.join(DAILY_INDEX),
        old_year_dir: root.join((cal.year() - 1).to_string()),
        year_dir,
        initial_dir,
        month_dir,
        daily_dir,
    }
}

// ─── Indexes ──────────────────────────────────────────────────────────────────

fn mtime_float(meta: &fs::Metadata) -> f64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Walk `target` and snapshot every non-excluded file's mtime.
pub fn build_index(target: &Path, excludes: &ExcludeSet) -> FileIndex {
    let mut index = FileIndex::new();
    for entry in WalkDir::new(target)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if excludes.is_excluded(path) {
            continue;
        }
        if let Ok(meta) = entry.metadata() {
            index.insert(path.display().to_string(), mtime_float(&meta));
        }
    }
    index
}

pub fn read_index(path: &Path) -> Result<FileIndex> {
    let content = fs::read_to_string(path)
        .map_err(|e| Error::IndexReadFailed(path.to_path_buf(), e.to_string()))?;
    serde_json::from_str(&content)
        .map_err(|e| Error::IndexReadFailed(path.to_path_buf(), e.to_string()))
}

pub fn write_index(path: &Path, index: &FileIndex) -> Result<()> {
    let content = serde_json::to_string(index)
        .map_err(|e| Error::IndexWriteFailed(path.to_path_buf(), e.to_string()))?;
    fs::write(path, content).map_err(|e| Error::IndexWriteFailed(path.to_path_buf(), e.to_string()))
}

// ─── Diff ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct Diff {
    /// Created since the basis, or mtime changed.
    pub modify: Vec<String>,
    pub not_modify: Vec<String>,
}

pub fn compute_diff(new: &FileIndex, old: &FileIndex) -> Diff {
    let mut diff = Diff::default();
    for (path, mtime) in new {
        match old.get(path) {
            None => diff.modify.push(path.clone()),
            Some(old_mtime) if old_mtime != mtime => diff.modify.push(path.clone()),
            Some(_) => diff.not_modify.push(path.clone()),
        }
    }
    diff
}

// ─── GNU.dumpdir ──────────────────────────────────────────────────────────────

const SIGIL_DIR: char = 'D';
const SIGIL_MODIFIED: char = 'Y';
const SIGIL_UNCHANGED: char = 'N';

/// Encode one directory's immediate children as a dumpdir catalogue:
/// `<sigil><name>\0` per child, sorted by name, with a closing `\0`.
pub fn dumpdir_catalogue(children: &BTreeMap<String, char>) -> String {
    let mut result = String::new();
    for (name, sigil) in children {
        result.push(*sigil);
        result.push_str(name);
        result.push('\0');
    }
    result.push('\0');
    result
}

/// Catalogue every walked directory of `target`.
fn dumpdir_map(
    target: &Path,
    excludes: &ExcludeSet,
    modify: &HashSet<&str>,
) -> BTreeMap<PathBuf, String> {
    let mut map = BTreeMap::new();
    for entry in WalkDir::new(target)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_dir() {
            continue;
        }
        let dir = entry.path();
        if excludes.is_excluded(dir) {
            continue;
        }
        let mut children: BTreeMap<String, char> = BTreeMap::new();
        let listing = match fs::read_dir(dir) {
            Ok(l) => l,
            Err(_) => continue,
        };
        for child in listing.flatten() {
            let path = child.path();
            let name = child.file_name().to_string_lossy().into_owned();
            let is_dir = child.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if is_dir {
                children.insert(name, SIGIL_DIR);
            } else {
                if excludes.is_excluded(&path) {
                    continue;
                }
                let sigil = if modify.contains(path.display().to_string().as_str()) {
                    SIGIL_MODIFIED
                } else {
                    SIGIL_UNCHANGED
                };
                children.insert(name, sigil);
            }
        }
        map.insert(dir.to_path_buf(), dumpdir_catalogue(&children));
    }
    map
}

/// Write the incremental archive: dumpdir-annotated directory entries plus
/// the bodies of the modified files.  Objects that vanished mid-walk are
/// skipped.
pub fn create_inc_tar(
    dst: &Path,
    dumpdirs: &BTreeMap<PathBuf, String>,
    modify: &[String],
    gzip: bool,
) -> Result<()> {
    let writer = ArchiveWriter::create(dst, gzip)?;
    let mut builder = tar::Builder::new(writer);
    builder.follow_symlinks(false);

    for (dir, catalogue) in dumpdirs {
        if fs::metadata(dir).is_err() {
            continue;
        }
        builder
            .append_pax_extensions([("GNU.dumpdir", catalogue.as_bytes())])
            .map_err(|e| archive_err(dst, &e))?;
        match builder.append_dir(member_name(dir), dir) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(archive_err(dst, &e)),
            Ok(()) => {}
        }
    }

    for file in modify {
        let path = Path::new(file);
        match builder.append_path_with_name(path, member_name(path)) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(archive_err(dst, &e)),
            Ok(()) => {}
        }
    }

    builder
        .into_inner()
        .and_then(|w| w.finish())
        .map_err(|e| archive_err(dst, &e))?;
    Ok(())
}

fn archive_err(dst: &Path, e: &dyn std::fmt::Display) -> Error {
    Error::ArchiveFailed(format!("can't write '{}': {e}", dst.display()))
}

// ─── Month window pruning ─────────────────────────────────────────────────────

/// `(year, month)` pairs inside the retention window ending today.
fn keep_window(year: i32, moy: u32, months_to_store: u32) -> HashSet<(i32, u32)> {
    let mut keep = HashSet::new();
    let (mut y, mut m) = (year, moy);
    for _ in 0..months_to_store.clamp(1, 12) {
        keep.insert((y, m));
        if m == 1 {
            y -= 1;
            m = 12;
        } else {
            m -= 1;
        }
    }
    keep
}

/// Delete month directories (current and previous year) that fell out of the
/// retention window, then an old year directory that holds only `year/`.
pub fn prune_old_months(
    log: &RunLog,
    p: &DatedPaths,
    cal: &Calendar,
    months_to_store: u32,
    job_name: &str,
) {
    let keep = keep_window(cal.year(), cal.moy(), months_to_store);
    let old_year = cal.year() - 1;

    for month in 1..=12u32 {
        let dir_name = format!("month_{month:02}");
        if !keep.contains(&(old_year, month)) {
            remove_month_dir(log, &p.old_year_dir.join(&dir_name), job_name);
        }
        if month <= cal.moy() && !keep.contains(&(cal.year(), month)) {
            remove_month_dir(log, &p.year_dir.join(&dir_name), job_name);
        }
    }

    // The year dir goes only once nothing but the full backup is left.
    if p.old_year_dir.is_dir() {
        if let Ok(entries) = fs::read_dir(&p.old_year_dir) {
            let names: Vec<_> = entries.flatten().map(|e| e.file_name()).collect();
            if names.len() == 1 && names[0] == "year" {
                if let Err(e) = paths::remove_any(&p.old_year_dir) {
                    log.error(job_name, &format!("{e}"));
                }
            }
        }
    }
}

fn remove_month_dir(log: &RunLog, dir: &Path, job_name: &str) {
    if dir.is_dir() {
        if let Err(e) = paths::remove_any(dir) {
            log.error(job_name, &format!("{e}"));
        }
    }
}

// ─── Chain driver ─────────────────────────────────────────────────────────────

/// Run one incremental step for `target` on an already mounted destination.
#[allow(clippy::too_many_arguments)]
pub fn place_incremental(
    log: &RunLog,
    cal: &Calendar,
    data: &StorageData,
    part_of_dir_path: &str,
    backup_name: &str,
    target: &Path,
    excludes: &ExcludeSet,
    gzip: bool,
    job_name: &str,
    months_to_store: u32,
) {
    let root = data.dst_root(part_of_dir_path);
    let p = dated_paths(&root, cal);

    prune_old_months(log, &p, cal, months_to_store, job_name);

    let new_index = build_index(target, excludes);

    if p.year_inc.is_file() {
        continue_chain(
            log, cal, data, &p, &new_index, backup_name, target, excludes, gzip, job_name,
        );
    } else {
        init_chain(log, cal, data, &p, &new_index, backup_name, target, excludes, gzip, job_name);
    }
}

/// First run of a year (or a broken chain): full backup plus seeded month
/// and decade directories.
#[allow(clippy::too_many_arguments)]
fn init_chain(
    log: &RunLog,
    cal: &Calendar,
    data: &StorageData,
    p: &DatedPaths,
    new_index: &FileIndex,
    backup_name: &str,
    target: &Path,
    excludes: &ExcludeSet,
    gzip: bool,
    job_name: &str,
) {
    if p.year_dir.is_dir() {
        // An index-less year dir cannot anchor diffs any more.
        let _ = paths::remove_any(&p.year_dir);
        log.error(
            job_name,
            &format!(
                "The file {} not found, so the directory {} is cleared. \
                 Incremental backup will be reinitialized.",
                data.dir_for_log(&p.year_inc),
                data.dir_for_log(&p.year_dir)
            ),
        );
    }

    if let Err(e) = paths::create_dirs(&p.initial_dir) {
        log.error(job_name, &format!("Can't create directory '{}': {e}", p.initial_dir.display()));
        return;
    }
    if let Err(e) = write_index(&p.year_inc, new_index) {
        log.error(job_name, &format!("{e}"));
        return;
    }

    let full_path = paths::artifact_path(&p.initial_dir, backup_name, "tar", gzip, cal);
    match crate::archive::create_tar(&full_path, target, gzip, excludes) {
        Ok(()) => log.info(
            job_name,
            &format!(
                "Successfully created full-backup '{}' {}.",
                data.dir_for_log(&full_path),
                data.log_suffix()
            ),
        ),
        Err(e) => {
            log.error(
                job_name,
                &format!(
                    "Can't create full-backup '{}' {}: {e}",
                    data.dir_for_log(&full_path),
                    data.log_suffix()
                ),
            );
            return;
        }
    }

    for dir in [&p.month_dir, &p.daily_dir] {
        if let Err(e) = paths::create_dirs(dir) {
            log.error(job_name, &format!("Can't create directory '{}': {e}", dir.display()));
            return;
        }
    }

    let archive_name = full_path.file_name().expect("archive has a name");
    let month_copy = p.month_dir.join(archive_name);
    let daily_copy = p.daily_dir.join(archive_name);

    let results: Vec<Result<()>> = match data.kind {
        StorageKind::Local => vec![
            paths::symlink(&p.year_inc, &p.month_inc),
            paths::symlink(&full_path, &month_copy),
            paths::symlink(&p.year_inc, &p.daily_inc),
            paths::symlink(&full_path, &daily_copy),
        ],
        StorageKind::Scp | StorageKind::Nfs => {
            let remote_full = data.remote_path(&full_path);
            vec![
                paths::copy_to(&p.year_inc, &p.month_inc),
                paths::symlink(&remote_full, &month_copy),
                paths::copy_to(&p.year_inc, &p.daily_inc),
                paths::symlink(&remote_full, &daily_copy),
            ]
        }
        _ => vec![
            paths::copy_to(&p.year_inc, &p.month_inc),
            paths::copy_to(&full_path, &month_copy),
            paths::copy_to(&p.year_inc, &p.daily_inc),
            paths::copy_to(&full_path, &daily_copy),
        ],
    };
    for result in results {
        if let Err(e) = result {
            log.error(job_name, &format!("{e}"));
        }
    }
}

/// A later day in an initialized chain: diff against the basis index for
/// this day of month and write the incremental archive.
#[allow(clippy::too_many_arguments)]
fn continue_chain(
    log: &RunLog,
    cal: &Calendar,
    data: &StorageData,
    p: &DatedPaths,
    new_index: &FileIndex,
    backup_name: &str,
    target: &Path,
    excludes: &ExcludeSet,
    gzip: bool,
    job_name: &str,
) {
    let (basis, out_dir, new_inc, seed_daily) = match cal.dom() {
        1 => (&p.year_inc, &p.month_dir, Some(&p.month_inc), true),
        11 | 21 => (&p.month_inc, &p.daily_dir, Some(&p.daily_inc), false),
        _ => (&p.daily_inc, &p.daily_dir, None, false),
    };

    let old_index = match read_index(basis) {
        Ok(index) => index,
        Err(e) => {
            log.error(job_name, &format!("{e}"));
            return;
        }
    };

    if let Err(e) = paths::create_dirs(out_dir) {
        log.error(job_name, &format!("Can't create directory '{}': {e}", out_dir.display()));
        return;
    }
    if let Some(inc) = new_inc {
        if let Err(e) = write_index(inc, new_index) {
            log.error(job_name, &format!("{e}"));
        }
    }

    let diff = compute_diff(new_index, &old_index);
    let modify_set: HashSet<&str> = diff.modify.iter().map(String::as_str).collect();
    let dumpdirs = dumpdir_map(target, excludes, &modify_set);

    let dst = paths::artifact_path(out_dir, backup_name, "tar", gzip, cal);

    match create_inc_tar(&dst, &dumpdirs, &diff.modify, gzip) {
        Ok(()) => log.info(
            job_name,
            &format!(
                "Successfully created incremental '{}' archive {}.",
                data.dir_for_log(&dst),
                data.log_suffix()
            ),
        ),
        Err(e) => {
            log.error(
                job_name,
                &format!(
                    "Can't create incremental '{}' archive {}: {e}",
                    data.dir_for_log(&dst),
                    data.log_suffix()
                ),
            );
            return;
        }
    }

    if seed_daily {
        if let Err(e) = paths::create_dirs(&p.daily_dir) {
            log.error(job_name, &format!("Can't create directory '{}': {e}", p.daily_dir.display()));
            return;
        }
        let seeded = if data.is_local() {
            paths::symlink(&p.month_inc, &p.daily_inc)
        } else {
            paths::copy_to(&p.month_inc, &p.daily_inc)
        };
        if let Err(e) = seeded {
            log.error(job_name, &format!("{e}"));
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use crate::storage::{validate, RetentionSpec, StorageSpec};

    use super::*;

    fn cal(y: i32, m: u32, d: u32) -> Calendar {
        Calendar::from_datetime(chrono::Local.with_ymd_and_hms(y, m, d, 10, 30, 0).unwrap())
    }

    fn local_data(dir: &Path) -> StorageData {
        let spec = StorageSpec {
            storage: StorageKind::Local,
            enable: true,
            backup_dir: dir.display().to_string(),
            store: RetentionSpec::default(),
            host: String::new(),
            port: None,
            user: String::new(),
            password: String::new(),
            path_to_key: String::new(),
            remote_mount_point: String::new(),
            extra_keys: String::new(),
            share: String::new(),
            bucket_name: String::new(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            s3fs_opts: String::new(),
        };
        validate("job", &spec).unwrap()
    }

    fn seed_tree(root: &Path) {
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(root.join("a.txt"), b"alpha").unwrap();
        fs::write(root.join("sub/b.txt"), b"beta").unwrap();
    }

    // ── decades ───────────────────────────────────────────────────────────────

    #[test]
    fn decade_boundaries() {
        assert_eq!(daily_prefix(1), "day_01");
        assert_eq!(daily_prefix(10), "day_01");
        assert_eq!(daily_prefix(11), "day_11");
        assert_eq!(daily_prefix(20), "day_11");
        assert_eq!(daily_prefix(21), "day_21");
        assert_eq!(daily_prefix(31), "day_21");
    }

    #[test]
    fn dated_paths_layout() {
        let p = dated_paths(Path::new("/backup/www"), &cal(2024, 3, 14));
        assert_eq!(p.year_dir, Path::new("/backup/www/2024"));
        assert_eq!(p.year_inc, Path::new("/backup/www/2024/year/year.inc"));
        assert_eq!(
            p.month_inc,
            Path::new("/backup/www/2024/month_03/monthly/month.inc")
        );
        assert_eq!(
            p.daily_inc,
            Path::new("/backup/www/2024/month_03/daily/day_11/daily.inc")
        );
        assert_eq!(p.old_year_dir, Path::new("/backup/www/2023"));
    }

    // ── index ─────────────────────────────────────────────────────────────────

    #[test]
    fn index_round_trips_through_json() {
        let tmp = tempfile::tempdir().unwrap();
        seed_tree(tmp.path());

        let index = build_index(tmp.path(), &ExcludeSet::default());
        assert_eq!(index.len(), 2);

        let file = tmp.path().join("year.inc");
        write_index(&file, &index).unwrap();
        assert_eq!(read_index(&file).unwrap(), index);
    }

    #[test]
    fn excluded_files_stay_out_of_the_index() {
        let tmp = tempfile::tempdir().unwrap();
        seed_tree(tmp.path());

        let target = tmp.path().display().to_string();
        let excludes = ExcludeSet::expand(&[target], &["sub".into()]);
        let index = build_index(tmp.path(), &excludes);
        assert_eq!(index.len(), 1);
        assert!(index.keys().all(|k| k.ends_with("a.txt")));
    }

    #[test]
    fn unreadable_index_is_an_index_read_error() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("month.inc");
        fs::write(&file, b"{not json").unwrap();
        assert!(matches!(read_index(&file), Err(Error::IndexReadFailed(..))));
        assert!(matches!(
            read_index(&tmp.path().join("absent.inc")),
            Err(Error::IndexReadFailed(..))
        ));
    }

    // ── diff ──────────────────────────────────────────────────────────────────

    #[test]
    fn diff_classifies_created_changed_unchanged() {
        let mut old = FileIndex::new();
        old.insert("/s/kept".into(), 100.0);
        old.insert("/s/touched".into(), 100.0);
        old.insert("/s/gone".into(), 100.0);

        let mut new = FileIndex::new();
        new.insert("/s/kept".into(), 100.0);
        new.insert("/s/touched".into(), 250.5);
        new.insert("/s/fresh".into(), 300.0);

        let diff = compute_diff(&new, &old);
        let mut modify = diff.modify.clone();
        modify.sort();
        assert_eq!(modify, vec!["/s/fresh".to_string(), "/s/touched".to_string()]);
        assert_eq!(diff.not_modify, vec!["/s/kept".to_string()]);
    }

    // ── dumpdir ───────────────────────────────────────────────────────────────

    #[test]
    fn catalogue_is_sorted_and_nul_terminated() {
        let mut children = BTreeMap::new();
        children.insert("zeta.txt".to_string(), 'N');
        children.insert("alpha.txt".to_string(), 'Y');
        children.insert("lib".to_string(), 'D');

        let catalogue = dumpdir_catalogue(&children);
        assert_eq!(catalogue, "Yalpha.txt\0Dlib\0Nzeta.txt\0\0");
    }

    #[test]
    fn dumpdir_map_marks_modified_files() {
        let tmp = tempfile::tempdir().unwrap();
        seed_tree(tmp.path());

        let b_path = tmp.path().join("sub/b.txt").display().to_string();
        let modify: HashSet<&str> = [b_path.as_str()].into();
        let map = dumpdir_map(tmp.path(), &ExcludeSet::default(), &modify);

        let root_catalogue = &map[&tmp.path().to_path_buf()];
        assert!(root_catalogue.contains("Na.txt\0"));
        assert!(root_catalogue.contains("Dsub\0"));

        let sub_catalogue = &map[&tmp.path().join("sub")];
        assert!(sub_catalogue.contains("Yb.txt\0"));
    }

    // ── month window ──────────────────────────────────────────────────────────

    #[test]
    fn keep_window_wraps_the_year() {
        let keep = keep_window(2024, 2, 3);
        assert!(keep.contains(&(2024, 2)));
        assert!(keep.contains(&(2024, 1)));
        assert!(keep.contains(&(2023, 12)));
        assert!(!keep.contains(&(2023, 11)));
    }

    #[test]
    fn out_of_window_month_dirs_are_pruned() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        let c = cal(2024, 3, 14);
        let p = dated_paths(root, &c);

        for dir in [
            root.join("2024/month_01"),
            root.join("2024/month_02"),
            root.join("2024/month_03"),
            root.join("2023/month_12"),
            root.join("2023/month_03"),
            root.join("2023/year"),
        ] {
            fs::create_dir_all(dir).unwrap();
        }

        // Keep three months: Jan, Feb, Mar 2024.
        prune_old_months(&RunLog::discard(), &p, &c, 3, "j");

        assert!(root.join("2024/month_03").exists());
        assert!(root.join("2024/month_02").exists());
        assert!(root.join("2024/month_01").exists());
        assert!(!root.join("2023/month_12").exists());
        assert!(!root.join("2023/month_03").exists());
        // Only year/ left in 2023 → the whole old year goes.
        assert!(!root.join("2023").exists());
    }

    #[test]
    fn old_year_survives_while_months_remain_in_window() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        let c = cal(2024, 1, 14);
        let p = dated_paths(root, &c);

        fs::create_dir_all(root.join("2023/month_12")).unwrap();
        fs::create_dir_all(root.join("2023/year")).unwrap();

        prune_old_months(&RunLog::discard(), &p, &c, 2, "j");

        assert!(root.join("2023/month_12").exists(), "Dec 2023 is in the window");
        assert!(root.join("2023").exists());
    }

    // ── chain: init ───────────────────────────────────────────────────────────

    #[test]
    fn first_run_builds_the_full_chain_with_symlinks() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        seed_tree(&source);
        fs::create_dir_all(&dst).unwrap();

        let data = local_data(&dst);
        let c = cal(2024, 3, 14);
        place_incremental(
            &RunLog::discard(),
            &c,
            &data,
            "www",
            "www",
            &source,
            &ExcludeSet::default(),
            true,
            "j",
            12,
        );

        let year = dst.join("www/2024/year");
        assert!(year.join("year.inc").is_file());
        let full = year.join("www_2024-03-14_10-30.tar.gz");
        assert!(full.is_file());

        let monthly = dst.join("www/2024/month_03/monthly");
        let daily = dst.join("www/2024/month_03/daily/day_11");
        assert!(fs::symlink_metadata(monthly.join("month.inc")).unwrap().is_symlink());
        assert!(fs::symlink_metadata(monthly.join("www_2024-03-14_10-30.tar.gz"))
            .unwrap()
            .is_symlink());
        assert!(fs::symlink_metadata(daily.join("daily.inc")).unwrap().is_symlink());
        assert_eq!(
            read_index(&monthly.join("month.inc")).unwrap(),
            read_index(&year.join("year.inc")).unwrap()
        );
    }

    #[test]
    fn broken_year_dir_is_reinitialized() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        seed_tree(&source);

        // A year dir without year.inc is unusable state.
        fs::create_dir_all(dst.join("www/2024/month_01/monthly")).unwrap();

        let log = RunLog::discard();
        place_incremental(
            &log,
            &cal(2024, 3, 14),
            &local_data(&dst),
            "www",
            "www",
            &source,
            &ExcludeSet::default(),
            false,
            "j",
            12,
        );

        assert!(log.has_errors(), "reinit must be reported");
        assert!(dst.join("www/2024/year/year.inc").is_file());
        assert!(
            !dst.join("www/2024/month_01").exists(),
            "stale state is cleared before the chain restarts"
        );
    }

    // ── chain: decade diff ────────────────────────────────────────────────────

    #[test]
    fn day_21_diffs_against_month_index() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        seed_tree(&source);

        let data = local_data(&dst);
        // Initialize the chain mid-month…
        place_incremental(
            &RunLog::discard(),
            &cal(2024, 3, 14),
            &data,
            "www",
            "www",
            &source,
            &ExcludeSet::default(),
            false,
            "j",
            12,
        );

        // …change one file and run again on the 21st.
        fs::write(source.join("sub/b.txt"), b"changed body").unwrap();
        let mtime = std::time::SystemTime::now() + std::time::Duration::from_secs(5);
        fs::File::options()
            .write(true)
            .open(source.join("sub/b.txt"))
            .unwrap()
            .set_times(fs::FileTimes::new().set_modified(mtime))
            .unwrap();

        let log = RunLog::discard();
        place_incremental(
            &log,
            &cal(2024, 3, 21),
            &data,
            "www",
            "www",
            &source,
            &ExcludeSet::default(),
            false,
            "j",
            12,
        );
        assert!(!log.has_errors(), "{}", log.error_body());

        let day21 = dst.join("www/2024/month_03/daily/day_21");
        assert!(day21.join("daily.inc").is_file());
        let archive = day21.join("www_2024-03-21_10-30.tar");
        assert!(archive.is_file());

        // The archive carries dumpdir catalogues and only the changed body.
        let bytes = fs::read(&archive).unwrap();
        let raw = String::from_utf8_lossy(&bytes);
        assert!(raw.contains("GNU.dumpdir"));
        assert!(raw.contains("changed body"));
        assert!(!raw.contains("alpha"), "unchanged file bodies stay out");

        let names: Vec<String> = {
            let mut archive = tar::Archive::new(fs::File::open(&archive).unwrap());
            archive
                .entries()
                .unwrap()
                .map(|e| e.unwrap().path().unwrap().display().to_string())
                .collect()
        };
        assert!(names.iter().any(|n| n.ends_with("sub/b.txt")));
        assert!(!names.iter().any(|n| n.ends_with("a.txt")));
    }
}
