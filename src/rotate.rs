//! Periodic rotation: tier selection, placement, fan-out, retention.
//!
//! A freshly produced artifact lands in exactly one tier per destination
//! (`daily`, `weekly`, or `monthly`), is fanned out into the lower tiers on
//! anchor days, and every tier directory is then trimmed to its retention
//! count.  Destinations are independent: an error on one is logged and the
//! next one still runs.  The local destination is always processed last so
//! remote destinations can copy the staged file before it is moved away.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::calendar::{Anchors, Calendar};
use crate::logging::RunLog;
use crate::paths;
use crate::storage::{self, RetentionSpec, StorageData, StorageKind, StorageSpec};
use crate::{mount, paths::has_backup_extension};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Daily,
    Weekly,
    Monthly,
}

impl Tier {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Tier::Daily => "daily",
            Tier::Weekly => "weekly",
            Tier::Monthly => "monthly",
        }
    }

    /// Whether a new artifact can land in this tier today.
    fn feeds_today(&self, cal: &Calendar, anchors: &Anchors) -> bool {
        match self {
            Tier::Daily => true,
            Tier::Weekly => cal.dow() == anchors.dow,
            Tier::Monthly => cal.dom() == anchors.dom,
        }
    }

    fn retention(&self, r: &RetentionSpec) -> u32 {
        match self {
            Tier::Daily => r.days,
            Tier::Weekly => r.weeks,
            Tier::Monthly => r.months,
        }
    }
}

const ALL_TIERS: [Tier; 3] = [Tier::Monthly, Tier::Weekly, Tier::Daily];

/// The tier today's artifact belongs to on a destination, if any.
pub fn select_tier(cal: &Calendar, anchors: &Anchors, r: &RetentionSpec) -> Option<Tier> {
    if r.months > 0 && cal.dom() == anchors.dom {
        Some(Tier::Monthly)
    } else if r.weeks > 0 && cal.dow() == anchors.dow {
        Some(Tier::Weekly)
    } else if r.days > 0 {
        Some(Tier::Daily)
    } else {
        None
    }
}

/// Job-level gate: is there any enabled destination a backup could land on
/// today?  Incremental jobs bypass this (their chain needs every day).
pub fn is_time_to_backup(cal: &Calendar, anchors: &Anchors, storages: &[StorageSpec]) -> bool {
    let mut days = false;
    let mut weeks = false;
    let mut months = false;
    for spec in storages.iter().filter(|s| s.enable) {
        days |= spec.store.days > 0;
        weeks |= spec.store.weeks > 0;
        months |= spec.store.months > 0;
    }
    days || (weeks && cal.dow() == anchors.dow) || (months && cal.dom() == anchors.dom)
}

/// Reorder destinations so the local one comes last.
pub fn local_last(storages: &[StorageSpec]) -> Vec<&StorageSpec> {
    let (local, remote): (Vec<&StorageSpec>, Vec<&StorageSpec>) = storages
        .iter()
        .partition(|s| s.storage == StorageKind::Local);
    let mut ordered = remote;
    ordered.extend(local);
    ordered
}

/// Place `tmp_artifact` on every enabled destination and enforce retention.
#[allow(clippy::too_many_arguments)]
pub fn rotate_artifact(
    log: &RunLog,
    cal: &Calendar,
    anchors: &Anchors,
    storages: &[StorageSpec],
    part_of_dir_path: &str,
    tmp_artifact: &Path,
    job_name: &str,
    safety_backup: bool,
) {
    for spec in local_last(storages) {
        if !storage::is_save_to_storage(spec) {
            continue;
        }
        let mut data = match storage::validate(job_name, spec) {
            Ok(d) => d,
            Err(e) => {
                log.error(job_name, &e.to_string());
                continue;
            }
        };
        if let Err(e) = mount::mount(&mut data) {
            log.error(
                job_name,
                &format!("Can't mount remote '{}' storage: {e}", data.kind),
            );
            continue;
        }

        place_on_destination(
            log,
            cal,
            anchors,
            &data,
            part_of_dir_path,
            tmp_artifact,
            job_name,
            safety_backup,
        );

        if let Err(e) = mount::unmount(&data) {
            log.error(
                job_name,
                &format!("Can't umount remote '{}' storage: {e}", data.kind),
            );
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn place_on_destination(
    log: &RunLog,
    cal: &Calendar,
    anchors: &Anchors,
    data: &StorageData,
    part: &str,
    tmp_artifact: &Path,
    job_name: &str,
    safety_backup: bool,
) {
    let root = data.dst_root(part);

    // Local placement is a move, so the tier must be trimmed first; remote
    // tiers are trimmed first too unless the new copy must land before
    // anything is deleted.
    if data.is_local() || !safety_backup {
        prune_all_tiers(log, cal, anchors, data, &root, job_name, safety_backup);
    }

    let Some(tier) = select_tier(cal, anchors, &data.retention) else {
        return;
    };

    let placed = place_artifact(log, cal, anchors, data, &root, tier, tmp_artifact, job_name);

    if placed && safety_backup && !data.is_local() {
        prune_all_tiers(log, cal, anchors, data, &root, job_name, safety_backup);
    }
}

/// Move/copy the artifact into its tier and fan it out into the lower tiers
/// eligible today.  Returns whether the primary placement succeeded.
#[allow(clippy::too_many_arguments)]
fn place_artifact(
    log: &RunLog,
    cal: &Calendar,
    anchors: &Anchors,
    data: &StorageData,
    root: &Path,
    tier: Tier,
    tmp_artifact: &Path,
    job_name: &str,
) -> bool {
    let mut extra_tiers: Vec<Tier> = Vec::new();
    match tier {
        Tier::Monthly => {
            if data.retention.weeks > 0 && cal.dow() == anchors.dow {
                extra_tiers.push(Tier::Weekly);
            }
            if data.retention.days > 0 {
                extra_tiers.push(Tier::Daily);
            }
        }
        Tier::Weekly => {
            if data.retention.days > 0 {
                extra_tiers.push(Tier::Daily);
            }
        }
        Tier::Daily => {}
    }

    let tier_dir = root.join(tier.dir_name());
    for t in std::iter::once(&tier).chain(extra_tiers.iter()) {
        let dir = root.join(t.dir_name());
        if let Err(e) = paths::create_dirs(&dir) {
            log.error(
                job_name,
                &format!("Can't create directory '{}': {e}", data.dir_for_log(&dir)),
            );
        }
    }

    let placed: PathBuf = if data.is_local() {
        match paths::move_into(tmp_artifact, &tier_dir) {
            Ok(p) => {
                log.info(
                    job_name,
                    &format!(
                        "Successfully moved '{}' file '{}' -> '{}' {}.",
                        tier.dir_name(),
                        tmp_artifact.display(),
                        tier_dir.display(),
                        data.log_suffix()
                    ),
                );
                p
            }
            Err(e) => {
                log.error(
                    job_name,
                    &format!(
                        "Can't move '{}' file '{}' -> '{}' {}: {e}",
                        tier.dir_name(),
                        tmp_artifact.display(),
                        tier_dir.display(),
                        data.log_suffix()
                    ),
                );
                return false;
            }
        }
    } else {
        match paths::copy_into(tmp_artifact, &tier_dir) {
            Ok(p) => {
                log.info(
                    job_name,
                    &format!(
                        "Successfully copied '{}' file '{}' -> '{}' directory {}.",
                        tier.dir_name(),
                        tmp_artifact.display(),
                        data.dir_for_log(&tier_dir),
                        data.log_suffix()
                    ),
                );
                p
            }
            Err(e) => {
                log.error(
                    job_name,
                    &format!(
                        "Can't copy '{}' file '{}' -> '{}' directory {}: {e}",
                        tier.dir_name(),
                        tmp_artifact.display(),
                        data.dir_for_log(&tier_dir),
                        data.log_suffix()
                    ),
                );
                return false;
            }
        }
    };

    let file_name = placed.file_name().expect("placed artifact has a name");
    for t in extra_tiers {
        let dst = root.join(t.dir_name()).join(file_name);
        let result = match data.kind {
            StorageKind::Local => paths::symlink(&placed, &dst),
            // FUSE kinds without reliable symlink support get a second copy.
            StorageKind::Scp | StorageKind::Nfs => {
                paths::symlink(&data.remote_path(&placed), &dst)
            }
            _ => paths::copy_to(&placed, &dst),
        };
        if let Err(e) = result {
            log.error(job_name, &format!("{e}"));
        }
    }
    true
}

// ─── Retention ────────────────────────────────────────────────────────────────

fn prune_all_tiers(
    log: &RunLog,
    cal: &Calendar,
    anchors: &Anchors,
    data: &StorageData,
    root: &Path,
    job_name: &str,
    safety_backup: bool,
) {
    for tier in ALL_TIERS {
        let dir = root.join(tier.dir_name());
        if dir.is_dir() {
            prune_tier_dir(log, cal, anchors, data, &dir, tier, job_name, safety_backup);
        }
    }
}

/// Trim one tier directory to its retention count.
#[allow(clippy::too_many_arguments)]
fn prune_tier_dir(
    log: &RunLog,
    cal: &Calendar,
    anchors: &Anchors,
    data: &StorageData,
    dir: &Path,
    tier: Tier,
    job_name: &str,
    safety_backup: bool,
) {
    let files = collect_artifacts(dir);
    let keep = tier.retention(&data.retention);

    let result = if keep == 0 {
        files.iter().try_for_each(|f| paths::remove_any(f))
    } else {
        let mut delete = files.len() as i64 - i64::from(keep);
        if tier.feeds_today(cal, anchors) {
            delete += 1;
        }
        if safety_backup {
            delete -= 1;
        }
        if delete < 1 {
            return;
        }
        delete_oldest(&files, delete as usize)
    };

    match result {
        Ok(()) => log.info(
            job_name,
            &format!(
                "Successfully deleted old '{}' files in directory '{}' {}.",
                tier.dir_name(),
                data.dir_for_log(dir),
                data.log_suffix()
            ),
        ),
        Err(e) => log.error(
            job_name,
            &format!(
                "Can't delete old '{}' files in directory '{}' {}: {e}",
                tier.dir_name(),
                data.dir_for_log(dir),
                data.log_suffix()
            ),
        ),
    }
}

/// Files in `dir` that look like backup artifacts.
fn collect_artifacts(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let name = entry.file_name();
            if has_backup_extension(&name.to_string_lossy()) {
                files.push(entry.path());
            }
        }
    }
    files
}

/// Delete the `count` oldest files by mtime.  A file that vanished since the
/// listing counts as already deleted.
fn delete_oldest(files: &[PathBuf], mut count: usize) -> crate::error::Result<()> {
    let mut with_mtime: Vec<(SystemTime, &PathBuf)> = Vec::new();
    for file in files {
        match std::fs::metadata(file) {
            Ok(meta) => {
                let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                with_mtime.push((mtime, file));
            }
            Err(_) => count = count.saturating_sub(1),
        }
    }
    with_mtime.sort();

    for (_, file) in with_mtime.iter().take(count) {
        paths::remove_any(file)?;
    }
    Ok(())
}

// ─── Tests ────────────────────────────────────────────────────────────────────
