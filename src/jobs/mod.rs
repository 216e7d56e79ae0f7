//! Per-kind job drivers.
//!
//! Every driver follows the same shape: read its parameters from the job
//! spec (logging what is missing and moving on), stage artifacts into a
//! per-run temporary directory, hand them to the rotation engine through
//! [`Rotator`] (which owns the deferred-copying policy), and clean the
//! staging directory up at the end.
//!
//! | File                        | Job kind                 |
//! |-----------------------------|--------------------------|
//! | `mysql.rs`                  | `mysql`                  |
//! | `mysql_xtrabackup.rs`       | `mysql_xtrabackup`       |
//! | `postgresql.rs`             | `postgresql`             |
//! | `postgresql_basebackup.rs`  | `postgresql_basebackup`  |
//! | `mongodb.rs`                | `mongodb`                |
//! | `redis.rs`                  | `redis`                  |
//! | `desc_files.rs`             | `desc_files`             |
//! | `inc_files.rs`              | `inc_files`              |
//! | `external.rs`               | `external`               |

pub mod desc_files;
pub mod external;
pub mod inc_files;
pub mod mongodb;
pub mod mysql;
pub mod mysql_xtrabackup;
pub mod postgresql;
pub mod postgresql_basebackup;
pub mod redis;

use std::path::{Path, PathBuf};

use crate::calendar::{Anchors, Calendar};
use crate::config::{JobKind, JobSpec, MainConfig};
use crate::error::{Error, Result};
use crate::logging::{Level, RunLog};
use crate::paths;
use crate::rotate;

/// Everything a driver needs for one job run.
pub struct JobContext<'a> {
    pub log: &'a RunLog,
    pub cal: &'a Calendar,
    pub anchors: Anchors,
    pub main: &'a MainConfig,
    pub spec: &'a JobSpec,
}

impl JobContext<'_> {
    pub fn name(&self) -> &str {
        &self.spec.job
    }

    /// The staging root: the job's `tmp_dir`, or the agent-wide fallback.
    fn tmp_root(&self) -> Result<PathBuf> {
        if !self.spec.tmp_dir.is_empty() {
            Ok(PathBuf::from(&self.spec.tmp_dir))
        } else if !self.main.general_path_to_all_tmp_dir.is_empty() {
            Ok(PathBuf::from(&self.main.general_path_to_all_tmp_dir))
        } else {
            Err(Error::Config(format!(
                "missing required key 'tmp_dir' in job '{}'",
                self.spec.job
            )))
        }
    }

    /// Create the per-run staging directory `<tmp_dir>/<type>_<stamp>/`.
    pub fn make_tmp_dir(&self) -> Result<PathBuf> {
        paths::job_tmp_dir(&self.tmp_root()?, self.spec.kind.tag(), self.cal)
    }

    /// Delete the staging directory and flush the davfs cache contents (the
    /// cache directory itself must survive for the next mount).
    pub fn cleanup(&self, tmp_dir: &Path) {
        if let Err(e) = paths::remove_any(tmp_dir) {
            self.log.error(self.name(), &format!("{e}"));
        }
        if let Err(e) = paths::clear_dir_contents(Path::new(paths::DAVFS_CACHE_DIR)) {
            self.log.write(Level::Warning, self.name(), &format!("{e}"));
        }
    }
}

/// Run the driver for the job's kind.
pub fn dispatch(ctx: &JobContext) {
    match ctx.spec.kind {
        JobKind::Mysql => mysql::run(ctx),
        JobKind::MysqlXtrabackup => mysql_xtrabackup::run(ctx),
        JobKind::Postgresql => postgresql::run(ctx),
        JobKind::PostgresqlBasebackup => postgresql_basebackup::run(ctx),
        JobKind::Mongodb => mongodb::run(ctx),
        JobKind::Redis => redis::run(ctx),
        JobKind::DescFiles => desc_files::run(ctx),
        JobKind::IncFiles => inc_files::run(ctx),
        JobKind::External => external::run(ctx),
    }
}

// ─── Deferred rotation ────────────────────────────────────────────────────────

/// Owns *when* produced artifacts are handed to the rotation engine.
///
/// `deferred_copying_level` 0 rotates immediately; 1 rotates when a source
/// target finishes; 2 when a source block finishes; 3 and up when the whole
/// job finishes.  `end_job` always drains what is left, so a driver that
/// forgets a boundary cannot lose artifacts.
pub struct Rotator<'a, 'b> {
    ctx: &'a JobContext<'b>,
    queue: Vec<(PathBuf, String)>,
}

impl<'a, 'b> Rotator<'a, 'b> {
    pub fn new(ctx: &'a JobContext<'b>) -> Self {
        Self { ctx, queue: Vec::new() }
    }

    fn level(&self) -> u8 {
        self.ctx.spec.deferred_copying_level
    }

    /// Register a staged artifact under `part_of_dir_path`.
    pub fn produced(&mut self, tmp_artifact: PathBuf, part_of_dir_path: String) {
        if self.level() == 0 {
            self.rotate_one(&tmp_artifact, &part_of_dir_path);
        } else {
            self.queue.push((tmp_artifact, part_of_dir_path));
        }
    }

    /// All artifacts of the current source target are produced.
    pub fn end_target(&mut self) {
        if self.level() == 1 {
            self.flush();
        }
    }

    /// All artifacts of the current source block are produced.
    pub fn end_source(&mut self) {
        if self.level() == 2 {
            self.flush();
        }
    }

    /// The job is done; anything still queued rotates now.
    pub fn end_job(&mut self) {
        self.flush();
    }

    fn flush(&mut self) {
        for (artifact, part) in std::mem::take(&mut self.queue) {
            self.rotate_one(&artifact, &part);
        }
    }

    fn rotate_one(&self, artifact: &Path, part: &str) {
        rotate::rotate_artifact(
            self.ctx.log,
            self.ctx.cal,
            &self.ctx.anchors,
            &self.ctx.spec.storages,
            part,
            artifact,
            self.ctx.name(),
            self.ctx.spec.safety_backup,
        );
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
