//! `mysql_xtrabackup` job driver: physical InnoDB backups via
//! `innobackupex`.
//!
//! The tool streams the backup to stdout and reports through stderr, which
//! is captured into a per-run status file; the run only counts as good when
//! the status file ends in `completed OK!`.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::config::ConnectSpec;
use crate::exec::exec_cmd;
use crate::jobs::{JobContext, Rotator};
use crate::paths;

pub const STATUS_DIR: &str = "/tmp/xtrabackup_status";

/// Status files older than this are purged on the first of the month.
const STATUS_MAX_AGE: Duration = Duration::from_secs(31 * 24 * 3600);

pub fn auth_args(connect: &ConnectSpec) -> Option<String> {
    if connect.path_to_conf.is_empty()
        || connect.db_user.is_empty()
        || connect.db_password.is_empty()
    {
        return None;
    }
    Some(format!(
        "--defaults-file={} --user={} --password={}",
        connect.path_to_conf, connect.db_user, connect.db_password
    ))
}

pub fn dump_cmd(auth: &str, extra_keys: &str, status_file: &str, out: &str, gzip: bool) -> String {
    if gzip {
        format!("innobackupex {auth} {extra_keys} 2>{status_file} | gzip > {out}")
    } else {
        format!("innobackupex {auth} {extra_keys} > {out} 2>{status_file}")
    }
}

/// The final status line decides: `completed OK!` or it did not happen.
pub fn status_reports_success(status_text: &str) -> bool {
    status_text
        .lines()
        .last()
        .map(|line| line.to_lowercase().contains("completed ok!"))
        .unwrap_or(false)
}

fn purge_old_status_files(dir: &Path) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    let cutoff = SystemTime::now() - STATUS_MAX_AGE;
    for entry in entries.flatten() {
        let Ok(meta) = entry.metadata() else { continue };
        if meta.modified().map(|m| m < cutoff).unwrap_or(false) {
            let _ = paths::remove_any(&entry.path());
        }
    }
}

fn status_file_for(ctx: &JobContext) -> PathBuf {
    Path::new(STATUS_DIR).join(format!("{}.log", ctx.cal.artifact_stamp()))
}

pub fn run(ctx: &JobContext) {
    let job = ctx.name();
    let tmp_dir = match ctx.make_tmp_dir() {
        Ok(dir) => dir,
        Err(e) => {
            ctx.log.error(job, &format!("{e}"));
            return;
        }
    };
    let mut rotator = Rotator::new(ctx);

    for source in &ctx.spec.sources {
        let Some(connect) = source.connect.as_ref() else {
            ctx.log.error(job, "Missing required key:'connect'!");
            continue;
        };
        let Some(auth) = auth_args(connect) else {
            ctx.log.error(
                job,
                "Can't find the authentication data, please fill the required fields",
            );
            continue;
        };
        if !Path::new(&connect.path_to_conf).is_file() {
            ctx.log.error(
                job,
                &format!("Configuration file '{}' not found!", connect.path_to_conf),
            );
            continue;
        }

        if ctx.cal.dom() == 1 {
            purge_old_status_files(Path::new(STATUS_DIR));
        }

        let status_file = status_file_for(ctx);
        if let Err(e) = paths::create_dirs(Path::new(STATUS_DIR)) {
            ctx.log.error(job, &format!("{e}"));
            continue;
        }

        let artifact = paths::artifact_path(&tmp_dir, "xtrabackup", "tar", source.gzip, ctx.cal);
        let cmd = dump_cmd(
            &auth,
            &source.extra_keys,
            &status_file.display().to_string(),
            &artifact.display().to_string(),
            source.gzip,
        );

        let code = match exec_cmd(&cmd) {
            Ok(out) => out.code,
            Err(e) => {
                ctx.log.error(job, &format!("{e}"));
                continue;
            }
        };

        let status_ok = std::fs::read_to_string(&status_file)
            .map(|text| status_reports_success(&text))
            .unwrap_or(false);
        if !status_ok {
            ctx.log.error(
                job,
                &format!(
                    "Can't create xtrabackup in tmp directory! More information in status file {}.",
                    status_file.display()
                ),
            );
        } else if code != 0 {
            ctx.log.error(
                job,
                &format!("Bad result code external process '{cmd}':'{code}'"),
            );
        } else {
            ctx.log
                .info(job, "Successfully created xtrabackup in tmp directory.");
            rotator.produced(artifact, String::new());
        }
        rotator.end_target();
        rotator.end_source();
    }

    rotator.end_job();
    ctx.cleanup(&tmp_dir);
}

// ─── Tests ────────────────────────────────────────────────────────────────────
