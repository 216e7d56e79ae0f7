//! `postgresql_basebackup` job driver: one cluster-wide `pg_basebackup`
//! artifact per source.

use crate::config::ConnectSpec;
use crate::exec::exec_cmd;
use crate::jobs::{JobContext, Rotator};
use crate::paths;

/// Cluster-level `--dbname` fragment (no database path component).
pub fn dbname_arg(connect: &ConnectSpec) -> String {
    let port = connect.db_port.unwrap_or(5432);
    format!(
        " --dbname=postgresql://{}:{}@{}:{port}/ ",
        connect.db_user, connect.db_password, connect.db_host
    )
}

pub fn dump_cmd(dbname: &str, extra_keys: &str, out: &str, gzip: bool) -> String {
    if gzip {
        format!("pg_basebackup{dbname}{extra_keys} | gzip > {out}")
    } else {
        format!("pg_basebackup{dbname}{extra_keys} > {out}")
    }
}

fn has_auth(connect: &ConnectSpec) -> bool {
    !connect.db_user.is_empty() && !connect.db_host.is_empty() && !connect.db_password.is_empty()
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
        if !has_auth(connect) {
            ctx.log.error(
                job,
                "Can't find the authentication data, please fill in the required fields",
            );
            continue;
        }

        let artifact = paths::artifact_path(&tmp_dir, "basebackup", "tar", source.gzip, ctx.cal);
        let cmd = dump_cmd(
            &dbname_arg(connect),
            &source.extra_keys,
            &artifact.display().to_string(),
            source.gzip,
        );

        match exec_cmd(&cmd) {
            Ok(out) if !out.stderr.is_empty() => {
                ctx.log.error(
                    job,
                    &format!("Can't create postgresql basebackup in tmp directory:{}", out.stderr),
                );
            }
            Ok(out) if !out.success() => {
                ctx.log.error(
                    job,
                    &format!("Bad result code external process '{cmd}':'{}'", out.code),
                );
            }
            Ok(_) => {
                ctx.log
                    .info(job, "Successfully created postgresql basebackup in tmp directory.");
                rotator.produced(artifact, String::new());
            }
            Err(e) => ctx.log.error(job, &format!("{e}")),
        }
        rotator.end_target();
        rotator.end_source();
    }

    rotator.end_job();
    ctx.cleanup(&tmp_dir);
}

// ─── Tests ────────────────────────────────────────────────────────────────────
