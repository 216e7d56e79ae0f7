//! `redis` job driver: RDB snapshots via `redis-cli --rdb`.
//!
//! redis-cli cannot stream its RDB output through a pipe, so gzip is a
//! second step over the finished dump and the raw file is removed after.

use crate::config::ConnectSpec;
use crate::exec::exec_cmd;
use crate::jobs::{JobContext, Rotator};
use crate::{archive, paths};

/// `-h/-p` or `-s` fragment, with `-a` when a password is set.
pub fn auth_args(connect: &ConnectSpec) -> Option<String> {
    let port = connect.db_port.unwrap_or(6379);
    if !connect.db_host.is_empty() {
        Some(if connect.db_password.is_empty() {
            format!(" -h {} -p {port} ", connect.db_host)
        } else {
            format!(" -h {} -p {port} -a '{}' ", connect.db_host, connect.db_password)
        })
    } else if !connect.socket.is_empty() {
        Some(if connect.db_password.is_empty() {
            format!(" -s {} ", connect.socket)
        } else {
            format!(" -s {} -a '{}' ", connect.socket, connect.db_password)
        })
    } else {
        None
    }
}

pub fn dump_cmd(auth: &str, out: &str) -> String {
    format!("redis-cli{auth}--rdb {out}")
}

fn is_reachable(auth: &str) -> Result<(), String> {
    let out = exec_cmd(&format!("redis-cli{auth}ping")).map_err(|e| e.to_string())?;
    if out.success() && out.stdout.contains("PONG") {
        Ok(())
    } else if out.stderr.is_empty() {
        Err(out.stdout)
    } else {
        Err(out.stderr)
    }
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
                "Can't find the authentication data, please fill in the required fields",
            );
            continue;
        };

        if let Err(e) = is_reachable(&auth) {
            ctx.log
                .error(job, &format!("Can't connect to Redis instance: {e}"));
            continue;
        }

        let artifact = paths::artifact_path(&tmp_dir, "redis", "rdb", source.gzip, ctx.cal);
        // The uncompressed dump target: final path minus the `.gz`.
        let raw_dump = paths::artifact_path(&tmp_dir, "redis", "rdb", false, ctx.cal);

        let cmd = dump_cmd(&auth, &raw_dump.display().to_string());
        match exec_cmd(&cmd) {
            Ok(out) if !out.success() => {
                ctx.log.error(
                    job,
                    &format!(
                        "Can't create redis database dump '{}' in tmp directory:{}",
                        raw_dump.display(),
                        out.stderr
                    ),
                );
            }
            Ok(_) => {
                let staged = if source.gzip {
                    let gzipped = archive::gzip_file(&raw_dump, &artifact);
                    let _ = paths::remove_any(&raw_dump);
                    match gzipped {
                        Ok(()) => true,
                        Err(e) => {
                            ctx.log.error(
                                job,
                                &format!(
                                    "Can't gzip redis database dump '{}' in tmp directory:{e}.",
                                    raw_dump.display()
                                ),
                            );
                            false
                        }
                    }
                } else {
                    true
                };
                if staged {
                    ctx.log.info(
                        job,
                        &format!(
                            "Successfully created redis database dump '{}' in tmp directory.",
                            artifact.display()
                        ),
                    );
                    rotator.produced(artifact, String::new());
                }
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
