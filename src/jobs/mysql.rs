//! `mysql` job driver: per-database `mysqldump` artifacts.

use crate::config::ConnectSpec;
use crate::exec::exec_cmd;
use crate::jobs::{JobContext, Rotator};
use crate::paths;

/// The 5.6/5.7 client prints this for every password passed on the command
/// line; it is noise, not a failure.
const INSECURE_PASSWORD_WARNING: &str =
    "Using a password on the command line interface can be insecure";

/// Whether mysqldump/mysql stderr is an actual error.
pub fn is_real_mysql_err(stderr: &str) -> bool {
    !stderr.is_empty() && !stderr.contains(INSECURE_PASSWORD_WARNING)
}

/// Auth fragment shared by `mysql` and `mysqldump` invocations.
pub fn auth_args(connect: &ConnectSpec) -> Option<String> {
    if !connect.auth_file.is_empty() {
        return Some(format!(" --defaults-extra-file={} ", connect.auth_file));
    }
    if connect.db_user.is_empty() || connect.db_password.is_empty() {
        return None;
    }
    let port = connect.db_port.unwrap_or(3306);
    if !connect.db_host.is_empty() {
        Some(format!(
            " --host={} --port={port} --user={} --password={} ",
            connect.db_host, connect.db_user, connect.db_password
        ))
    } else if !connect.socket.is_empty() {
        Some(format!(
            " --socket={} --user={} --password={} ",
            connect.socket, connect.db_user, connect.db_password
        ))
    } else {
        None
    }
}

pub fn dump_cmd(auth: &str, extra_keys: &str, db: &str, out: &str, gzip: bool) -> String {
    if gzip {
        format!("mysqldump{auth}{extra_keys} {db} | gzip > {out}")
    } else {
        format!("mysqldump{auth}{extra_keys} {db} > {out}")
    }
}

fn list_databases(auth: &str) -> Result<Vec<String>, String> {
    let out = exec_cmd(&format!("mysql{auth} -N -B -e \"SHOW DATABASES\""))
        .map_err(|e| e.to_string())?;
    if is_real_mysql_err(&out.stderr) || !out.success() {
        return Err(out.stderr);
    }
    Ok(out
        .stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

fn set_slave(auth: &str, running: bool) -> Result<(), String> {
    let statement = if running { "START SLAVE" } else { "STOP SLAVE" };
    let out =
        exec_cmd(&format!("mysql{auth} -e \"{statement}\"")).map_err(|e| e.to_string())?;
    if is_real_mysql_err(&out.stderr) || !out.success() {
        return Err(out.stderr);
    }
    Ok(())
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

        let mut targets = source.target.clone();
        if targets.iter().any(|t| t == "all") {
            match list_databases(&auth) {
                Ok(all) => targets = all,
                Err(e) => {
                    ctx.log
                        .error(job, &format!("Can't connect to MySQL instance: {e}"));
                    continue;
                }
            }
        }

        if source.is_slave {
            if let Err(e) = set_slave(&auth, false) {
                ctx.log.error(job, &format!("Can't stop slave: {e}"));
            }
        }

        for db in targets.iter().filter(|db| !source.excludes.contains(*db)) {
            let artifact = paths::artifact_path(&tmp_dir, db, "sql", source.gzip, ctx.cal);
            let cmd = dump_cmd(
                &auth,
                &source.extra_keys,
                db,
                &artifact.display().to_string(),
                source.gzip,
            );

            match exec_cmd(&cmd) {
                Ok(out) if is_real_mysql_err(&out.stderr) => {
                    ctx.log.error(
                        job,
                        &format!("Can't create '{db}' database dump in tmp directory:{}", out.stderr),
                    );
                }
                Ok(out) if !out.success() => {
                    ctx.log.error(
                        job,
                        &format!("Bad result code external process '{cmd}':'{}'", out.code),
                    );
                }
                Ok(_) => {
                    ctx.log.info(
                        job,
                        &format!("Successfully created '{db}' database dump in tmp directory."),
                    );
                    rotator.produced(artifact, db.clone());
                }
                Err(e) => ctx.log.error(job, &format!("{e}")),
            }
            rotator.end_target();
        }

        if source.is_slave {
            if let Err(e) = set_slave(&auth, true) {
                ctx.log.error(job, &format!("Can't start slave: {e}"));
            }
        }
        rotator.end_source();
    }

    rotator.end_job();
    ctx.cleanup(&tmp_dir);
}

// ─── Tests ────────────────────────────────────────────────────────────────────
