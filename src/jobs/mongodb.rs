//! `mongodb` job driver: one `mongodump` artifact per `(db, collection)`.
//!
//! mongodump chatters on stderr even when everything works; only lines
//! matching `failed` (any case) count as errors.

use crate::config::ConnectSpec;
use crate::exec::exec_cmd;
use crate::jobs::{JobContext, Rotator};
use crate::paths;

pub fn is_real_mongo_err(stderr: &str) -> bool {
    stderr.to_lowercase().contains("failed")
}

/// `--host … --port … [--username … --password …]` fragment for mongodump.
pub fn auth_args(connect: &ConnectSpec) -> String {
    let port = connect.db_port.unwrap_or(27017);
    if connect.db_user.is_empty() {
        format!(" --host {} --port {port} ", connect.db_host)
    } else {
        format!(
            " --host {} --port {port} --username {} --password {} ",
            connect.db_host, connect.db_user, connect.db_password
        )
    }
}

/// `mongodb://…` URI for mongosh enumeration calls.
pub fn connection_uri(connect: &ConnectSpec, db: &str) -> String {
    let port = connect.db_port.unwrap_or(27017);
    if connect.db_user.is_empty() {
        format!("mongodb://{}:{port}/{db}", connect.db_host)
    } else {
        format!(
            "mongodb://{}:{}@{}:{port}/{db}",
            connect.db_user, connect.db_password, connect.db_host
        )
    }
}

pub fn dump_cmd(db: &str, extra_keys: &str, auth: &str, collection: &str, out: &str, gzip: bool) -> String {
    if gzip {
        format!("mongodump --db {db} {extra_keys}{auth}--collection {collection} --out - | gzip > {out}")
    } else {
        format!("mongodump --db {db} {extra_keys}{auth}--collection {collection} --out - > {out}")
    }
}

/// Auth is either absent or complete (user and password together).
fn has_auth(connect: &ConnectSpec) -> bool {
    !connect.db_host.is_empty()
        && (connect.db_user.is_empty() == connect.db_password.is_empty())
}

fn mongosh_eval(uri: &str, eval: &str) -> Result<Vec<String>, String> {
    let out = exec_cmd(&format!("mongosh --quiet \"{uri}\" --eval '{eval}'"))
        .map_err(|e| e.to_string())?;
    if !out.success() {
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

fn list_databases(connect: &ConnectSpec) -> Result<Vec<String>, String> {
    mongosh_eval(
        &connection_uri(connect, ""),
        r#"db.getMongo().getDBNames().join("\n")"#,
    )
}

fn list_collections(connect: &ConnectSpec, db: &str) -> Result<Vec<String>, String> {
    mongosh_eval(
        &connection_uri(connect, db),
        r#"db.getCollectionNames().join("\n")"#,
    )
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
        let auth = auth_args(connect);

        let mut target_dbs = source.target_dbs.clone();
        if target_dbs.iter().any(|d| d == "all") {
            match list_databases(connect) {
                Ok(all) => target_dbs = all,
                Err(e) => {
                    ctx.log
                        .error(job, &format!("Can't connect to MongoDB instance: {e}"));
                    continue;
                }
            }
        }

        for db in target_dbs.iter().filter(|db| !source.exclude_dbs.contains(*db)) {
            let collections = match list_collections(connect, db) {
                Ok(all) => all,
                Err(e) => {
                    ctx.log
                        .error(job, &format!("Can't connect to MongoDB instance: {e}"));
                    continue;
                }
            };
            let wanted: Vec<String> =
                if source.target_collections.iter().any(|c| c == "all") {
                    collections.clone()
                } else {
                    source.target_collections.clone()
                };

            for collection in wanted.iter().filter(|c| {
                !source.exclude_collections.contains(*c) && collections.contains(*c)
            }) {
                let artifact =
                    paths::artifact_path(&tmp_dir, collection, "mongodump", source.gzip, ctx.cal);
                let cmd = dump_cmd(
                    db,
                    &source.extra_keys,
                    &auth,
                    collection,
                    &artifact.display().to_string(),
                    source.gzip,
                );

                match exec_cmd(&cmd) {
                    Ok(out) if is_real_mongo_err(&out.stderr) => {
                        ctx.log.error(
                            job,
                            &format!(
                                "Can't create collection '{collection}' in '{db}' database dump \
                                 in tmp directory:{}",
                                out.stderr
                            ),
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
                            &format!(
                                "Successfully created collection '{collection}' in '{db}' \
                                 database dump in tmp directory."
                            ),
                        );
                        rotator.produced(artifact, format!("{db}/{collection}"));
                    }
                    Err(e) => ctx.log.error(job, &format!("{e}")),
                }
            }
            rotator.end_target();
        }
        rotator.end_source();
    }

    rotator.end_job();
    ctx.cleanup(&tmp_dir);
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn connect(user: &str, password: &str) -> ConnectSpec {
        ConnectSpec {
            db_host: "mongo.lan".into(),
            db_port: None,
            socket: String::new(),
            db_user: user.into(),
            db_password: password.into(),
            auth_file: String::new(),
            path_to_conf: String::new(),
        }
    }

    #[test]
    fn only_failed_lines_are_errors() {
        assert!(is_real_mongo_err("Failed: error dumping metadata"));
        assert!(is_real_mongo_err("connection failed"));
        assert!(!is_real_mongo_err("writing app.users to stdout"));
        assert!(!is_real_mongo_err(""));
    }

    #[test]
    fn auth_with_and_without_credentials() {
        assert_eq!(auth_args(&connect("", "")), " --host mongo.lan --port 27017 ");
        assert_eq!(
            auth_args(&connect("admin", "pw")),
            " --host mongo.lan --port 27017 --username admin --password pw "
        );
    }

    #[test]
    fn uri_forms() {
        assert_eq!(connection_uri(&connect("", ""), ""), "mongodb://mongo.lan:27017/");
        assert_eq!(
            connection_uri(&connect("admin", "pw"), "app"),
            "mongodb://admin:pw@mongo.lan:27017/app"
        );
    }

    #[test]
    fn half_configured_credentials_are_rejected() {
        assert!(has_auth(&connect("", "")));
        assert!(has_auth(&connect("admin", "pw")));
        assert!(!has_auth(&connect("admin", "")));
        assert!(!has_auth(&connect("", "pw")));
    }

    #[test]
    fn dump_cmd_streams_one_collection() {
        let auth = auth_args(&connect("", ""));
        insta::assert_snapshot!(
            dump_cmd("app", "", &auth, "users", "/tmp/users.mongodump.gz", true),
            @"mongodump --db app  --host mongo.lan --port 27017 --collection users --out - | gzip > /tmp/users.mongodump.gz"
        );
    }
}
