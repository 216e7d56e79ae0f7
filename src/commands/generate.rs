//! `rotbak generate` — scaffold a job-config fragment.
//!
//! Emits a ready-to-edit jobs fragment (a YAML sequence with one job) with
//! one storage block per requested kind, written with owner-only
//! permissions because storage blocks carry credentials.  The fragment is
//! meant to be pulled into the main config with `!include`.

use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use anyhow::{bail, Context, Result};
use console::style;

const BACKUP_TYPES: &[&str] = &[
    "mysql",
    "mysql_xtrabackup",
    "postgresql",
    "postgresql_basebackup",
    "mongodb",
    "redis",
    "desc_files",
    "inc_files",
    "external",
];

const STORAGE_KINDS: &[&str] = &["local", "scp", "ftp", "smb", "nfs", "webdav", "s3"];

pub fn run(backup_type: &str, storages: &[String], path: &Path) -> Result<()> {
    if !BACKUP_TYPES.contains(&backup_type) {
        bail!(
            "unsupported backup type '{backup_type}'; expected one of: {}",
            BACKUP_TYPES.join(", ")
        );
    }
    for storage in storages {
        if !STORAGE_KINDS.contains(&storage.as_str()) {
            bail!(
                "unsupported storage '{storage}'; expected one of: {}",
                STORAGE_KINDS.join(", ")
            );
        }
    }

    let mut content = job_template(backup_type);
    if backup_type != "external" {
        content.push_str("  storages:\n");
        for storage in storages {
            content.push_str(&storage_snippet(storage, backup_type));
        }
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    std::fs::write(path, &content).with_context(|| format!("writing {}", path.display()))?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .with_context(|| format!("chmod 600 {}", path.display()))?;

    println!(
        "  {} Successfully generated '{}' configuration file!",
        style("✓").green().bold(),
        path.display()
    );
    Ok(())
}

fn job_template(backup_type: &str) -> String {
    let header = format!(
        "- job: project-{backup_type}\n  type: {backup_type}\n"
    );
    let body = match backup_type {
        "mysql" => "  tmp_dir: /var/rotbak/dump_tmp\n  sources:\n    - connect:\n        db_host: localhost\n        db_port: 3306\n        db_user: backup\n        db_password: ''\n      target: ['all']\n      excludes: ['information_schema', 'performance_schema']\n      gzip: true\n      is_slave: false\n      extra_keys: '--opt --add-drop-database'\n",
        "mysql_xtrabackup" => "  tmp_dir: /var/rotbak/dump_tmp\n  sources:\n    - connect:\n        db_user: backup\n        db_password: ''\n        path_to_conf: /etc/mysql/my.cnf\n      gzip: true\n      extra_keys: ''\n",
        "postgresql" => "  tmp_dir: /var/rotbak/dump_tmp\n  sources:\n    - connect:\n        db_host: localhost\n        db_port: 5432\n        db_user: backup\n        db_password: ''\n      target: ['all']\n      excludes: ['template0', 'template1']\n      gzip: true\n      extra_keys: ''\n",
        "postgresql_basebackup" => "  tmp_dir: /var/rotbak/dump_tmp\n  sources:\n    - connect:\n        db_host: localhost\n        db_port: 5432\n        db_user: replica\n        db_password: ''\n      gzip: true\n      extra_keys: ''\n",
        "mongodb" => "  tmp_dir: /var/rotbak/dump_tmp\n  sources:\n    - connect:\n        db_host: localhost\n        db_port: 27017\n        db_user: ''\n        db_password: ''\n      target_dbs: ['all']\n      target_collections: ['all']\n      exclude_dbs: ['admin', 'local']\n      exclude_collections: []\n      gzip: true\n      extra_keys: ''\n",
        "redis" => "  tmp_dir: /var/rotbak/dump_tmp\n  sources:\n    - connect:\n        db_host: localhost\n        db_port: 6379\n        db_password: ''\n      gzip: true\n",
        "desc_files" => "  tmp_dir: /var/rotbak/dump_tmp\n  sources:\n    - target: ['/var/www/*/data']\n      excludes: ['**/log', '**/tmp']\n      gzip: true\n",
        "inc_files" => "  sources:\n    - target: ['/var/www/*/data']\n      excludes: ['**/log', '**/tmp']\n      gzip: true\n",
        "external" => "  dump_cmd: /usr/local/bin/make-dump.sh\n  safety_backup: false\n",
        _ => unreachable!("validated above"),
    };
    format!("{header}{body}")
}

fn storage_snippet(storage: &str, backup_type: &str) -> String {
    let backup_dir = format!("/var/rotbak/{backup_type}/dump");
    let store = if backup_type == "inc_files" {
        // The incremental chain keeps its own month window.
        String::new()
    } else {
        "      store:\n        days: 7\n        weeks: 4\n        months: 6\n".to_string()
    };

    let fields = match storage {
        "local" => String::new(),
        "scp" => "      host: ''\n      port: 22\n      user: ''\n      password: ''\n      path_to_key: ''\n      remote_mount_point: ''\n".to_string(),
        "ftp" => "      host: ''\n      user: ''\n      password: ''\n".to_string(),
        "smb" => "      host: ''\n      port: 445\n      user: ''\n      password: ''\n      share: ''\n".to_string(),
        "nfs" => "      host: ''\n      remote_mount_point: ''\n      extra_keys: ''\n".to_string(),
        "webdav" => "      host: ''\n      port: 443\n      user: ''\n      password: ''\n".to_string(),
        "s3" => "      bucket_name: ''\n      access_key_id: ''\n      secret_access_key: ''\n      s3fs_opts: ''\n".to_string(),
        _ => unreachable!("validated above"),
    };

    format!(
        "    - storage: {storage}\n      enable: true\n      backup_dir: {backup_dir}\n{fields}{store}"
    )
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use crate::config::JobSpec;

    use super::*;

    fn parse_fragment(content: &str) -> Vec<JobSpec> {
        serde_yaml::from_str(content).expect("generated fragment must parse")
    }

    #[test]
    fn every_type_generates_a_parsable_fragment() {
        for backup_type in BACKUP_TYPES {
            let mut content = job_template(backup_type);
            if *backup_type != "external" {
                content.push_str("  storages:\n");
                content.push_str(&storage_snippet("local", backup_type));
                content.push_str(&storage_snippet("s3", backup_type));
            }
            let jobs = parse_fragment(&content);
            assert_eq!(jobs.len(), 1, "{backup_type}");
            assert_eq!(jobs[0].kind.tag(), *backup_type);
        }
    }

    #[test]
    fn inc_files_storages_carry_no_store_section() {
        let snippet = storage_snippet("local", "inc_files");
        assert!(!snippet.contains("store:"));
        let snippet = storage_snippet("scp", "desc_files");
        assert!(snippet.contains("store:"));
        assert!(snippet.contains("days: 7"));
    }

    #[test]
    fn generate_writes_a_private_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("conf.d/10-mysql.conf");

        run("mysql", &["local".into(), "scp".into()], &out).unwrap();

        assert!(out.is_file());
        let mode = std::fs::metadata(&out).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        parse_fragment(&std::fs::read_to_string(&out).unwrap());
    }

    #[test]
    fn unknown_type_or_storage_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("x.conf");
        assert!(run("floppy", &["local".into()], &out).is_err());
        assert!(run("mysql", &["carrier-pigeon".into()], &out).is_err());
    }
}
