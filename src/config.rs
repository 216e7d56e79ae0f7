//! Configuration types and loading logic.
//!
//! The config file is a YAML document with a `main:` section (agent-wide
//! settings) and a `jobs:` list.  `!include`/`!import` tags pull fragments
//! in before deserialization, so large installations can keep one file per
//! job:
//!
//! ```yaml
//! main:
//!   admin_mail: admin@example.org
//!   log_file: /var/log/rotbak/rotbak.log
//!
//! jobs: !include [ "conf.d/*.conf" ]
//! ```
//!
//! Scalar includes splice one file, sequence operands are glob-expanded and
//! their (sequence) contents concatenated, mapping includes load one file
//! per value.  Cycles and runaway nesting are refused.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::calendar::Anchors;
use crate::error::{Error, Result};
use crate::globwalk::expand_glob;
use crate::logging::MailSettings;
use crate::storage::StorageSpec;

/// Maximum `!include` nesting before the loader assumes a cycle slipped by.
const MAX_INCLUDE_DEPTH: usize = 16;

// ─── Job model ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Mysql,
    MysqlXtrabackup,
    Postgresql,
    PostgresqlBasebackup,
    Mongodb,
    Redis,
    DescFiles,
    IncFiles,
    External,
}

/// Which block a job runs in (`all` runs files → databases → external).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobBlock {
    Files,
    Databases,
    External,
}

impl JobBlock {
    pub fn title(&self) -> &'static str {
        match self {
            JobBlock::Files => "files",
            JobBlock::Databases => "databases",
            JobBlock::External => "external",
        }
    }
}

impl JobKind {
    pub fn tag(&self) -> &'static str {
        match self {
            JobKind::Mysql => "mysql",
            JobKind::MysqlXtrabackup => "mysql_xtrabackup",
            JobKind::Postgresql => "postgresql",
            JobKind::PostgresqlBasebackup => "postgresql_basebackup",
            JobKind::Mongodb => "mongodb",
            JobKind::Redis => "redis",
            JobKind::DescFiles => "desc_files",
            JobKind::IncFiles => "inc_files",
            JobKind::External => "external",
        }
    }

    pub fn block(&self) -> JobBlock {
        match self {
            JobKind::DescFiles | JobKind::IncFiles => JobBlock::Files,
            JobKind::External => JobBlock::External,
            _ => JobBlock::Databases,
        }
    }
}

/// Database connection parameters.  Which fields matter depends on the job
/// kind; drivers report what they miss.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConnectSpec {
    #[serde(default)]
    pub db_host: String,
    #[serde(default)]
    pub db_port: Option<u16>,
    #[serde(default)]
    pub socket: String,
    #[serde(default)]
    pub db_user: String,
    #[serde(default)]
    pub db_password: String,
    #[serde(default)]
    pub auth_file: String,
    #[serde(default)]
    pub path_to_conf: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SourceSpec {
    #[serde(default)]
    pub connect: Option<ConnectSpec>,
    #[serde(default)]
    pub target: Vec<String>,
    #[serde(default)]
    pub target_dbs: Vec<String>,
    #[serde(default)]
    pub target_collections: Vec<String>,
    #[serde(default)]
    pub excludes: Vec<String>,
    #[serde(default)]
    pub exclude_dbs: Vec<String>,
    #[serde(default)]
    pub exclude_collections: Vec<String>,
    #[serde(default)]
    pub gzip: bool,
    #[serde(default)]
    pub extra_keys: String,
    #[serde(default)]
    pub is_slave: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobSpec {
    pub job: String,
    #[serde(rename = "type")]
    pub kind: JobKind,
    #[serde(default)]
    pub tmp_dir: String,
    #[serde(default)]
    pub sources: Vec<SourceSpec>,
    #[serde(default)]
    pub storages: Vec<StorageSpec>,
    #[serde(default)]
    pub safety_backup: bool,
    #[serde(default)]
    pub deferred_copying_level: u8,
    #[serde(default = "default_months_to_store")]
    pub inc_months_to_store: u32,
    #[serde(default)]
    pub dump_cmd: String,
    #[serde(default)]
    pub skip_backup_rotate: bool,
}

// ─── Main section ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MainConfig {
    pub admin_mail: String,
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    #[serde(default)]
    pub client_mail: Vec<String>,
    #[serde(default)]
    pub level_message: String,
    #[serde(default)]
    pub mail_from: String,
    #[serde(default)]
    pub server_name: String,
    // Accepted for compatibility; resource limiting is out of scope.
    #[serde(default)]
    pub block_io_write: Option<String>,
    #[serde(default)]
    pub block_io_read: Option<String>,
    #[serde(default, alias = "blkio_weight")]
    pub block_io_weight: Option<String>,
    #[serde(default)]
    pub cpu_shares: Option<String>,
    #[serde(default)]
    pub general_path_to_all_tmp_dir: String,
    #[serde(default)]
    pub smtp_server: Option<String>,
    #[serde(default)]
    pub smtp_port: Option<u16>,
    #[serde(default)]
    pub smtp_ssl: Option<bool>,
    #[serde(default)]
    pub smtp_tls: Option<bool>,
    #[serde(default)]
    pub smtp_user: Option<String>,
    #[serde(default)]
    pub smtp_password: Option<String>,
    #[serde(default)]
    pub smtp_timeout: Option<u64>,
    /// Seconds to keep retrying the instance lock; absent = fail fast.
    #[serde(default)]
    pub loop_timeout: Option<u64>,
    /// Poll interval while waiting for the lock.
    #[serde(default = "default_loop_interval")]
    pub loop_interval: u64,
    #[serde(default = "default_dow_backup")]
    pub dow_backup: u32,
    #[serde(default = "default_dom_backup")]
    pub dom_backup: u32,
}

impl MainConfig {
    pub fn anchors(&self) -> Anchors {
        Anchors {
            dow: self.dow_backup,
            dom: self.dom_backup,
        }
    }

    pub fn mail_settings(&self) -> MailSettings {
        MailSettings {
            admin_mail: self.admin_mail.clone(),
            client_mail: self.client_mail.clone(),
            mail_from: self.mail_from.clone(),
            server_name: self.server_name.clone(),
            level_message: self.level_message.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub main: MainConfig,
    #[serde(default)]
    pub jobs: Vec<JobSpec>,
}

// ─── Defaults ─────────────────────────────────────────────────────────────────

// Free functions because `#[serde(default = "…")]` cannot call
// `Default::default()` per field.

fn default_log_file() -> PathBuf {
    PathBuf::from("/var/log/rotbak/rotbak.log")
}

fn default_loop_interval() -> u64 {
    30
}

fn default_dow_backup() -> u32 {
    4
}

fn default_dom_backup() -> u32 {
    5
}

fn default_months_to_store() -> u32 {
    12
}

// ─── Loader ───────────────────────────────────────────────────────────────────

/// Read, include-expand, parse, and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut stack = Vec::new();
    let value = load_value(path, &mut stack)?;
    let config: Config = serde_yaml::from_value(value)
        .map_err(|e| Error::Config(format!("parsing {}: {e}", path.display())))?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &Config) -> Result<()> {
    if config.main.admin_mail.is_empty() {
        return Err(Error::Config(
            "field 'admin_mail' in 'main' section can't be empty!".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for job in &config.jobs {
        if job.job.is_empty() {
            return Err(Error::Config("a job with an empty name was found".to_string()));
        }
        if !seen.insert(job.job.as_str()) {
            return Err(Error::Config(format!(
                "duplicate job name '{}'. You must use a unique name for the job's name.",
                job.job
            )));
        }
        if job.kind == JobKind::IncFiles
            && !(1..=12).contains(&job.inc_months_to_store)
        {
            return Err(Error::Config(format!(
                "job '{}': 'inc_months_to_store' must be between 1 and 12",
                job.job
            )));
        }
    }
    Ok(())
}

/// Load one YAML file and resolve its include tags.  `stack` holds the
/// chain of files currently being expanded, for cycle detection.
fn load_value(path: &Path, stack: &mut Vec<PathBuf>) -> Result<Value> {
    let canonical = path
        .canonicalize()
        .map_err(|e| Error::Config(format!("no such file '{}': {e}", path.display())))?;
    if stack.contains(&canonical) {
        return Err(Error::Config(format!(
            "include cycle through '{}'",
            canonical.display()
        )));
    }
    if stack.len() >= MAX_INCLUDE_DEPTH {
        return Err(Error::Config(format!(
            "includes nested deeper than {MAX_INCLUDE_DEPTH} levels at '{}'",
            canonical.display()
        )));
    }

    let text = std::fs::read_to_string(&canonical)
        .map_err(|e| Error::Config(format!("can't read '{}': {e}", canonical.display())))?;
    let value: Value = serde_yaml::from_str(&text)
        .map_err(|e| Error::Config(format!("parsing '{}': {e}", canonical.display())))?;

    let root = canonical
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    stack.push(canonical);
    let resolved = resolve_includes(value, &root, stack);
    stack.pop();
    resolved
}

fn is_include_tag(tag: &serde_yaml::value::Tag) -> bool {
    let name = tag.to_string();
    matches!(name.trim_start_matches('!'), "include" | "import")
}

fn resolve_includes(value: Value, root: &Path, stack: &mut Vec<PathBuf>) -> Result<Value> {
    match value {
        Value::Tagged(tagged) if is_include_tag(&tagged.tag) => {
            expand_include(tagged.value, root, stack)
        }
        Value::Mapping(mapping) => {
            let mut resolved = serde_yaml::Mapping::new();
            for (key, val) in mapping {
                resolved.insert(key, resolve_includes(val, root, stack)?);
            }
            Ok(Value::Mapping(resolved))
        }
        Value::Sequence(seq) => {
            let mut resolved = Vec::with_capacity(seq.len());
            for val in seq {
                resolved.push(resolve_includes(val, root, stack)?);
            }
            Ok(Value::Sequence(resolved))
        }
        other => Ok(other),
    }
}

fn expand_include(operand: Value, root: &Path, stack: &mut Vec<PathBuf>) -> Result<Value> {
    match operand {
        // `!include file.yml` — splice one document.
        Value::String(name) => load_value(&absolute(&name, root), stack),

        // `!include [a.yml, jobs/*.yml]` — expand globs, concatenate the
        // included sequences.
        Value::Sequence(items) => {
            let mut merged = Vec::new();
            for item in items {
                let Value::String(pattern) = item else {
                    return Err(Error::Config(
                        "!include sequence operands must be strings".to_string(),
                    ));
                };
                let pattern = absolute(&pattern, root);
                let mut matched = expand_glob(&pattern.display().to_string());
                if matched.is_empty() && pattern.exists() {
                    matched.push(pattern.clone());
                }
                for file in matched {
                    match load_value(&file, stack)? {
                        Value::Sequence(mut inner) => merged.append(&mut inner),
                        other => merged.push(other),
                    }
                }
            }
            Ok(Value::Sequence(merged))
        }

        // `!include {key: file.yml}` — one included document per value.
        Value::Mapping(map) => {
            let mut resolved = serde_yaml::Mapping::new();
            for (key, val) in map {
                let Value::String(name) = val else {
                    return Err(Error::Config(
                        "!include mapping values must be strings".to_string(),
                    ));
                };
                resolved.insert(key, load_value(&absolute(&name, root), stack)?);
            }
            Ok(Value::Mapping(resolved))
        }

        _ => Err(Error::Config(
            "unrecognised node type in !include statement".to_string(),
        )),
    }
}

fn absolute(name: &str, root: &Path) -> PathBuf {
    if name.starts_with('/') {
        PathBuf::from(name)
    } else {
        root.join(name)
    }
}

// ─── Selector ─────────────────────────────────────────────────────────────────

/// Jobs selected by a CLI selector, in execution order.
pub fn select_jobs<'a>(config: &'a Config, selector: &str) -> Result<Vec<&'a JobSpec>> {
    let by_block = |block: JobBlock| {
        config
            .jobs
            .iter()
            .filter(move |j| j.kind.block() == block)
    };

    let selected: Vec<&JobSpec> = match selector {
        "all" => by_block(JobBlock::Files)
            .chain(by_block(JobBlock::Databases))
            .chain(by_block(JobBlock::External))
            .collect(),
        "files" => by_block(JobBlock::Files).collect(),
        "databases" => by_block(JobBlock::Databases).collect(),
        "external" => by_block(JobBlock::External).collect(),
        name => {
            let job = config
                .jobs
                .iter()
                .find(|j| j.job == name)
                .ok_or_else(|| {
                    let known: Vec<&str> = config.jobs.iter().map(|j| j.job.as_str()).collect();
                    Error::Config(format!(
                        "only one of this job's name is allowed: {}, all, files, databases, external",
                        known.join(", ")
                    ))
                })?;
            vec![job]
        }
    };
    Ok(selected)
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    const MINIMAL: &str = "
main:
  admin_mail: admin@example.org

jobs: []
";

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn minimal_config_parses_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "rotbak.conf", MINIMAL);

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.main.admin_mail, "admin@example.org");
        assert_eq!(cfg.main.log_file, PathBuf::from("/var/log/rotbak/rotbak.log"));
        assert_eq!(cfg.main.loop_interval, 30);
        assert_eq!(cfg.main.anchors().dow, 4);
        assert_eq!(cfg.main.anchors().dom, 5);
        assert!(cfg.jobs.is_empty());
    }

    #[test]
    fn empty_admin_mail_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "rotbak.conf", "main:\n  admin_mail: ''\njobs: []\n");
        assert!(matches!(load_config(&path), Err(Error::Config(_))));
    }

    #[test]
    fn duplicate_job_names_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "rotbak.conf",
            "
main:
  admin_mail: a@b.c
jobs:
  - job: twice
    type: desc_files
  - job: twice
    type: external
",
        );
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("duplicate job name"));
    }

    #[test]
    fn unknown_job_type_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "rotbak.conf",
            "main:\n  admin_mail: a@b.c\njobs:\n  - job: x\n    type: floppy\n",
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn job_fields_deserialize() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "rotbak.conf",
            "
main:
  admin_mail: a@b.c
jobs:
  - job: site-files
    type: desc_files
    tmp_dir: /var/tmp/rotbak
    safety_backup: true
    deferred_copying_level: 2
    sources:
      - target: ['/var/www/*']
        excludes: ['**/cache']
        gzip: true
    storages:
      - storage: local
        backup_dir: /backup
        store:
          days: 7
          weeks: 4
          month: 6
",
        );
        let cfg = load_config(&path).unwrap();
        let job = &cfg.jobs[0];
        assert_eq!(job.kind, JobKind::DescFiles);
        assert!(job.safety_backup);
        assert_eq!(job.deferred_copying_level, 2);
        assert_eq!(job.inc_months_to_store, 12);
        assert_eq!(job.storages[0].store.months, 6);
        assert!(job.sources[0].gzip);
    }

    #[test]
    fn scalar_include_splices_a_mapping() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.conf", "admin_mail: a@b.c\nserver_name: web01\n");
        let path = write(dir.path(), "rotbak.conf", "main: !include main.conf\njobs: []\n");

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.main.server_name, "web01");
    }

    #[test]
    fn sequence_include_globs_and_concatenates() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "conf.d/10-files.conf",
            "- job: files-a\n  type: desc_files\n",
        );
        write(
            dir.path(),
            "conf.d/20-db.conf",
            "- job: db-a\n  type: mysql\n",
        );
        let path = write(
            dir.path(),
            "rotbak.conf",
            "main:\n  admin_mail: a@b.c\njobs: !include [ 'conf.d/*.conf' ]\n",
        );

        let cfg = load_config(&path).unwrap();
        let names: Vec<&str> = cfg.jobs.iter().map(|j| j.job.as_str()).collect();
        assert_eq!(names, vec!["files-a", "db-a"]);
    }

    #[test]
    fn import_is_an_alias_for_include() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "jobs.conf", "- job: only\n  type: external\n");
        let path = write(
            dir.path(),
            "rotbak.conf",
            "main:\n  admin_mail: a@b.c\njobs: !import jobs.conf\n",
        );
        assert_eq!(load_config(&path).unwrap().jobs.len(), 1);
    }

    #[test]
    fn include_cycles_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.conf", "jobs: !include b.conf\n");
        write(dir.path(), "b.conf", "!include a.conf\n");
        let path = write(
            dir.path(),
            "rotbak.conf",
            "main:\n  admin_mail: a@b.c\njobs: !include a.conf\n",
        );

        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("cycle"), "{err}");
    }

    #[test]
    fn selector_all_orders_files_databases_external() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "rotbak.conf",
            "
main:
  admin_mail: a@b.c
jobs:
  - job: ext
    type: external
  - job: db
    type: postgresql
  - job: files
    type: inc_files
",
        );
        let cfg = load_config(&path).unwrap();

        let order: Vec<&str> = select_jobs(&cfg, "all")
            .unwrap()
            .iter()
            .map(|j| j.job.as_str())
            .collect();
        assert_eq!(order, vec!["files", "db", "ext"]);

        assert_eq!(select_jobs(&cfg, "db").unwrap().len(), 1);
        assert!(select_jobs(&cfg, "no-such-job").is_err());
    }
}
