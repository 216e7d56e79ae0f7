//! Storage kinds, per-kind validation, and path translation.
//!
//! A raw `StorageSpec` comes straight from the config file.  `validate`
//! turns it into a `StorageData` with every field the mount layer and the
//! rotation engine need, rejecting incomplete specs up front so a job never
//! half-mounts a destination.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Local,
    Scp,
    Ftp,
    Smb,
    Nfs,
    Webdav,
    S3,
}

impl StorageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::Local => "local",
            StorageKind::Scp => "scp",
            StorageKind::Ftp => "ftp",
            StorageKind::Smb => "smb",
            StorageKind::Nfs => "nfs",
            StorageKind::Webdav => "webdav",
            StorageKind::S3 => "s3",
        }
    }

    /// Well-known mount point for the kind.  Empty for local.
    pub fn mount_point(&self) -> &'static str {
        match self {
            StorageKind::Local => "",
            StorageKind::Scp => "/mnt/sshfs",
            StorageKind::Ftp => "/mnt/curlftpfs",
            StorageKind::Smb => "/mnt/smbfs",
            StorageKind::Nfs => "/mnt/nfs",
            StorageKind::Webdav => "/mnt/davfs",
            StorageKind::S3 => "/mnt/s3",
        }
    }

    /// scp and nfs mount a parent export and treat `backup_dir` as a path on
    /// the remote side; the FUSE kinds treat `backup_dir` as a path below
    /// the mount point.
    pub fn mounts_backup_dir(&self) -> bool {
        matches!(self, StorageKind::Scp | StorageKind::Nfs)
    }
}

impl std::fmt::Display for StorageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retention triple.  `month` is accepted as an alias for compatibility
/// with configs written for the predecessor agent.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct RetentionSpec {
    #[serde(default)]
    pub days: u32,
    #[serde(default)]
    pub weeks: u32,
    #[serde(default, alias = "month")]
    pub months: u32,
}

/// One destination as written in the config file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageSpec {
    pub storage: StorageKind,
    #[serde(default = "default_enable")]
    pub enable: bool,
    #[serde(default)]
    pub backup_dir: String,
    #[serde(default)]
    pub store: RetentionSpec,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub path_to_key: String,
    #[serde(default)]
    pub remote_mount_point: String,
    #[serde(default)]
    pub extra_keys: String,
    #[serde(default)]
    pub share: String,
    #[serde(default)]
    pub bucket_name: String,
    #[serde(default)]
    pub access_key_id: String,
    #[serde(default)]
    pub secret_access_key: String,
    #[serde(default)]
    pub s3fs_opts: String,
}

fn default_enable() -> bool {
    true
}

/// Validated destination, ready to mount.
#[derive(Debug, Clone)]
pub struct StorageData {
    pub kind: StorageKind,
    pub backup_dir: String,
    pub retention: RetentionSpec,
    pub host: String,
    pub port: Option<u16>,
    pub user: String,
    pub password: String,
    pub path_to_key: String,
    pub remote_mount_point: String,
    pub extra_keys: String,
    pub share: String,
    pub bucket_name: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub s3fs_opts: String,
    /// Sub-path below the mount point when `remote_mount_point` mounts a
    /// parent of `backup_dir` (scp/nfs only).  Filled in by the mount layer.
    pub mount_sub_dir: String,
}

/// Enforce the per-kind required fields and produce a `StorageData`.
pub fn validate(job_name: &str, spec: &StorageSpec) -> Result<StorageData> {
    let kind = spec.storage;

    if spec.backup_dir.is_empty() {
        return Err(Error::Config(format!(
            "Field 'backup_dir' in job '{job_name}' for storage '{kind}' can't be empty!"
        )));
    }

    if !matches!(kind, StorageKind::Local | StorageKind::S3) && spec.host.is_empty() {
        return Err(Error::Config(format!(
            "Field 'host' in job '{job_name}' for storage '{kind}' can't be empty!"
        )));
    }

    if !matches!(kind, StorageKind::Local | StorageKind::Nfs | StorageKind::S3) {
        if spec.user.is_empty() {
            return Err(Error::Config(format!(
                "Field 'user' in job '{job_name}' for storage '{kind}' can't be empty!"
            )));
        }
        if kind == StorageKind::Scp {
            if spec.password.is_empty() && spec.path_to_key.is_empty() {
                return Err(Error::Config(format!(
                    "At least one of the fields 'path_to_key' or 'password' must be filled in \
                     job '{job_name}' for storage '{kind}'!"
                )));
            }
        } else if spec.password.is_empty() {
            return Err(Error::Config(format!(
                "Field 'password' in job '{job_name}' for storage '{kind}' can't be empty!"
            )));
        }
    }

    if kind == StorageKind::Smb && spec.share.is_empty() {
        return Err(Error::Config(format!(
            "Field 'share' in job '{job_name}' for storage '{kind}' can't be empty!"
        )));
    }

    if kind == StorageKind::S3 && spec.bucket_name.is_empty() {
        return Err(Error::Config(format!(
            "Field 'bucket_name' in job '{job_name}' for storage '{kind}' can't be empty!"
        )));
    }

    let remote_mount_point = if kind.mounts_backup_dir() && spec.remote_mount_point.is_empty() {
        spec.backup_dir.clone()
    } else {
        spec.remote_mount_point.clone()
    };

    Ok(StorageData {
        kind,
        backup_dir: spec.backup_dir.clone(),
        retention: spec.store,
        host: spec.host.clone(),
        port: spec.port,
        user: spec.user.clone(),
        password: spec.password.clone(),
        path_to_key: spec.path_to_key.clone(),
        remote_mount_point,
        extra_keys: spec.extra_keys.clone(),
        share: spec.share.clone(),
        bucket_name: spec.bucket_name.clone(),
        access_key_id: spec.access_key_id.clone(),
        secret_access_key: spec.secret_access_key.clone(),
        s3fs_opts: spec.s3fs_opts.clone(),
        mount_sub_dir: String::new(),
    })
}

impl StorageData {
    pub fn is_local(&self) -> bool {
        self.kind == StorageKind::Local
    }

    /// The local directory that represents the destination root once it is
    /// mounted.
    pub fn local_root(&self) -> PathBuf {
        match self.kind {
            StorageKind::Local => PathBuf::from(&self.backup_dir),
            StorageKind::Scp | StorageKind::Nfs => {
                PathBuf::from(format!("{}{}", self.kind.mount_point(), self.mount_sub_dir))
            }
            _ => Path::new(self.kind.mount_point()).join(self.backup_dir.trim_start_matches('/')),
        }
    }

    /// Destination directory for one logical source.
    pub fn dst_root(&self, part_of_dir_path: &str) -> PathBuf {
        if part_of_dir_path.is_empty() {
            self.local_root()
        } else {
            self.local_root().join(part_of_dir_path)
        }
    }

    /// Back-translate a local path into the operator-readable remote one for
    /// log messages.
    pub fn dir_for_log(&self, local_dir: &Path) -> String {
        if self.is_local() {
            return local_dir.display().to_string();
        }
        let mount_point = Path::new(self.kind.mount_point());
        let rel = local_dir.strip_prefix(mount_point).unwrap_or(local_dir);
        if self.kind.mounts_backup_dir() {
            let rel = rel
                .strip_prefix(self.mount_sub_dir.trim_start_matches('/'))
                .unwrap_or(rel);
            Path::new(&self.backup_dir).join(rel).display().to_string()
        } else {
            Path::new("/").join(rel).display().to_string()
        }
    }

    /// Translate a placed local path to its remote absolute path (used as
    /// symlink targets on scp/nfs).
    pub fn remote_path(&self, local_path: &Path) -> PathBuf {
        match local_path.strip_prefix(self.local_root()) {
            Ok(rel) => Path::new(&self.backup_dir).join(rel),
            Err(_) => local_path.to_path_buf(),
        }
    }

    /// `(host, share)` for log messages: share only for smb, host for every
    /// non-local kind except s3.
    pub fn host_and_share(&self) -> (String, String) {
        match self.kind {
            StorageKind::Smb => (self.host.clone(), self.share.clone()),
            StorageKind::Local | StorageKind::S3 => (String::new(), String::new()),
            _ => (self.host.clone(), String::new()),
        }
    }

    /// Suffix like ` in 'share' share on 'smb' storage(host)` used to close
    /// log sentences uniformly across kinds.
    pub fn log_suffix(&self) -> String {
        let (host, share) = self.host_and_share();
        if self.is_local() {
            "on 'local' storage".to_string()
        } else if !share.is_empty() {
            format!("in '{share}' share on '{}' storage({host})", self.kind)
        } else if host.is_empty() {
            format!("on '{}' storage", self.kind)
        } else {
            format!("on '{}' storage({host})", self.kind)
        }
    }
}

/// Whether this spec should receive a copy at all: enabled, with a backup
/// dir.  Disabled specs are silently skipped; an enabled spec without a
/// backup dir is a configuration error surfaced by `validate`.
pub fn is_save_to_storage(spec: &StorageSpec) -> bool {
    spec.enable
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(kind: StorageKind) -> StorageSpec {
        StorageSpec {
            storage: kind,
            enable: true,
            backup_dir: "/backup".into(),
            store: RetentionSpec { days: 7, weeks: 4, months: 6 },
            host: "nas.lan".into(),
            port: None,
            user: "backup".into(),
            password: "secret".into(),
            path_to_key: String::new(),
            remote_mount_point: String::new(),
            extra_keys: String::new(),
            share: "dumps".into(),
            bucket_name: "bucket".into(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            s3fs_opts: String::new(),
        }
    }

    #[test]
    fn local_needs_only_backup_dir() {
        let mut s = spec(StorageKind::Local);
        s.host.clear();
        s.user.clear();
        s.password.clear();
        assert!(validate("job", &s).is_ok());

        s.backup_dir.clear();
        assert!(matches!(validate("job", &s), Err(Error::Config(_))));
    }

    #[test]
    fn host_required_for_remote_kinds() {
        for kind in [StorageKind::Scp, StorageKind::Ftp, StorageKind::Smb, StorageKind::Nfs, StorageKind::Webdav] {
            let mut s = spec(kind);
            s.host.clear();
            assert!(validate("job", &s).is_err(), "{kind} should require host");
        }
        let mut s3 = spec(StorageKind::S3);
        s3.host.clear();
        assert!(validate("job", &s3).is_ok(), "s3 has no host");
    }

    #[test]
    fn scp_accepts_key_in_place_of_password() {
        let mut s = spec(StorageKind::Scp);
        s.password.clear();
        assert!(validate("job", &s).is_err());

        s.path_to_key = "/root/.ssh/id_rsa".into();
        assert!(validate("job", &s).is_ok());
    }

    #[test]
    fn smb_requires_share_and_s3_requires_bucket() {
        let mut smb = spec(StorageKind::Smb);
        smb.share.clear();
        assert!(validate("job", &smb).is_err());

        let mut s3 = spec(StorageKind::S3);
        s3.bucket_name.clear();
        assert!(validate("job", &s3).is_err());
    }

    #[test]
    fn remote_mount_point_defaults_to_backup_dir() {
        let data = validate("job", &spec(StorageKind::Nfs)).unwrap();
        assert_eq!(data.remote_mount_point, "/backup");
    }

    #[test]
    fn local_root_per_kind() {
        let local = validate("job", &spec(StorageKind::Local)).unwrap();
        assert_eq!(local.local_root(), PathBuf::from("/backup"));

        let mut nfs = validate("job", &spec(StorageKind::Nfs)).unwrap();
        nfs.mount_sub_dir = "/www".into();
        assert_eq!(nfs.local_root(), PathBuf::from("/mnt/nfs/www"));

        let ftp = validate("job", &spec(StorageKind::Ftp)).unwrap();
        assert_eq!(ftp.local_root(), PathBuf::from("/mnt/curlftpfs/backup"));
    }

    #[test]
    fn dir_for_log_translates_back() {
        let ftp = validate("job", &spec(StorageKind::Ftp)).unwrap();
        let local = PathBuf::from("/mnt/curlftpfs/backup/www/daily");
        assert_eq!(ftp.dir_for_log(&local), "/backup/www/daily");

        let nfs = validate("job", &spec(StorageKind::Nfs)).unwrap();
        let local = PathBuf::from("/mnt/nfs/www/daily");
        assert_eq!(nfs.dir_for_log(&local), "/backup/www/daily");
    }

    #[test]
    fn remote_path_swaps_roots() {
        let nfs = validate("job", &spec(StorageKind::Nfs)).unwrap();
        let placed = PathBuf::from("/mnt/nfs/www/daily/a.tar");
        assert_eq!(nfs.remote_path(&placed), PathBuf::from("/backup/www/daily/a.tar"));
    }

    #[test]
    fn host_and_share_reporting() {
        assert_eq!(
            validate("j", &spec(StorageKind::Smb)).unwrap().host_and_share(),
            ("nas.lan".to_string(), "dumps".to_string())
        );
        assert_eq!(
            validate("j", &spec(StorageKind::Scp)).unwrap().host_and_share(),
            ("nas.lan".to_string(), String::new())
        );
        assert_eq!(
            validate("j", &spec(StorageKind::S3)).unwrap().host_and_share(),
            (String::new(), String::new())
        );
    }

    #[test]
    fn retention_month_alias_is_accepted() {
        let yaml = "days: 7\nweeks: 4\nmonth: 12\n";
        let r: RetentionSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(r.months, 12);
    }
}
