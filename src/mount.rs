//! Mount lifecycle for remote storages.
//!
//! Every remote kind is reached through a FUSE (or kernel) mount at a
//! well-known mount point.  Mounting is: check the helper packages for this
//! OS family, write credential files where the helper needs them, verify the
//! mount point is free (or already ours, for sshfs), then run the mount
//! command.  Unmounting is always lazy so a slow NAS cannot wedge the run.

use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::error::{Error, Result};
use crate::exec::exec_cmd;
use crate::paths;
use crate::storage::{StorageData, StorageKind};

pub const DAVFS_SECRETS: &str = "/etc/davfs2/secrets";
pub const S3FS_PASSWD: &str = "/etc/passwd-s3fs";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Deb,
    Rpm,
}

impl OsFamily {
    pub fn check_cmd(&self) -> &'static str {
        match self {
            OsFamily::Deb => "dpkg -s",
            OsFamily::Rpm => "rpm -q",
        }
    }
}

/// Detect the package family from `/etc/os-release`.
pub fn os_family() -> Result<OsFamily> {
    let mut content = String::new();
    std::fs::File::open("/etc/os-release")
        .and_then(|mut f| f.read_to_string(&mut content))
        .map_err(|e| Error::MountFailed(format!("can't read /etc/os-release: {e}")))?;
    parse_os_family(&content)
}

fn parse_os_family(os_release: &str) -> Result<OsFamily> {
    let mut id = "";
    let mut id_like = "";
    for line in os_release.lines() {
        if let Some(v) = line.strip_prefix("ID=") {
            id = v.trim_matches('"');
        } else if let Some(v) = line.strip_prefix("ID_LIKE=") {
            id_like = v.trim_matches('"');
        }
    }
    let haystack = format!("{id} {id_like}").to_lowercase();
    if ["debian", "ubuntu", "neon"].iter().any(|d| haystack.contains(d)) {
        Ok(OsFamily::Deb)
    } else if ["centos", "rhel", "fedora"].iter().any(|d| haystack.contains(d)) {
        Ok(OsFamily::Rpm)
    } else {
        Err(Error::MountFailed(format!(
            "this Linux distribution ('{id}') is not supported"
        )))
    }
}

/// Everything needed to mount one storage.
#[derive(Debug)]
pub struct MountPlan {
    pub packages: Vec<&'static str>,
    pub mount_cmd: String,
    pub mount_point: &'static str,
    /// `(file, line, chmod 600)` credential record the helper reads.
    pub secret_line: Option<(String, String, bool)>,
}

/// Sub-path below the mount point when a parent export is mounted.
fn mount_sub_dir(data: &StorageData) -> String {
    if data.kind.mounts_backup_dir() && data.remote_mount_point != data.backup_dir {
        data.backup_dir
            .strip_prefix(data.remote_mount_point.trim_end_matches('/'))
            .unwrap_or("")
            .to_string()
    } else {
        String::new()
    }
}

/// Build the mount plan for a validated storage.  `None` for local.
pub fn mount_plan(data: &StorageData, family: OsFamily) -> Result<Option<MountPlan>> {
    let mount_point = data.kind.mount_point();
    let port_or = |default: u16| data.port.unwrap_or(default);

    let plan = match data.kind {
        StorageKind::Local => return Ok(None),

        StorageKind::Scp => {
            let port = port_or(22);
            let mount_cmd = if data.path_to_key.is_empty() {
                format!(
                    "echo \"{}\" | sshfs -o StrictHostKeyChecking=no,password_stdin,nonempty -C \
                     -p {port} {}@{}:{} {mount_point}",
                    data.password, data.user, data.host, data.remote_mount_point
                )
            } else {
                format!(
                    "sshfs -o StrictHostKeyChecking=no,IdentityFile={},nonempty -C \
                     -p {port} {}@{}:{} {mount_point}",
                    data.path_to_key, data.user, data.host, data.remote_mount_point
                )
            };
            MountPlan {
                packages: vec!["openssh-client", "sshfs", "sshpass"],
                mount_cmd,
                mount_point,
                secret_line: None,
            }
        }

        StorageKind::Ftp => MountPlan {
            packages: vec!["curlftpfs"],
            mount_cmd: format!(
                "curlftpfs -o nonempty ftp://{}:{}@{} {mount_point}",
                data.user, data.password, data.host
            ),
            mount_point,
            secret_line: None,
        },

        StorageKind::Smb => MountPlan {
            packages: vec!["cifs-utils"],
            mount_cmd: format!(
                "mount -t cifs -o port={},noperm,username={},password={} //{}/{} {mount_point}",
                port_or(445),
                data.user,
                data.password,
                data.host,
                data.share
            ),
            mount_point,
            secret_line: None,
        },

        StorageKind::Nfs => MountPlan {
            packages: vec![match family {
                OsFamily::Deb => "nfs-common",
                OsFamily::Rpm => "nfs-utils",
            }],
            mount_cmd: format!(
                "mount -t nfs {}:{} {mount_point} {}",
                data.host, data.remote_mount_point, data.extra_keys
            )
            .trim_end()
            .to_string(),
            mount_point,
            secret_line: None,
        },

        StorageKind::Webdav => {
            let port = port_or(443);
            MountPlan {
                packages: vec!["davfs2"],
                mount_cmd: format!("mount -t davfs {}:{port} {mount_point}", data.host),
                mount_point,
                secret_line: Some((
                    DAVFS_SECRETS.to_string(),
                    format!("{}:{port} {} {}", data.host, data.user, data.password),
                    false,
                )),
            }
        }

        StorageKind::S3 => MountPlan {
            packages: vec![],
            mount_cmd: format!("s3fs {} {mount_point} {}", data.bucket_name, data.s3fs_opts)
                .trim_end()
                .to_string(),
            mount_point,
            secret_line: if !data.access_key_id.is_empty() && !data.secret_access_key.is_empty() {
                Some((
                    S3FS_PASSWD.to_string(),
                    format!(
                        "{}:{}:{}",
                        data.bucket_name, data.access_key_id, data.secret_access_key
                    ),
                    true,
                ))
            } else {
                None
            },
        },
    };
    Ok(Some(plan))
}

/// Mount `data`'s storage.  No-op for local.  On success the mount sub-dir
/// is recorded on `data` so path translation works.
pub fn mount(data: &mut StorageData) -> Result<()> {
    if data.is_local() {
        return Ok(());
    }
    let family = os_family()?;
    let plan = match mount_plan(data, family)? {
        Some(p) => p,
        None => return Ok(()),
    };
    data.mount_sub_dir = mount_sub_dir(data);

    for package in &plan.packages {
        let check = exec_cmd(&format!("{} {package}", family.check_cmd()))
            .map_err(|e| Error::MountFailed(e.to_string()))?;
        if !check.success() || check.stdout.is_empty() {
            return Err(Error::PackageMissing((*package).to_string()));
        }
    }

    if let Some((file, line, restrict)) = &plan.secret_line {
        ensure_secret_line(Path::new(file), line, *restrict)?;
    }

    let mounted = exec_cmd("mount").map_err(|e| Error::MountFailed(e.to_string()))?;
    let occupant = mounted
        .stdout
        .lines()
        .find(|l| l.contains(plan.mount_point));
    if let Some(line) = occupant {
        if data.kind == StorageKind::Scp {
            let remote = line.split_whitespace().next().unwrap_or("");
            if !plan.mount_cmd.contains(remote) {
                return Err(Error::MountBusy(format!(
                    "mount point {} is busy by different remote resource! \
                     Requested mount: {}. Current mount: {line}.",
                    plan.mount_point, plan.mount_cmd
                )));
            }
            // Same remote already mounted — nothing to do.
            return Ok(());
        }
        return Err(Error::MountBusy(format!(
            "mount point {} is busy!",
            plan.mount_point
        )));
    }

    paths::create_dirs(Path::new(plan.mount_point))
        .map_err(|e| Error::MountFailed(e.to_string()))?;
    let out = exec_cmd(&plan.mount_cmd).map_err(|e| Error::MountFailed(e.to_string()))?;
    if !out.stderr.is_empty() {
        return Err(Error::MountFailed(out.stderr));
    }
    if !out.success() {
        return Err(Error::MountFailed(format!(
            "bad result code external process '{}': '{}'",
            plan.mount_cmd, out.code
        )));
    }

    if data.kind == StorageKind::S3 {
        // A directory read surfaces bad credentials immediately.
        std::fs::read_dir(plan.mount_point)
            .map_err(|_| Error::MountFailed("incorrect authentication data!".to_string()))?;
    }

    Ok(())
}

/// Lazy FUSE unmount; removes the mount point directory afterwards.
pub fn unmount(data: &StorageData) -> Result<()> {
    if data.is_local() {
        return Ok(());
    }
    let mount_point = data.kind.mount_point();
    let cmd = format!("fusermount -uz {mount_point}");
    let out = exec_cmd(&cmd).map_err(|e| Error::UnmountFailed(e.to_string()))?;
    if !out.stderr.is_empty() {
        return Err(Error::UnmountFailed(out.stderr));
    }
    if !out.success() {
        return Err(Error::UnmountFailed(format!(
            "bad result code external process '{cmd}': '{}'",
            out.code
        )));
    }
    paths::remove_any(Path::new(mount_point)).map_err(|e| Error::UnmountFailed(e.to_string()))
}

/// Append `line` to `file` unless it is already present.  Optionally forces
/// mode 0600 (s3fs refuses credential files anyone else can read).
fn ensure_secret_line(file: &Path, line: &str, restrict: bool) -> Result<()> {
    let mut content = String::new();
    let mut handle = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(file)
        .map_err(|e| Error::AuthWriteFailed(format!("{}: {e}", file.display())))?;
    handle
        .read_to_string(&mut content)
        .map_err(|e| Error::AuthWriteFailed(format!("{}: {e}", file.display())))?;
    if !content.contains(line) {
        writeln!(handle, "{line}")
            .map_err(|e| Error::AuthWriteFailed(format!("{}: {e}", file.display())))?;
    }
    if restrict {
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(file, perms)
            .map_err(|e| Error::AuthWriteFailed(format!("{}: {e}", file.display())))?;
    }
    Ok(())
}

// ─── Tests ────────────────────────────────────────────────────────────────────
