//! `external` job driver: run an arbitrary dump command and rotate the file
//! it reports.
//!
//! The command must print a JSON descriptor on stdout:
//!
//! ```json
//! { "full_path": "/tmp/x.bin", "basename": "x", "extension": "bin", "gzip": false }
//! ```
//!
//! The reported file is renamed into the canonical artifact naming scheme
//! before rotation.

use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::exec::exec_cmd;
use crate::jobs::JobContext;
use crate::{paths, rotate};

#[derive(Debug, Deserialize)]
pub struct DumpDescriptor {
    pub full_path: String,
    pub basename: String,
    pub extension: String,
    pub gzip: bool,
}

/// Parse and sanity-check the dump command's stdout.
pub fn parse_descriptor(stdout: &str) -> Result<DumpDescriptor> {
    let descriptor: DumpDescriptor = serde_json::from_str(stdout)
        .map_err(|e| Error::ExternalDescriptorInvalid(format!("Can't parse output str: {e}")))?;
    if !Path::new(&descriptor.full_path).is_file() {
        return Err(Error::ExternalDescriptorInvalid(format!(
            "File '{}' not found!",
            descriptor.full_path
        )));
    }
    Ok(descriptor)
}

pub fn run(ctx: &JobContext) {
    let job = ctx.name();
    if ctx.spec.dump_cmd.is_empty() {
        ctx.log.error(job, "Missing required key:'dump_cmd'!");
        return;
    }

    let out = match exec_cmd(&ctx.spec.dump_cmd) {
        Ok(out) => out,
        Err(e) => {
            ctx.log.error(job, &format!("{e}"));
            return;
        }
    };

    if !out.success() {
        ctx.log.error(
            job,
            &format!(
                "Bad result code external process '{}': '{}' with next STDERR:\n'{}'",
                ctx.spec.dump_cmd, out.code, out.stderr
            ),
        );
        return;
    }

    if ctx.spec.skip_backup_rotate {
        ctx.log.info(
            job,
            &format!(
                "Command '{}' finished success with the next result:\n{}",
                ctx.spec.dump_cmd, out.stdout
            ),
        );
        return;
    }

    if !out.stderr.is_empty() {
        ctx.log.error(
            job,
            &format!("Can't create external backup in tmp directory:{}", out.stderr),
        );
        return;
    }

    let descriptor = match parse_descriptor(&out.stdout) {
        Ok(d) => d,
        Err(e) => {
            ctx.log.error(job, &format!("{e}"));
            return;
        }
    };
    ctx.log
        .info(job, "Successfully created external backup in tmp directory.");

    // Rename into the canonical `<basename>_<stamp>.<ext>[.gz]` scheme.
    let produced = Path::new(&descriptor.full_path);
    let staging_dir = produced.parent().unwrap_or(Path::new("/tmp"));
    let canonical = paths::artifact_path(
        staging_dir,
        &descriptor.basename,
        &descriptor.extension,
        descriptor.gzip,
        ctx.cal,
    );
    if let Err(e) = std::fs::rename(produced, &canonical) {
        ctx.log.error(
            job,
            &format!(
                "Can't move '{}' -> '{}': {e}",
                produced.display(),
                canonical.display()
            ),
        );
        return;
    }

    rotate::rotate_artifact(
        ctx.log,
        ctx.cal,
        &ctx.anchors,
        &ctx.spec.storages,
        "",
        &canonical,
        job,
        ctx.spec.safety_backup,
    );

    let _ = paths::clear_dir_contents(Path::new(paths::DAVFS_CACHE_DIR));
}

// ─── Tests ────────────────────────────────────────────────────────────────────
