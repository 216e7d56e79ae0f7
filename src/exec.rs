//! Captured shell execution.
//!
//! Dump commands are full shell pipelines (`mysqldump … | gzip > out`), so
//! everything goes through `sh -c`.  Output is buffered, never inherited —
//! the agent's terminal belongs to the log, not to the dump tools.

use std::process::{Command, Output, Stdio};

use crate::error::{Error, Result};

/// Captured result of one shell command.
#[derive(Debug)]
pub struct CmdOutput {
    pub stdout: String,
    pub stderr: String,
    pub code: i32,
}

impl CmdOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Run `cmdline` under `sh -c`, capturing stdout and stderr.
///
/// Trailing newlines are trimmed from both streams so callers can compare
/// against single-line tool output directly.  A command killed by a signal
/// reports code `-1`.
pub fn exec_cmd(cmdline: &str) -> Result<CmdOutput> {
    let output: Output = Command::new("sh")
        .arg("-c")
        .arg(cmdline)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| Error::DumpFailed(format!("failed to spawn '{cmdline}': {e}")))?;

    Ok(CmdOutput {
        stdout: trimmed(&output.stdout),
        stderr: trimmed(&output.stderr),
        code: output.status.code().unwrap_or(-1),
    })
}

fn trimmed(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.trim_end_matches('\n').to_string()
}

// ─── Tests ────────────────────────────────────────────────────────────────────
