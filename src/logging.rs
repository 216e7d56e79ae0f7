//! Run log and the end-of-run mail report.
//!
//! Every engine event is written to the log file as
//! `LEVEL [job] [YYYY-MM-DD HH:MM:SS]: message` and mirrored to `tracing`
//! for terminal diagnostics.  Error lines additionally accumulate into the
//! report bodies that are mailed when the run finishes.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::calendar::Calendar;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Info => write!(f, "INFO"),
            Level::Warning => write!(f, "WARNING"),
            Level::Error => write!(f, "ERROR"),
        }
    }
}

struct LogState {
    file: Option<File>,
    error_body: String,
    debug_body: String,
}

/// The logging context threaded through a run.
pub struct RunLog {
    inner: Mutex<LogState>,
}

impl RunLog {
    /// Open the log file for appending, falling back to truncating write
    /// (covers `/dev/stdout`-style targets), falling back to no file at all.
    /// The run proceeds either way; a missing log file is reported once on
    /// stderr.
    pub fn open(path: &Path) -> Self {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .or_else(|_| File::create(path));
        let file = match file {
            Ok(f) => Some(f),
            Err(e) => {
                eprintln!("rotbak: couldn't open log file {}: {e}", path.display());
                None
            }
        };
        Self {
            inner: Mutex::new(LogState {
                file,
                error_body: String::new(),
                debug_body: String::new(),
            }),
        }
    }

    /// A log that only accumulates report bodies.  Used by `--test` style
    /// paths and unit tests.
    pub fn discard() -> Self {
        Self {
            inner: Mutex::new(LogState {
                file: None,
                error_body: String::new(),
                debug_body: String::new(),
            }),
        }
    }

    pub fn write(&self, level: Level, job: &str, message: &str) {
        let stamp = Calendar::now().log_stamp();
        let line = if job.is_empty() {
            format!("{level} [{stamp}]: {message}\n")
        } else {
            format!("{level} [{job}] [{stamp}]: {message}\n")
        };

        match level {
            Level::Error => tracing::error!(job, "{message}"),
            Level::Warning => tracing::warn!(job, "{message}"),
            Level::Info => tracing::info!(job, "{message}"),
        }

        // A panicking job driver must not take the logger down with it.
        let mut state = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(file) = state.file.as_mut() {
            if let Err(e) = file.write_all(line.as_bytes()) {
                eprintln!("rotbak: couldn't write to log file: {e}");
            }
        }
        if level == Level::Error {
            state.error_body.push_str(&line);
        }
        state.debug_body.push_str(&line);
    }

    pub fn info(&self, job: &str, message: &str) {
        self.write(Level::Info, job, message);
    }

    pub fn error(&self, job: &str, message: &str) {
        self.write(Level::Error, job, message);
    }

    pub fn has_errors(&self) -> bool {
        !self.state().error_body.is_empty()
    }

    pub fn error_body(&self) -> String {
        self.state().error_body.clone()
    }

    pub fn debug_body(&self) -> String {
        self.state().debug_body.clone()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, LogState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Console diagnostics via `tracing`; `RUST_LOG` wins, default is warnings
/// only so cron output stays quiet.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

// ─── Mail report ──────────────────────────────────────────────────────────────

/// Addressing and policy for the end-of-run report.
#[derive(Debug, Clone, Default)]
pub struct MailSettings {
    pub admin_mail: String,
    pub client_mail: Vec<String>,
    pub mail_from: String,
    pub server_name: String,
    /// `"debug"` always sends the full body; anything else sends only when
    /// errors accumulated.
    pub level_message: String,
}

/// Send the end-of-run report according to `level_message`.
pub fn send_report(log: &RunLog, mail: &MailSettings) {
    if mail.admin_mail.is_empty() {
        return;
    }
    if mail.level_message == "debug" {
        if log.has_errors() {
            deliver(log, mail, &[mail.admin_mail.clone()], &log.error_body());
        }
        let mut clients = mail.client_mail.clone();
        clients.push(mail.admin_mail.clone());
        deliver(log, mail, &clients, &log.debug_body());
    } else if log.has_errors() {
        let mut recipients = mail.client_mail.clone();
        recipients.push(mail.admin_mail.clone());
        deliver(log, mail, &recipients, &log.error_body());
    }
}

fn deliver(log: &RunLog, mail: &MailSettings, recipients: &[String], body: &str) {
    let to: Vec<&str> = recipients.iter().map(String::as_str).filter(|a| !a.is_empty()).collect();
    if to.is_empty() || body.is_empty() {
        return;
    }
    let message = format!(
        "Subject: {} notification dump.\nFrom: {}\nTo: {}\n\n{}",
        mail.server_name,
        mail.mail_from,
        to.join(","),
        body
    );
    if let Err(e) = pipe_to_sendmail(&message) {
        log.write(
            Level::Error,
            "",
            &format!("Some problem when sending a message via sendmail: {e}"),
        );
    }
}

fn pipe_to_sendmail(message: &str) -> std::io::Result<()> {
    let mut child = Command::new("/usr/sbin/sendmail")
        .args(["-t", "-oi"])
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    if let Some(stdin) = child.stdin.as_mut() {
        stdin.write_all(message.as_bytes())?;
    }
    child.wait()?;
    Ok(())
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_lines_accumulate_into_both_bodies() {
        let log = RunLog::discard();
        log.error("job1", "boom");
        assert!(log.has_errors());
        assert!(log.error_body().contains("boom"));
        assert!(log.debug_body().contains("boom"));
    }

    #[test]
    fn info_lines_only_reach_the_debug_body() {
        let log = RunLog::discard();
        log.info("job1", "all good");
        assert!(!log.has_errors());
        assert!(log.debug_body().contains("all good"));
    }

    #[test]
    fn job_tag_appears_in_the_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        let log = RunLog::open(&path);
        log.info("www-files", "Starting backup.");
        log.error("", "untagged failure");

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("INFO [www-files] ["));
        assert!(content.contains("ERROR ["));
        assert!(content.contains("untagged failure"));
        // Untagged lines carry exactly one bracket group before the colon.
        let untagged = content.lines().find(|l| l.contains("untagged")).unwrap();
        assert_eq!(untagged.matches('[').count(), 1);
    }

    #[test]
    fn open_appends_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        RunLog::open(&path).info("", "first");
        RunLog::open(&path).info("", "second");

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("first"));
        assert!(content.contains("second"));
    }
}
