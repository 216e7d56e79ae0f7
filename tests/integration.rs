//! Integration tests for the `rotbak` binary.
//!
//! These tests exercise the CLI layer end-to-end: they spawn the actual
//! compiled binary and assert on exit codes, stdout, and stderr.  No dump
//! tools are required — these cover argument parsing, config loading,
//! `--test`, `generate`, and error paths that never reach a dump.
//!
//! # Running
//!
//! ```sh
//! cargo test --test integration
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;

/// Absolute path to the compiled `rotbak` binary, resolved at compile time
/// by Cargo.
const BIN: &str = env!("CARGO_BIN_EXE_rotbak");

/// `rotbak start` takes the host-wide instance lock; serialize those tests
/// so they wait on each other instead of on the lock's poll interval.
static START_LOCK: Mutex<()> = Mutex::new(());

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Run `rotbak` with `args`.  Returns `(exit_success, stdout, stderr)`.
fn run(args: &[&str]) -> (bool, String, String) {
    let out = Command::new(BIN)
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to spawn {BIN}: {e}"));

    (
        out.status.success(),
        String::from_utf8_lossy(&out.stdout).into_owned(),
        String::from_utf8_lossy(&out.stderr).into_owned(),
    )
}

/// Write a minimal valid config into `dir` and return its path.
fn minimal_config(dir: &Path) -> PathBuf {
    let path = dir.join("rotbak.conf");
    let log_file = dir.join("run.log");
    fs::write(
        &path,
        format!(
            "main:\n  admin_mail: admin@example.org\n  log_file: {}\n  loop_timeout: 120\n  loop_interval: 1\n\njobs: []\n",
            log_file.display()
        ),
    )
    .unwrap();
    path
}

// ─── --help / --version ───────────────────────────────────────────────────────

#[test]
fn help_exits_zero() {
    let (ok, stdout, _) = run(&["--help"]);
    assert!(ok, "rotbak --help should exit 0");
    assert!(
        stdout.contains("rotbak"),
        "help text should mention the binary name"
    );
    assert!(stdout.contains("start"));
    assert!(stdout.contains("generate"));
}

#[test]
fn version_exits_zero() {
    let (ok, stdout, _) = run(&["--version"]);
    assert!(ok, "--version should exit 0");
    assert!(stdout.contains("0.1.0"), "--version should print the version");
}

#[test]
fn no_arguments_prints_help() {
    let (ok, stdout, _) = run(&[]);
    assert!(ok, "bare invocation prints help and exits 0");
    assert!(stdout.contains("Usage") || stdout.contains("usage"));
}

#[test]
fn unknown_flag_exits_nonzero() {
    let (ok, _, _) = run(&["--this-flag-does-not-exist"]);
    assert!(!ok, "unknown flag should exit non-zero");
}

// ─── --test ───────────────────────────────────────────────────────────────────

#[test]
fn test_mode_accepts_a_valid_config() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = minimal_config(dir.path());

    let (ok, stdout, _) = run(&["-c", cfg.to_str().unwrap(), "-t"]);
    assert!(ok, "valid config should pass --test");
    assert!(stdout.contains("syntax is ok"));
}

#[test]
fn test_mode_rejects_invalid_yaml() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = dir.path().join("rotbak.conf");
    fs::write(&cfg, "not valid yaml ][[[").unwrap();

    let (ok, _, stderr) = run(&["-c", cfg.to_str().unwrap(), "-t"]);
    assert!(!ok, "invalid YAML should fail --test");
    assert!(stderr.contains("syntax is bad"));
}

#[test]
fn test_mode_rejects_a_missing_file() {
    let (ok, _, _) = run(&["-c", "/no/such/rotbak.conf", "-t"]);
    assert!(!ok);
}

#[test]
fn test_mode_rejects_duplicate_job_names() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = dir.path().join("rotbak.conf");
    fs::write(
        &cfg,
        "main:\n  admin_mail: a@b.c\njobs:\n  - job: twin\n    type: external\n  - job: twin\n    type: external\n",
    )
    .unwrap();

    let (ok, _, stderr) = run(&["-c", cfg.to_str().unwrap(), "-t"]);
    assert!(!ok);
    assert!(stderr.contains("duplicate job name"));
}

#[test]
fn test_mode_follows_includes() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("conf.d")).unwrap();
    fs::write(
        dir.path().join("conf.d/10-ext.conf"),
        "- job: ext\n  type: external\n  dump_cmd: /bin/true\n",
    )
    .unwrap();
    let cfg = dir.path().join("rotbak.conf");
    fs::write(
        &cfg,
        "main:\n  admin_mail: a@b.c\njobs: !include [ 'conf.d/*.conf' ]\n",
    )
    .unwrap();

    let (ok, stdout, _) = run(&["-c", cfg.to_str().unwrap(), "-t"]);
    assert!(ok, "{stdout}");
}

// ─── generate ─────────────────────────────────────────────────────────────────

#[test]
fn generate_writes_a_job_fragment() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("conf.d/10-mysql.conf");

    let (ok, stdout, _) = run(&[
        "generate",
        "-T",
        "mysql",
        "-S",
        "local",
        "scp",
        "-P",
        out.to_str().unwrap(),
    ]);
    assert!(ok, "{stdout}");
    assert!(stdout.contains("Successfully generated"));

    let content = fs::read_to_string(&out).unwrap();
    assert!(content.contains("- job:"));
    assert!(content.contains("type: mysql"));
    assert!(content.contains("storage: local"));
    assert!(content.contains("storage: scp"));
}

#[test]
fn generated_fragment_passes_test_mode_when_included() {
    let dir = tempfile::tempdir().unwrap();
    let fragment = dir.path().join("conf.d/10-files.conf");

    let (ok, _, _) = run(&[
        "generate",
        "-T",
        "desc_files",
        "-S",
        "local",
        "-P",
        fragment.to_str().unwrap(),
    ]);
    assert!(ok);

    let cfg = dir.path().join("rotbak.conf");
    fs::write(
        &cfg,
        "main:\n  admin_mail: a@b.c\njobs: !include [ 'conf.d/*.conf' ]\n",
    )
    .unwrap();

    let (ok, stdout, stderr) = run(&["-c", cfg.to_str().unwrap(), "-t"]);
    assert!(ok, "stdout: {stdout}\nstderr: {stderr}");
}

#[test]
fn generate_refuses_unknown_types() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("x.conf");
    let (ok, _, _) = run(&["generate", "-T", "floppy", "-S", "local", "-P", out.to_str().unwrap()]);
    assert!(!ok);
    assert!(!out.exists());
}

// ─── start: selector errors ───────────────────────────────────────────────────

#[test]
fn start_with_unknown_job_name_exits_one() {
    let _guard = START_LOCK.lock().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let cfg = minimal_config(dir.path());

    let (ok, _, _) = run(&["-c", cfg.to_str().unwrap(), "start", "no-such-job"]);
    assert!(!ok, "invalid job selector must exit 1");
}

#[test]
fn start_with_empty_job_list_succeeds() {
    let _guard = START_LOCK.lock().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let cfg = minimal_config(dir.path());

    let (ok, _, stderr) = run(&["-c", cfg.to_str().unwrap(), "start"]);
    assert!(ok, "{stderr}");

    let log = fs::read_to_string(dir.path().join("run.log")).unwrap();
    assert!(log.contains("Starting script."));
    assert!(log.contains("Stopping script."));
}

#[test]
fn start_without_a_config_exits_one() {
    let _guard = START_LOCK.lock().unwrap();
    let (ok, _, _) = run(&["-c", "/no/such/rotbak.conf", "start"]);
    assert!(!ok);
}
