//! Command-line interface definition.
//!
//! All argument parsing lives here so the rest of the codebase can stay
//! agnostic to `clap`.  The `Cli` struct is parsed once in `main` and then
//! passed (by reference) into the command handlers.

use std::path::PathBuf;

use clap::Parser;

/// Top-level CLI arguments, shared across every subcommand.
#[derive(Parser, Debug)]
#[command(
    name    = "rotbak",
    about   = "Scheduled, rotated, multi-destination backups driven by a YAML config",
    version,
    // Show a compact two-column help layout.
    help_template = "\
{before-help}{name} {version}
{about}

{usage-heading} {usage}

{all-args}{after-help}"
)]
pub struct Cli {
    /// Path to the configuration file.
    ///
    /// The file holds the `main:` section plus the `jobs:` list; fragments
    /// can be pulled in with `!include`.  Point `--config` at a different
    /// file for per-project or staging setups.
    #[arg(short, long, global = true, default_value = "/etc/rotbak/rotbak.conf")]
    pub config: PathBuf,

    /// Check the syntax of the configuration file and exit.
    ///
    /// Exit code 0 when the file (and everything it includes) parses and
    /// validates, 1 otherwise.  Nothing is backed up and no lock is taken.
    #[arg(short = 't', long = "test")]
    pub test: bool,

    /// Subcommand to run.  Omit (without `--test`) to print help.
    #[command(subcommand)]
    pub command: Option<Subcommand>,
}

/// Explicit subcommands.
#[derive(clap::Subcommand, Debug, PartialEq)]
pub enum Subcommand {
    /// Run backup jobs.
    ///
    /// The selector is a job name from the config, or one of the block
    /// selectors `all`, `files`, `databases`, `external`.  `all` runs the
    /// blocks in the order files → databases → external.
    Start {
        /// Job name or block selector.
        #[arg(default_value = "all")]
        job_name: String,
    },

    /// Scaffold a job-config fragment for a backup type.
    ///
    /// The fragment is written with mode 0600 (storage blocks carry
    /// credentials) and is meant to be pulled into the main config with
    /// `!include`.
    Generate {
        /// Backup type the job skeleton is generated for.
        #[arg(short = 'T', long = "type")]
        backup_type: String,

        /// One or more storage kinds to emit destination blocks for.
        #[arg(short = 'S', long = "storages", num_args = 1.., required = true)]
        storages: Vec<String>,

        /// Where to write the generated fragment.
        #[arg(short = 'P', long = "path")]
        path: PathBuf,
    },
}

// ─── Tests ────────────────────────────────────────────────────────────────────
