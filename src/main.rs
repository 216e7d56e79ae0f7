//! `rotbak` — scheduled, rotated, multi-destination backups.
//!
//! # Overview
//!
//! A single config-driven agent that dumps heterogeneous sources (MySQL,
//! PostgreSQL, MongoDB, Redis, file trees, arbitrary external commands),
//! then places each artifact on one or more destinations (local, scp, ftp,
//! smb, nfs, webdav, s3) under per-destination `daily/weekly/monthly`
//! retention, or maintains an incremental year/month/decade archive chain.
//!
//! # Usage
//!
//! ```text
//! rotbak start                  # run every job in the config
//! rotbak start site-files       # run a single job
//! rotbak start databases        # run one block (files|databases|external)
//! rotbak -t                     # check config syntax, exit 0/1
//! rotbak generate -T mysql -S local scp -P conf.d/10-mysql.conf
//! ```
//!
//! # Module layout
//!
//! | Module                   | Responsibility                               |
//! |--------------------------|----------------------------------------------|
//! | [`cli`]                  | Argument types parsed by clap                |
//! | [`config`]               | YAML config + `!include` resolution          |
//! | [`calendar`]             | Date tokens and anchor days                  |
//! | [`lock`]                 | Single-instance advisory lock                |
//! | [`logging`]              | Run log file + mail report                   |
//! | [`exec`]                 | Captured shell execution                     |
//! | [`paths`]                | Artifact naming, staging dirs, fs ops        |
//! | [`globwalk`]             | Glob expansion and exclusion sets            |
//! | [`archive`]              | Full tar + gzip plumbing                     |
//! | [`storage`]              | Destination kinds, validation, paths         |
//! | [`mount`]                | Mount/unmount lifecycle per storage kind     |
//! | [`rotate`]               | Tier selection, placement, retention         |
//! | [`increment`]            | Incremental chain engine (GNU.dumpdir)       |
//! | [`jobs`]                 | Per-kind job drivers                         |
//! | [`commands::run`]        | `rotbak start` controller                    |
//! | [`commands::generate`]   | `rotbak generate` scaffolding                |

mod archive;
mod calendar;
mod cli;
mod commands;
mod config;
mod error;
mod exec;
mod globwalk;
mod increment;
mod jobs;
mod lock;
mod logging;
mod mount;
mod paths;
mod rotate;
mod storage;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use console::style;

use cli::{Cli, Subcommand};

fn main() -> Result<()> {
    logging::init_tracing();
    let cli = Cli::parse();

    // ── rotbak --test ─────────────────────────────────────────────────────────
    if cli.test {
        return match config::load_config(&cli.config) {
            Ok(_) => {
                println!(
                    "  {} The configuration file '{}' syntax is ok!",
                    style("✓").green().bold(),
                    cli.config.display()
                );
                Ok(())
            }
            Err(e) => {
                eprintln!(
                    "  {} The configuration file '{}' syntax is bad: {e}!",
                    style("✗").red().bold(),
                    cli.config.display()
                );
                std::process::exit(1);
            }
        };
    }

    match &cli.command {
        // ── rotbak start ──────────────────────────────────────────────────────
        Some(Subcommand::Start { job_name }) => {
            let cfg = config::load_config(&cli.config)?;
            commands::run::run(&cfg, job_name)?;
        }

        // ── rotbak generate ───────────────────────────────────────────────────
        Some(Subcommand::Generate { backup_type, storages, path }) => {
            commands::generate::run(backup_type, storages, path)?;
        }

        None => {
            Cli::command().print_help()?;
        }
    }

    Ok(())
}
