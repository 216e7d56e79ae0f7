//! The run controller — `rotbak start [selector]`.
//!
//! Acquires the single-instance lock, opens the run log, iterates the
//! selected jobs block by block (files → databases → external), dispatches
//! each to its driver, and finishes with the mail report.  A panicking
//! driver is caught so the remaining jobs still run and the lock is always
//! released.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::time::Duration;

use anyhow::Result;

use crate::calendar::Calendar;
use crate::config::{select_jobs, Config, JobBlock, JobKind, JobSpec};
use crate::jobs::{self, JobContext};
use crate::lock::{ProcessLock, LOCK_PATH};
use crate::logging::{send_report, RunLog};
use crate::rotate;

pub fn run(config: &Config, selector: &str) -> Result<()> {
    let selected = select_jobs(config, selector)?;

    let log = RunLog::open(&config.main.log_file);

    let wait_budget = config.main.loop_timeout.map(Duration::from_secs);
    let retry = Duration::from_secs(config.main.loop_interval.max(1));
    let lock = match ProcessLock::acquire(Path::new(LOCK_PATH), wait_budget, retry) {
        Ok(lock) => lock,
        Err(e) => {
            log.error("", "Script already is running!");
            anyhow::bail!("{e}");
        }
    };

    let cal = Calendar::now();
    log.info("", "Starting script.");

    let mut current_block: Option<JobBlock> = None;
    for &job in &selected {
        let block = job.kind.block();
        if current_block != Some(block) {
            if let Some(previous) = current_block {
                log.info("", &format!("Finishing {} block backup.", previous.title()));
            }
            log.info("", &format!("Starting {} block backup.", block.title()));
            current_block = Some(block);
        }
        execute_job(&log, &cal, config, job);
    }
    if let Some(previous) = current_block {
        log.info("", &format!("Finishing {} block backup.", previous.title()));
    }

    log.info("", "Stopping script.");
    send_report(&log, &config.main.mail_settings());
    lock.release();
    Ok(())
}

/// Run one job, isolating its failures from the rest of the run.
fn execute_job(log: &RunLog, cal: &Calendar, config: &Config, spec: &JobSpec) {
    let job = spec.job.as_str();
    log.info(job, &format!("Starting backup for job '{job}'."));

    if !spec.storages.iter().any(|s| s.enable) {
        log.error(job, &format!("There are no active storages in the job '{job}'!"));
        return;
    }
    if spec.kind != JobKind::IncFiles
        && !rotate::is_time_to_backup(cal, &config.main.anchors(), &spec.storages)
    {
        log.info(
            job,
            "According to the backup plan today new backups are not created in this job.",
        );
        return;
    }

    let ctx = JobContext {
        log,
        cal,
        anchors: config.main.anchors(),
        main: &config.main,
        spec,
    };
    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| jobs::dispatch(&ctx))) {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        log.error(job, &format!("Job driver panicked: {message}"));
    }

    log.info(job, &format!("Finishing backup for job '{job}'."));
}
