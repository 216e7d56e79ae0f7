//! Calendar tokens used for retention decisions and artifact names.
//!
//! One `Calendar` is captured at the start of a run and threaded through the
//! engines, so every artifact produced by the same run shares one timestamp
//! grain and tests can pin an arbitrary date.

use chrono::{DateTime, Datelike, Local};

/// The weekly / monthly anchor days a destination tier is populated on.
#[derive(Debug, Clone, Copy)]
pub struct Anchors {
    /// ISO day of week (1 = Monday .. 7 = Sunday) the weekly tier fills on.
    pub dow: u32,
    /// Day of month the monthly tier fills on.
    pub dom: u32,
}

impl Default for Anchors {
    fn default() -> Self {
        Self { dow: 4, dom: 5 }
    }
}

/// A single point in time with the derived tokens the engines need.
#[derive(Debug, Clone, Copy)]
pub struct Calendar {
    now: DateTime<Local>,
}

impl Calendar {
    pub fn now() -> Self {
        Self { now: Local::now() }
    }

    pub fn from_datetime(now: DateTime<Local>) -> Self {
        Self { now }
    }

    /// ISO day of the week, 1 (Monday) ..= 7 (Sunday).
    pub fn dow(&self) -> u32 {
        self.now.weekday().number_from_monday()
    }

    /// Day of the month, 1..=31.
    pub fn dom(&self) -> u32 {
        self.now.day()
    }

    /// Month of the year, 1..=12.
    pub fn moy(&self) -> u32 {
        self.now.month()
    }

    pub fn year(&self) -> i32 {
        self.now.year()
    }

    /// Zero-padded month label, e.g. `"03"`.
    pub fn moy_label(&self) -> String {
        format!("{:02}", self.moy())
    }

    pub fn year_label(&self) -> String {
        format!("{}", self.year())
    }

    /// Timestamp used in log lines: `YYYY-MM-DD HH:MM:SS`.
    pub fn log_stamp(&self) -> String {
        self.now.format("%Y-%m-%d %H:%M:%S").to_string()
    }

    /// Timestamp embedded in artifact file names: `YYYY-MM-DD_HH-MM`.
    pub fn artifact_stamp(&self) -> String {
        self.now.format("%Y-%m-%d_%H-%M").to_string()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
