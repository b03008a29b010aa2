// src/types.rs

//! Small shared types used by the controllers, the engine and the executor.

use std::fmt;

use chrono::{DateTime, Local, TimeZone};

/// Wall-clock instant used for all scheduling decisions.
pub type Timestamp = DateTime<Local>;

/// `strftime` pattern for log lines and the `last_run` dynamic argument
/// (`yyyy-mm-dd HH:MM:ss`).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format a timestamp the same way log lines are stamped.
pub fn format_timestamp(ts: &Timestamp) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// The "never ran" marker: far enough in the past that any interval trigger
/// is due on the first dispatch tick.
pub fn far_past() -> Timestamp {
    Local
        .with_ymd_and_hms(1980, 1, 1, 0, 0, 0)
        .earliest()
        .unwrap_or_default()
}

/// Elapsed time from `earlier` to `now`, clamped at zero if the clock went
/// backwards.
pub fn elapsed_since(now: &Timestamp, earlier: &Timestamp) -> std::time::Duration {
    now.signed_duration_since(*earlier)
        .to_std()
        .unwrap_or(std::time::Duration::ZERO)
}

/// Which config section an entry lives in.
///
/// A scheduled job and a watched process may share a name, so every process
/// the executor tracks is keyed by kind as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntryKind {
    Job,
    Watch,
}

/// Identity of a configured entry (`schedule.<name>` or `watch.<name>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId {
    pub kind: EntryKind,
    pub name: String,
}

impl EntryId {
    pub fn job(name: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::Job,
            name: name.into(),
        }
    }

    pub fn watch(name: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::Watch,
            name: name.into(),
        }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EntryKind::Job => write!(f, "schedule.{}", self.name),
            EntryKind::Watch => write!(f, "watch.{}", self.name),
        }
    }
}

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Exited on its own with this code.
    Code(i32),
    /// Terminated by this signal number.
    Signaled(i32),
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitOutcome::Code(code) => write!(f, "code {code}"),
            ExitOutcome::Signaled(sig) => write!(f, "signal {sig}"),
        }
    }
}

/// Signal used when the supervisor stops a child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillSignal {
    /// Polite stop (reconciliation removal, shutdown).
    Terminate,
    /// Forced stop (resource limits).
    Kill,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_format_matches_log_layout() {
        let ts = Local.with_ymd_and_hms(2011, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(format_timestamp(&ts), "2011-03-04 05:06:07");
    }

    #[test]
    fn elapsed_never_goes_negative() {
        let now = Local::now();
        let later = now + chrono::TimeDelta::seconds(10);
        assert_eq!(elapsed_since(&now, &later), std::time::Duration::ZERO);
        assert_eq!(elapsed_since(&later, &now), std::time::Duration::from_secs(10));
    }

    #[test]
    fn entry_ids_with_same_name_differ_by_kind() {
        assert_ne!(EntryId::job("a"), EntryId::watch("a"));
        assert_eq!(EntryId::watch("a").to_string(), "watch.a");
    }
}
