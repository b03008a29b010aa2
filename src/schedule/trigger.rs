// src/schedule/trigger.rs

//! Trigger Evaluator.
//!
//! Parses the `when` expression of a scheduled job into a tagged variant and
//! answers "should this fire now?". Also hosts the small unit parsers shared
//! by the config layer (`maxtime`, `rate_limit`, `mem_limit`).
//!
//! Grammar:
//! - `every <number><unit>` with unit in `s`, `m`, `h`, `d`; the number may be
//!   fractional (`every 0.01s`).
//! - `after <job-name>`.
//!
//! Anything else parses to [`Trigger::Unrecognized`]: such a job is never
//! time-triggered but may still be reached through another job's `after`.

use std::fmt;
use std::time::Duration;

use crate::types::{elapsed_since, Timestamp};

/// Unit suffix of an interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    fn from_suffix(c: char) -> Option<Self> {
        match c {
            's' => Some(TimeUnit::Seconds),
            'm' => Some(TimeUnit::Minutes),
            'h' => Some(TimeUnit::Hours),
            'd' => Some(TimeUnit::Days),
            _ => None,
        }
    }

    /// Seconds per unit.
    pub fn multiplier(&self) -> f64 {
        match self {
            TimeUnit::Seconds => 1.0,
            TimeUnit::Minutes => 60.0,
            TimeUnit::Hours => 3600.0,
            TimeUnit::Days => 86400.0,
        }
    }

    fn suffix(&self) -> char {
        match self {
            TimeUnit::Seconds => 's',
            TimeUnit::Minutes => 'm',
            TimeUnit::Hours => 'h',
            TimeUnit::Days => 'd',
        }
    }
}

/// Parsed form of a job's `when` expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    Interval { amount: f64, unit: TimeUnit },
    After { upstream: String },
    Unrecognized(String),
}

impl Trigger {
    pub fn parse(expr: &str) -> Self {
        if let Some(rest) = expr.strip_prefix("every ") {
            if let Some((amount, unit)) = split_amount_unit(rest) {
                return Trigger::Interval { amount, unit };
            }
        } else if let Some(rest) = expr.strip_prefix("after ") {
            let upstream = rest.trim();
            if !upstream.is_empty() {
                return Trigger::After {
                    upstream: upstream.to_string(),
                };
            }
        }
        Trigger::Unrecognized(expr.to_string())
    }

    /// Interval length for `every` triggers.
    pub fn interval(&self) -> Option<Duration> {
        match self {
            Trigger::Interval { amount, unit } => {
                Duration::try_from_secs_f64(amount * unit.multiplier()).ok()
            }
            _ => None,
        }
    }

    /// Upstream job name for `after` triggers.
    pub fn upstream(&self) -> Option<&str> {
        match self {
            Trigger::After { upstream } => Some(upstream),
            _ => None,
        }
    }

    /// Time-based check run on every dispatch tick.
    ///
    /// Fires when `now - last_run >= interval`. `after` and unrecognized
    /// triggers never fire on a tick.
    pub fn is_due(&self, now: &Timestamp, last_run: &Timestamp) -> bool {
        match self.interval() {
            Some(interval) => elapsed_since(now, last_run) >= interval,
            None => false,
        }
    }

    /// Completion-based check: does a completion of `upstream` fire this trigger?
    pub fn fires_after(&self, upstream: &str) -> bool {
        self.upstream() == Some(upstream)
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Interval { amount, unit } => write!(f, "every {amount}{}", unit.suffix()),
            Trigger::After { upstream } => write!(f, "after {upstream}"),
            Trigger::Unrecognized(raw) => write!(f, "{raw}"),
        }
    }
}

fn split_amount_unit(s: &str) -> Option<(f64, TimeUnit)> {
    let s = s.trim();
    let unit_char = s.chars().last()?;
    let unit = TimeUnit::from_suffix(unit_char)?;
    let number = &s[..s.len() - unit_char.len_utf8()];
    let amount: f64 = number.trim().parse().ok()?;
    if !amount.is_finite() || amount < 0.0 {
        return None;
    }
    Some((amount, unit))
}

/// Parse a `N[smhd]` duration such as a job's `maxtime` (`"0.01s"`, `"2h"`).
pub fn parse_duration(s: &str) -> Option<Duration> {
    let (amount, unit) = split_amount_unit(s)?;
    Duration::try_from_secs_f64(amount * unit.multiplier()).ok()
}

/// Parse a memory ceiling such as `"512k"`, `"64m"` or `"1.5g"` into bytes.
///
/// Suffixes are binary multiples and case-insensitive.
pub fn parse_memory_size(s: &str) -> Option<u64> {
    let s = s.trim();
    let suffix = s.chars().last()?;
    let multiplier: f64 = match suffix.to_ascii_lowercase() {
        'k' => 1024.0,
        'm' => 1024.0 * 1024.0,
        'g' => 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };
    let amount: f64 = s[..s.len() - suffix.len_utf8()].trim().parse().ok()?;
    if !amount.is_finite() || amount <= 0.0 {
        return None;
    }
    Some((amount * multiplier) as u64)
}
