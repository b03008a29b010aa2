// src/config/model.rs

//! Configuration data model.
//!
//! Two layers, as with the loader/validator split:
//! - `Raw*` types are a direct `serde` mapping of the JSON file;
//! - [`GlobalConfig`], [`JobSpec`] and [`WatchSpec`] are the validated,
//!   typed form the engine runs on (built in `validate.rs`).
//!
//! ```json
//! {
//!   "email": "ops@example.com",
//!   "rate_limit": 10,
//!   "schedule": {
//!     "report":  { "cmd": "bin/report", "when": "every 5m", "args": ["last_run"] },
//!     "publish": { "cmd": "bin/publish", "when": "after report", "maxtime": "2m" }
//!   },
//!   "watch": {
//!     "worker": { "cmd": "bin/worker --queue main", "notify": true, "mem_limit": "512m" }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::schedule::env::EnvMap;
use crate::schedule::trigger::Trigger;

/// Default dispatch tick.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(5000);

/// Top-level JSON document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    /// Detach and run in the background (requires `log` and `pid`).
    #[serde(default)]
    pub daemon: bool,

    /// Log file used in daemon mode.
    #[serde(default)]
    pub log: Option<PathBuf>,

    /// Pid file written in daemon mode and removed on shutdown.
    #[serde(default)]
    pub pid: Option<PathBuf>,

    /// Default notification address.
    #[serde(default)]
    pub email: Option<String>,

    /// Older spelling of `email`; `email` wins when both are set.
    #[serde(default)]
    pub admin: Option<String>,

    /// Recipient override for notifications.
    #[serde(default)]
    pub notify_email: Option<String>,

    /// Sender override for notifications.
    #[serde(default)]
    pub from_email: Option<String>,

    /// Minimum seconds between two (re)launches of the same watched process.
    #[serde(default)]
    pub rate_limit: Option<f64>,

    /// Dispatch tick in milliseconds. Any JSON number is accepted.
    #[serde(default)]
    pub check_interval: Option<f64>,

    /// Whether `after` dependents run when their upstream failed.
    #[serde(default)]
    pub after_on_failure: Option<bool>,

    /// Global environment layered over the supervisor's own environment.
    #[serde(default)]
    pub env: EnvMap,

    #[serde(default)]
    pub schedule: BTreeMap<String, RawJobConfig>,

    #[serde(default)]
    pub watch: BTreeMap<String, RawWatchConfig>,
}

/// `schedule.<name>` entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJobConfig {
    /// Missing `cmd` is reported at launch time, not at load time.
    #[serde(default)]
    pub cmd: Option<String>,
    #[serde(default)]
    pub when: String,
    /// Dynamic arguments appended after the command line (`"last_run"`).
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: EnvMap,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub output: Option<PathBuf>,
    /// Wall-clock limit, `N[smhd]`.
    #[serde(default)]
    pub maxtime: Option<String>,
}

/// `watch.<name>` entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawWatchConfig {
    #[serde(default)]
    pub cmd: Option<String>,
    #[serde(default)]
    pub notify: bool,
    #[serde(default)]
    pub env: EnvMap,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub output: Option<PathBuf>,
    /// Resident memory ceiling, `Nk|Nm|Ng`.
    #[serde(default)]
    pub mem_limit: Option<String>,
}

/// Dynamic argument appended to a job's argv at launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DynamicArg {
    /// Previous run's start time, formatted like log timestamps.
    LastRun,
    /// Logged at launch and skipped.
    Unrecognized(String),
}

impl DynamicArg {
    pub fn parse(token: &str) -> Self {
        match token {
            "last_run" => DynamicArg::LastRun,
            other => DynamicArg::Unrecognized(other.to_string()),
        }
    }
}

/// Validated scheduled job. Replaced wholesale on reload.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    pub name: String,
    pub cmd: Option<String>,
    pub trigger: Trigger,
    pub args: Vec<DynamicArg>,
    pub env: EnvMap,
    pub cwd: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub maxtime: Option<Duration>,
}

/// Validated watched process. Replaced wholesale on reload.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchSpec {
    pub name: String,
    pub cmd: Option<String>,
    pub notify: bool,
    pub env: EnvMap,
    pub cwd: Option<PathBuf>,
    pub output: Option<PathBuf>,
    /// Ceiling in bytes.
    pub mem_limit: Option<u64>,
}

/// Where notifications go.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationRouting {
    pub to: Option<String>,
    pub from: Option<String>,
}

/// Daemon-mode settings; consumed once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DaemonSettings {
    pub enabled: bool,
    pub log: Option<PathBuf>,
    pub pid: Option<PathBuf>,
}

/// The whole validated configuration.
#[derive(Debug, Clone)]
pub struct GlobalConfig {
    pub daemon: DaemonSettings,
    pub routing: NotificationRouting,
    pub rate_limit: Option<Duration>,
    pub check_interval: Duration,
    pub after_on_failure: bool,
    pub env: EnvMap,
    pub schedule: BTreeMap<String, JobSpec>,
    pub watch: BTreeMap<String, WatchSpec>,
}

impl GlobalConfig {
    /// Names of jobs whose trigger is `after <upstream>`.
    pub fn dependents_of(&self, upstream: &str) -> Vec<String> {
        self.schedule
            .values()
            .filter(|job| job.trigger.fires_after(upstream))
            .map(|job| job.name.clone())
            .collect()
    }
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            daemon: DaemonSettings::default(),
            routing: NotificationRouting::default(),
            rate_limit: None,
            check_interval: DEFAULT_CHECK_INTERVAL,
            after_on_failure: true,
            env: EnvMap::new(),
            schedule: BTreeMap::new(),
            watch: BTreeMap::new(),
        }
    }
}
