// src/engine/mod.rs

//! Supervision engine for custodian.
//!
//! This module ties together:
//! - the scheduled-job and watched-process controllers
//! - the reconciler (startup build + reload diff)
//! - the main runtime event loop that reacts to:
//!   - dispatch ticks
//!   - launch results, process exits and memory samples
//!   - timers (rate-limit restarts, `maxtime` deadlines)
//!   - reload and shutdown signals
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use std::path::PathBuf;
use std::time::Duration;

use crate::config::GlobalConfig;
use crate::notify::Notice;
use crate::schedule::env::EnvMap;
use crate::types::{EntryId, ExitOutcome, KillSignal};

/// Identifier of one launch of an entry. Events carrying an older instance
/// than the controller's current one are stale and ignored.
pub type Instance = u64;

/// Identifier of an armed timer.
pub type TimerId = u64;

/// What a timer means when it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerPurpose {
    /// Rate-limit window for a watched process elapsed.
    RestartWatch { name: String },
    /// A job's `maxtime` elapsed.
    JobDeadline { name: String, instance: Instance },
}

/// Everything the launcher needs to start one child.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchRequest {
    pub entry: EntryId,
    pub instance: Instance,
    pub argv: Vec<String>,
    pub env: EnvMap,
    pub cwd: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

/// Events flowing into the core from the dispatch interval, the executor,
/// timers and signal handlers.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// Periodic dispatch tick.
    Tick,
    /// The launcher started a child for `instance`.
    Launched {
        entry: EntryId,
        instance: Instance,
        pid: u32,
    },
    /// The launcher could not start a child (executable missing, ...).
    LaunchFailed {
        entry: EntryId,
        instance: Instance,
        error: String,
    },
    /// A child exited.
    ProcessExited {
        entry: EntryId,
        instance: Instance,
        pid: u32,
        outcome: ExitOutcome,
    },
    TimerFired {
        timer: TimerId,
        purpose: TimerPurpose,
    },
    /// Result of an asynchronous memory query for a watched process.
    MemorySampled {
        name: String,
        instance: Instance,
        pid: u32,
        rss_bytes: u64,
    },
    /// Reload signal received; the shell reads the config file.
    ReloadRequested,
    /// A freshly loaded config to reconcile against.
    ConfigReloaded(Box<GlobalConfig>),
    /// Graceful shutdown requested (SIGTERM / Ctrl-C).
    ShutdownRequested,
}

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreCommand {
    Launch(LaunchRequest),
    Kill { pid: u32, signal: KillSignal },
    ArmTimer {
        timer: TimerId,
        delay: Duration,
        purpose: TimerPurpose,
    },
    CancelTimer(TimerId),
    SampleMemory {
        name: String,
        instance: Instance,
        pid: u32,
    },
    /// Close the output sink held for this entry.
    ReleaseOutput(EntryId),
    Notify(Notice),
    /// Re-read the config file (answer to `ReloadRequested`).
    LoadConfig,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone, Default)]
pub struct CoreStep {
    /// Commands the IO shell should execute, in order.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

/// Monotonic id source for launches and timers.
#[derive(Debug, Default)]
pub struct Sequence {
    next_instance: Instance,
    next_timer: TimerId,
}

impl Sequence {
    pub fn instance(&mut self) -> Instance {
        self.next_instance += 1;
        self.next_instance
    }

    pub fn timer(&mut self) -> TimerId {
        self.next_timer += 1;
        self.next_timer
    }
}

pub mod core;
pub mod reconcile;
pub mod runtime;

pub use core::CoreRuntime;
pub use runtime::Runtime;
