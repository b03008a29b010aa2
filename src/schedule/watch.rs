// src/schedule/watch.rs

//! Watched-Process Controller.
//!
//! One controller per `watch.<name>` entry. State machine:
//!
//! ```text
//! Stopped --ensure_running--> Running --exit--> Stopped --> ensure_running ...
//! Stopped --ensure_running (inside rate-limit window)--> RestartPending
//! RestartPending --timer--> Stopped --> ensure_running
//! ```
//!
//! `process` and `restart_pending` are never set at the same time.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::WatchSpec;
use crate::engine::{CoreCommand, Instance, LaunchRequest, Sequence, TimerId, TimerPurpose};
use crate::exec::argv::tokenize;
use crate::notify::{KillReason, Notice, NoticeKind};
use crate::schedule::env::{EnvChain, EnvMap};
use crate::types::{elapsed_since, EntryId, ExitOutcome, KillSignal, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningProcess {
    pub instance: Instance,
    pub pid: Option<u32>,
    /// A memory-limit kill was already issued for this instance.
    pub killed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct WatchState {
    pub process: Option<RunningProcess>,
    pub last_restart: Option<Timestamp>,
    pub restart_pending: Option<TimerId>,
    /// Output path bound to the live process, if any.
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct WatchController {
    spec: WatchSpec,
    env: EnvChain,
    state: WatchState,
}

impl WatchController {
    pub fn new(spec: WatchSpec, base_env: Arc<EnvMap>) -> Self {
        let env = EnvChain::new(spec.env.clone(), base_env);
        Self {
            spec,
            env,
            state: WatchState::default(),
        }
    }

    pub fn state(&self) -> &WatchState {
        &self.state
    }

    fn entry(&self) -> EntryId {
        EntryId::watch(&self.spec.name)
    }

    pub fn update_spec(&mut self, spec: WatchSpec, base_env: Arc<EnvMap>) {
        self.env = EnvChain::new(spec.env.clone(), base_env);
        self.spec = spec;
    }

    /// Watchdog entry point, called on every tick and after every exit.
    pub fn ensure_running(
        &mut self,
        now: Timestamp,
        rate_limit: Option<Duration>,
        seq: &mut Sequence,
    ) -> Vec<CoreCommand> {
        if let Some(process) = &self.state.process {
            return self.memory_check(process);
        }
        if self.state.restart_pending.is_some() {
            return Vec::new();
        }

        if let (Some(window), Some(last)) = (rate_limit, self.state.last_restart) {
            let elapsed = elapsed_since(&now, &last);
            if elapsed < window {
                let timer = seq.timer();
                let delay = window - elapsed;
                self.state.restart_pending = Some(timer);
                debug!(watch = %self.spec.name, ?delay, "restart rate-limited");
                return vec![CoreCommand::ArmTimer {
                    timer,
                    delay,
                    purpose: TimerPurpose::RestartWatch {
                        name: self.spec.name.clone(),
                    },
                }];
            }
        }

        self.launch(now, seq)
    }

    fn memory_check(&self, process: &RunningProcess) -> Vec<CoreCommand> {
        match (self.spec.mem_limit, process.pid) {
            (Some(_), Some(pid)) if !process.killed => vec![CoreCommand::SampleMemory {
                name: self.spec.name.clone(),
                instance: process.instance,
                pid,
            }],
            _ => Vec::new(),
        }
    }

    fn launch(&mut self, now: Timestamp, seq: &mut Sequence) -> Vec<CoreCommand> {
        let Some(cmd) = self.spec.cmd.as_deref() else {
            error!(watch = %self.spec.name, "cannot launch: missing `cmd`");
            return Vec::new();
        };
        let argv = tokenize(cmd, |key| self.env.get(key));
        if argv.is_empty() {
            error!(watch = %self.spec.name, "cannot launch: empty command line");
            return Vec::new();
        }

        info!(watch = %self.spec.name, "{} is not running, restarting", self.spec.name);

        let instance = seq.instance();
        self.state.process = Some(RunningProcess {
            instance,
            pid: None,
            killed: false,
        });
        self.state.last_restart = Some(now);
        self.state.output = self.spec.output.clone();

        vec![CoreCommand::Launch(LaunchRequest {
            entry: self.entry(),
            instance,
            argv,
            env: self.env.resolved(),
            cwd: self.spec.cwd.clone(),
            output: self.spec.output.clone(),
        })]
    }

    pub fn on_launched(&mut self, instance: Instance, pid: u32) -> Vec<CoreCommand> {
        match self.state.process.as_mut() {
            Some(process) if process.instance == instance => {
                process.pid = Some(pid);
                info!(watch = %self.spec.name, pid, "{} started", self.spec.name);
                if self.spec.notify {
                    return vec![CoreCommand::Notify(Notice::new(
                        NoticeKind::Restarted,
                        &self.spec.name,
                        Some(pid),
                    ))];
                }
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    /// Start failure: back to Stopped, error notice. The next tick retries.
    pub fn on_launch_failed(&mut self, instance: Instance, reason: &str) -> Vec<CoreCommand> {
        if !self.is_current(instance) {
            return Vec::new();
        }
        self.state.process = None;
        self.state.output = None;
        error!(watch = %self.spec.name, error = %reason, "failed to start watched process");
        vec![
            CoreCommand::ReleaseOutput(self.entry()),
            CoreCommand::Notify(
                Notice::new(NoticeKind::Error, &self.spec.name, None)
                    .with_body(format!("Failed to start: {reason}")),
            ),
        ]
    }

    /// Exit: clear the handle, close the sink, report nonzero codes, and go
    /// straight back through `ensure_running` (still rate-limited).
    pub fn on_exit(
        &mut self,
        instance: Instance,
        pid: u32,
        outcome: ExitOutcome,
        now: Timestamp,
        rate_limit: Option<Duration>,
        seq: &mut Sequence,
    ) -> Vec<CoreCommand> {
        if !self.is_current(instance) {
            debug!(watch = %self.spec.name, instance, pid, "exit for stale instance ignored");
            return Vec::new();
        }
        let killed = self.state.process.take().is_some_and(|p| p.killed);
        let output = self.state.output.take();
        let mut commands = vec![CoreCommand::ReleaseOutput(self.entry())];

        match outcome {
            ExitOutcome::Code(0) => {
                info!(watch = %self.spec.name, pid, "{} exited", self.spec.name);
            }
            ExitOutcome::Code(code) => {
                warn!(watch = %self.spec.name, pid, code, "{} returned code {code}", self.spec.name);
                let mut notice =
                    Notice::new(NoticeKind::ReturnedCode(code), &self.spec.name, Some(pid));
                if let Some(path) = output {
                    notice = notice.with_body(format!("Output: {}", path.display()));
                }
                commands.push(CoreCommand::Notify(notice));
            }
            ExitOutcome::Signaled(signal) if killed => {
                info!(watch = %self.spec.name, pid, signal, "{} killed over memory limit", self.spec.name);
            }
            ExitOutcome::Signaled(signal) => {
                warn!(watch = %self.spec.name, pid, signal, "{} terminated by signal {signal}", self.spec.name);
            }
        }

        commands.extend(self.ensure_running(now, rate_limit, seq));
        commands
    }

    /// Rate-limit timer fired.
    pub fn on_restart_timer(
        &mut self,
        timer: TimerId,
        now: Timestamp,
        rate_limit: Option<Duration>,
        seq: &mut Sequence,
    ) -> Vec<CoreCommand> {
        if self.state.restart_pending != Some(timer) {
            debug!(watch = %self.spec.name, timer, "stale restart timer ignored");
            return Vec::new();
        }
        self.state.restart_pending = None;
        self.ensure_running(now, rate_limit, seq)
    }

    /// Result of a memory query; kills the process above its ceiling.
    pub fn on_memory_sample(&mut self, instance: Instance, pid: u32, rss_bytes: u64) -> Vec<CoreCommand> {
        let Some(limit) = self.spec.mem_limit else {
            return Vec::new();
        };
        let Some(process) = self.state.process.as_mut() else {
            return Vec::new();
        };
        if process.instance != instance || process.pid != Some(pid) || process.killed {
            return Vec::new();
        }
        if rss_bytes <= limit {
            debug!(watch = %self.spec.name, pid, rss_bytes, limit, "memory within limit");
            return Vec::new();
        }

        process.killed = true;
        warn!(
            watch = %self.spec.name,
            pid,
            rss_bytes,
            limit,
            "{} exceeded its memory limit, killing",
            self.spec.name
        );
        vec![
            CoreCommand::Kill {
                pid,
                signal: KillSignal::Kill,
            },
            CoreCommand::Notify(
                Notice::new(
                    NoticeKind::Killed(KillReason::MemoryLimit),
                    &self.spec.name,
                    Some(pid),
                )
                .with_body(format!(
                    "Resident memory: {rss_bytes} bytes (limit {limit} bytes)"
                )),
            ),
        ]
    }

    /// Cancel a pending restart, kill the live process, close the sink.
    pub fn teardown(&mut self) -> Vec<CoreCommand> {
        let mut commands = Vec::new();
        if let Some(timer) = self.state.restart_pending.take() {
            commands.push(CoreCommand::CancelTimer(timer));
        }
        if let Some(process) = self.state.process.take() {
            if let Some(pid) = process.pid {
                info!(watch = %self.spec.name, pid, "stopping watched process");
                commands.push(CoreCommand::Kill {
                    pid,
                    signal: KillSignal::Terminate,
                });
            }
        }
        self.state.output = None;
        commands.push(CoreCommand::ReleaseOutput(self.entry()));
        commands
    }

    fn is_current(&self, instance: Instance) -> bool {
        self.state
            .process
            .as_ref()
            .is_some_and(|p| p.instance == instance)
    }
}
