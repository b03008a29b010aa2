// src/schedule/job.rs

//! Scheduled-Job Controller.
//!
//! One controller per `schedule.<name>` entry. State machine:
//!
//! ```text
//! Idle --trigger--> Running --exit / launch failure--> Idle
//!                   Running --trigger--> Running   (skipped, logged)
//! ```
//!
//! The controller never performs IO; every effect is returned as a
//! [`CoreCommand`] for the runtime shell to execute.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::{DynamicArg, JobSpec};
use crate::engine::{CoreCommand, Instance, LaunchRequest, Sequence, TimerId, TimerPurpose};
use crate::exec::argv::tokenize;
use crate::notify::{KillReason, Notice, NoticeKind};
use crate::schedule::env::{EnvChain, EnvMap};
use crate::types::{
    far_past, format_timestamp, EntryId, ExitOutcome, KillSignal, Timestamp,
};

/// Why `evaluate` is being called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fire<'a> {
    /// Periodic dispatch tick: only interval triggers can fire.
    Tick,
    /// The named upstream job just finished.
    Upstream(&'a str),
}

/// How a run ended, as seen by `after` dependents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningJob {
    pub instance: Instance,
    /// Known once the launcher reports back.
    pub pid: Option<u32>,
    pub deadline: Option<TimerId>,
    /// A `maxtime` kill was already issued for this run.
    pub killed: bool,
}

#[derive(Debug, Clone)]
pub struct ScheduleState {
    pub last_run: Timestamp,
    pub running: Option<RunningJob>,
}

impl Default for ScheduleState {
    fn default() -> Self {
        Self {
            last_run: far_past(),
            running: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobController {
    spec: JobSpec,
    env: EnvChain,
    state: ScheduleState,
}

impl JobController {
    pub fn new(spec: JobSpec, base_env: Arc<EnvMap>) -> Self {
        let env = EnvChain::new(spec.env.clone(), base_env);
        Self {
            spec,
            env,
            state: ScheduleState::default(),
        }
    }

    pub fn spec(&self) -> &JobSpec {
        &self.spec
    }

    pub fn state(&self) -> &ScheduleState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.running.is_some()
    }

    fn entry(&self) -> EntryId {
        EntryId::job(&self.spec.name)
    }

    /// Swap in a reloaded spec, keeping run state (and any live process).
    pub fn update_spec(&mut self, spec: JobSpec, base_env: Arc<EnvMap>) {
        self.env = EnvChain::new(spec.env.clone(), base_env);
        self.spec = spec;
    }

    /// Decide whether to launch now, and if so produce the launch.
    pub fn evaluate(&mut self, now: Timestamp, fire: Fire<'_>, seq: &mut Sequence) -> Vec<CoreCommand> {
        let fires = match fire {
            Fire::Tick => self.spec.trigger.is_due(&now, &self.state.last_run),
            Fire::Upstream(upstream) => self.spec.trigger.fires_after(upstream),
        };
        if !fires {
            return Vec::new();
        }

        if let Some(running) = &self.state.running {
            info!(job = %self.spec.name, pid = ?running.pid, "{} is still running, skipping", self.spec.name);
            return Vec::new();
        }

        let argv = match self.build_argv() {
            Ok(argv) => argv,
            Err(reason) => {
                error!(job = %self.spec.name, "cannot launch: {reason}");
                return Vec::new();
            }
        };

        let instance = seq.instance();
        self.state.last_run = now;
        info!(job = %self.spec.name, instance, "exec {}: {}", self.spec.name, argv.join(" "));

        let mut commands = vec![CoreCommand::Launch(LaunchRequest {
            entry: self.entry(),
            instance,
            argv,
            env: self.env.resolved(),
            cwd: self.spec.cwd.clone(),
            output: self.spec.output.clone(),
        })];

        let deadline = self.spec.maxtime.map(|delay| {
            let timer = seq.timer();
            commands.push(CoreCommand::ArmTimer {
                timer,
                delay,
                purpose: TimerPurpose::JobDeadline {
                    name: self.spec.name.clone(),
                    instance,
                },
            });
            timer
        });

        self.state.running = Some(RunningJob {
            instance,
            pid: None,
            deadline,
            killed: false,
        });

        commands
    }

    /// Command line with `$NAME` expansion and dynamic arguments appended.
    fn build_argv(&self) -> Result<Vec<String>, String> {
        let cmd = self
            .spec
            .cmd
            .as_deref()
            .ok_or_else(|| "missing `cmd`".to_string())?;

        let mut argv = tokenize(cmd, |key| self.env.get(key));
        if argv.is_empty() {
            return Err("empty command line".to_string());
        }

        for arg in &self.spec.args {
            match arg {
                DynamicArg::LastRun => argv.push(format_timestamp(&self.state.last_run)),
                DynamicArg::Unrecognized(token) => {
                    warn!(job = %self.spec.name, "Unrecognized dyn arg: {token}");
                }
            }
        }
        Ok(argv)
    }

    fn is_current(&self, instance: Instance) -> bool {
        self.state
            .running
            .as_ref()
            .is_some_and(|r| r.instance == instance)
    }

    pub fn on_launched(&mut self, instance: Instance, pid: u32) {
        match self.state.running.as_mut() {
            Some(running) if running.instance == instance => {
                running.pid = Some(pid);
                debug!(job = %self.spec.name, instance, pid, "job started");
            }
            _ => debug!(job = %self.spec.name, instance, pid, "launch report for stale instance"),
        }
    }

    /// The launcher could not start the process. Returns to Idle and reports
    /// an error notice.
    pub fn on_launch_failed(
        &mut self,
        instance: Instance,
        reason: &str,
    ) -> (Vec<CoreCommand>, Option<Completion>) {
        if !self.is_current(instance) {
            return (Vec::new(), None);
        }
        let mut commands = self.finish_run();
        error!(job = %self.spec.name, error = %reason, "failed to start job");
        commands.push(CoreCommand::Notify(
            Notice::new(NoticeKind::Error, &self.spec.name, None)
                .with_body(format!("Failed to start: {reason}")),
        ));
        (commands, Some(Completion::Failed))
    }

    /// Handle process exit. Returns to Idle; a nonzero code is notified.
    pub fn on_exit(
        &mut self,
        instance: Instance,
        pid: u32,
        outcome: ExitOutcome,
    ) -> (Vec<CoreCommand>, Option<Completion>) {
        if !self.is_current(instance) {
            debug!(job = %self.spec.name, instance, pid, "exit for stale instance ignored");
            return (Vec::new(), None);
        }
        let killed = self.state.running.as_ref().is_some_and(|r| r.killed);
        let mut commands = self.finish_run();

        let completion = match outcome {
            ExitOutcome::Code(0) => {
                info!(job = %self.spec.name, pid, "{}: finished", self.spec.name);
                Completion::Succeeded
            }
            ExitOutcome::Code(code) => {
                warn!(job = %self.spec.name, pid, code, "{}: returned code {code}", self.spec.name);
                commands.push(CoreCommand::Notify(Notice::new(
                    NoticeKind::ReturnedCode(code),
                    &self.spec.name,
                    Some(pid),
                )));
                Completion::Failed
            }
            ExitOutcome::Signaled(signal) if killed => {
                info!(job = %self.spec.name, pid, signal, "{}: killed after maxtime", self.spec.name);
                Completion::Failed
            }
            ExitOutcome::Signaled(signal) => {
                warn!(job = %self.spec.name, pid, signal, "{}: terminated by signal {signal}", self.spec.name);
                Completion::Failed
            }
        };

        (commands, Some(completion))
    }

    /// `maxtime` elapsed for `instance`: kill it if it is still the live run.
    pub fn on_deadline(&mut self, instance: Instance) -> Vec<CoreCommand> {
        let Some(running) = self.state.running.as_mut() else {
            return Vec::new();
        };
        if running.instance != instance || running.killed {
            return Vec::new();
        }
        running.deadline = None;

        let Some(pid) = running.pid else {
            warn!(job = %self.spec.name, instance, "maxtime reached before pid was known");
            return Vec::new();
        };
        running.killed = true;
        warn!(job = %self.spec.name, pid, "{} exceeded maxtime, killing", self.spec.name);

        vec![
            CoreCommand::Kill {
                pid,
                signal: KillSignal::Kill,
            },
            CoreCommand::Notify(Notice::new(
                NoticeKind::Killed(KillReason::MaxTime),
                &self.spec.name,
                Some(pid),
            )),
        ]
    }

    /// Stop everything this controller owns (entry removed or shutdown).
    pub fn teardown(&mut self) -> Vec<CoreCommand> {
        let mut commands = Vec::new();
        if let Some(running) = self.state.running.take() {
            if let Some(timer) = running.deadline {
                commands.push(CoreCommand::CancelTimer(timer));
            }
            if let Some(pid) = running.pid {
                info!(job = %self.spec.name, pid, "stopping job");
                commands.push(CoreCommand::Kill {
                    pid,
                    signal: KillSignal::Terminate,
                });
            }
        }
        commands.push(CoreCommand::ReleaseOutput(self.entry()));
        commands
    }

    /// Back to Idle; cancels a pending deadline and closes the output sink
    /// so the file can be rotated between runs.
    fn finish_run(&mut self) -> Vec<CoreCommand> {
        let mut commands = Vec::new();
        if let Some(timer) = self.state.running.take().and_then(|r| r.deadline) {
            commands.push(CoreCommand::CancelTimer(timer));
        }
        commands.push(CoreCommand::ReleaseOutput(self.entry()));
        commands
    }
}
