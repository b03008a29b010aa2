// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated controller registry
//! - a list of [`CoreCommand`]s describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - the dispatch interval and signal-driven events
//! - launching, killing and sampling processes through the executor
//! - timers and notification delivery
//!
//! The current time is passed into every step, so the core is unit tested
//! without any Tokio, channels, filesystem, or processes.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::GlobalConfig;
use crate::schedule::env::{base_layer, EnvMap};
use crate::schedule::{Completion, Fire, JobController, WatchController};
use crate::types::{EntryId, EntryKind, ExitOutcome, Timestamp};

use super::reconcile::Controllers;
use super::{CoreCommand, CoreStep, Instance, RuntimeEvent, Sequence, TimerId, TimerPurpose};

/// Pure core runtime state.
///
/// This owns:
/// - the active `GlobalConfig`
/// - one controller per configured job and watch
/// - the instance/timer id sequence
#[derive(Debug)]
pub struct CoreRuntime {
    config: GlobalConfig,
    ambient: EnvMap,
    base_env: Arc<EnvMap>,
    controllers: Controllers,
    seq: Sequence,
}

impl CoreRuntime {
    /// `ambient` is the supervisor's own environment (plus the supervised
    /// marker), captured once at startup.
    pub fn new(config: GlobalConfig, ambient: EnvMap) -> Self {
        let base_env = base_layer(&ambient, &config.env);
        let controllers = Controllers::build(&config, &base_env);
        Self {
            config,
            ambient,
            base_env,
            controllers,
            seq: Sequence::default(),
        }
    }

    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    pub fn check_interval(&self) -> Duration {
        self.config.check_interval
    }

    pub fn job(&self, name: &str) -> Option<&JobController> {
        self.controllers.jobs.get(name)
    }

    pub fn watch(&self, name: &str) -> Option<&WatchController> {
        self.controllers.watches.get(name)
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent, now: Timestamp) -> CoreStep {
        let commands = match event {
            RuntimeEvent::Tick => self.on_tick(now),
            RuntimeEvent::Launched {
                entry,
                instance,
                pid,
            } => self.on_launched(&entry, instance, pid),
            RuntimeEvent::LaunchFailed {
                entry,
                instance,
                error,
            } => self.on_launch_failed(&entry, instance, &error, now),
            RuntimeEvent::ProcessExited {
                entry,
                instance,
                pid,
                outcome,
            } => self.on_exit(&entry, instance, pid, outcome, now),
            RuntimeEvent::TimerFired { timer, purpose } => self.on_timer(timer, purpose, now),
            RuntimeEvent::MemorySampled {
                name,
                instance,
                pid,
                rss_bytes,
            } => match self.controllers.watches.get_mut(&name) {
                Some(watch) => watch.on_memory_sample(instance, pid, rss_bytes),
                None => Vec::new(),
            },
            RuntimeEvent::ReloadRequested => {
                info!("reload requested");
                vec![CoreCommand::LoadConfig]
            }
            RuntimeEvent::ConfigReloaded(config) => self.on_reload(*config),
            RuntimeEvent::ShutdownRequested => {
                info!("shutdown requested; stopping all children");
                return CoreStep {
                    commands: self.controllers.teardown_all(),
                    keep_running: false,
                };
            }
        };

        CoreStep {
            commands,
            keep_running: true,
        }
    }

    /// One dispatch pass: every job's trigger, then every watch's liveness.
    fn on_tick(&mut self, now: Timestamp) -> Vec<CoreCommand> {
        let mut commands = Vec::new();
        for job in self.controllers.jobs.values_mut() {
            commands.extend(job.evaluate(now, Fire::Tick, &mut self.seq));
        }
        let rate_limit = self.config.rate_limit;
        for watch in self.controllers.watches.values_mut() {
            commands.extend(watch.ensure_running(now, rate_limit, &mut self.seq));
        }
        commands
    }

    fn on_launched(&mut self, entry: &EntryId, instance: Instance, pid: u32) -> Vec<CoreCommand> {
        match entry.kind {
            EntryKind::Job => {
                if let Some(job) = self.controllers.jobs.get_mut(&entry.name) {
                    job.on_launched(instance, pid);
                }
                Vec::new()
            }
            EntryKind::Watch => match self.controllers.watches.get_mut(&entry.name) {
                Some(watch) => watch.on_launched(instance, pid),
                None => Vec::new(),
            },
        }
    }

    fn on_launch_failed(
        &mut self,
        entry: &EntryId,
        instance: Instance,
        error: &str,
        now: Timestamp,
    ) -> Vec<CoreCommand> {
        match entry.kind {
            EntryKind::Job => {
                let Some(job) = self.controllers.jobs.get_mut(&entry.name) else {
                    return Vec::new();
                };
                let (mut commands, completion) = job.on_launch_failed(instance, error);
                commands.extend(self.fire_dependents(&entry.name, completion, now));
                commands
            }
            EntryKind::Watch => match self.controllers.watches.get_mut(&entry.name) {
                Some(watch) => watch.on_launch_failed(instance, error),
                None => Vec::new(),
            },
        }
    }

    fn on_exit(
        &mut self,
        entry: &EntryId,
        instance: Instance,
        pid: u32,
        outcome: ExitOutcome,
        now: Timestamp,
    ) -> Vec<CoreCommand> {
        match entry.kind {
            EntryKind::Job => {
                let Some(job) = self.controllers.jobs.get_mut(&entry.name) else {
                    debug!(job = %entry.name, pid, "exit for unknown job ignored");
                    return Vec::new();
                };
                // The upstream's own handling completes before any dependent
                // is evaluated.
                let (mut commands, completion) = job.on_exit(instance, pid, outcome);
                commands.extend(self.fire_dependents(&entry.name, completion, now));
                commands
            }
            EntryKind::Watch => {
                let rate_limit = self.config.rate_limit;
                match self.controllers.watches.get_mut(&entry.name) {
                    Some(watch) => {
                        watch.on_exit(instance, pid, outcome, now, rate_limit, &mut self.seq)
                    }
                    None => {
                        debug!(watch = %entry.name, pid, "exit for unknown watch ignored");
                        Vec::new()
                    }
                }
            }
        }
    }

    /// Evaluate every `after <upstream>` job once for this completion.
    fn fire_dependents(
        &mut self,
        upstream: &str,
        completion: Option<Completion>,
        now: Timestamp,
    ) -> Vec<CoreCommand> {
        let fire = match completion {
            Some(Completion::Succeeded) => true,
            Some(Completion::Failed) => self.config.after_on_failure,
            None => false,
        };
        if !fire {
            return Vec::new();
        }

        let mut commands = Vec::new();
        for name in self.config.dependents_of(upstream) {
            if let Some(job) = self.controllers.jobs.get_mut(&name) {
                debug!(job = %name, upstream, "upstream completed; evaluating dependent");
                commands.extend(job.evaluate(now, Fire::Upstream(upstream), &mut self.seq));
            }
        }
        commands
    }

    fn on_timer(&mut self, timer: TimerId, purpose: TimerPurpose, now: Timestamp) -> Vec<CoreCommand> {
        match purpose {
            TimerPurpose::RestartWatch { name } => {
                let rate_limit = self.config.rate_limit;
                match self.controllers.watches.get_mut(&name) {
                    Some(watch) => watch.on_restart_timer(timer, now, rate_limit, &mut self.seq),
                    None => Vec::new(),
                }
            }
            TimerPurpose::JobDeadline { name, instance } => {
                match self.controllers.jobs.get_mut(&name) {
                    Some(job) => job.on_deadline(instance),
                    None => Vec::new(),
                }
            }
        }
    }

    fn on_reload(&mut self, config: GlobalConfig) -> Vec<CoreCommand> {
        self.base_env = base_layer(&self.ambient, &config.env);
        let commands = self.controllers.reconcile(&config, &self.base_env);
        info!(
            jobs = config.schedule.len(),
            watches = config.watch.len(),
            "configuration reloaded"
        );
        self.config = config;
        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{JobSpec, WatchSpec};
    use crate::notify::NoticeKind;
    use crate::schedule::trigger::Trigger;
    use crate::types::KillSignal;
    use chrono::{Local, TimeDelta};

    fn job(name: &str, when: &str) -> JobSpec {
        JobSpec {
            name: name.to_string(),
            cmd: Some(format!("run_{name}")),
            trigger: Trigger::parse(when),
            args: Vec::new(),
            env: EnvMap::new(),
            cwd: None,
            output: None,
            maxtime: None,
        }
    }

    fn watch(name: &str) -> WatchSpec {
        WatchSpec {
            name: name.to_string(),
            cmd: Some(format!("serve_{name}")),
            notify: true,
            env: EnvMap::new(),
            cwd: None,
            output: None,
            mem_limit: None,
        }
    }

    fn core(jobs: &[JobSpec], watches: &[WatchSpec]) -> CoreRuntime {
        let config = GlobalConfig {
            schedule: jobs.iter().map(|j| (j.name.clone(), j.clone())).collect(),
            watch: watches.iter().map(|w| (w.name.clone(), w.clone())).collect(),
            ..GlobalConfig::default()
        };
        CoreRuntime::new(config, EnvMap::new())
    }

    fn launches(step: &CoreStep) -> Vec<(EntryId, Instance)> {
        step.commands
            .iter()
            .filter_map(|c| match c {
                CoreCommand::Launch(req) => Some((req.entry.clone(), req.instance)),
                _ => None,
            })
            .collect()
    }

    fn notices(step: &CoreStep) -> Vec<NoticeKind> {
        step.commands
            .iter()
            .filter_map(|c| match c {
                CoreCommand::Notify(n) => Some(n.kind.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn first_tick_launches_jobs_and_watches() {
        let mut core = core(&[job("a", "every 1h")], &[watch("w")]);
        let step = core.step(RuntimeEvent::Tick, Local::now());
        assert!(step.keep_running);
        assert_eq!(
            launches(&step),
            vec![(EntryId::job("a"), 1), (EntryId::watch("w"), 2)]
        );
    }

    #[test]
    fn dependents_fire_after_upstream_exit_handling() {
        let mut core = core(
            &[job("up", "every 1h"), job("down1", "after up"), job("down2", "after up")],
            &[],
        );
        let now = Local::now();
        core.step(RuntimeEvent::Tick, now);
        core.step(
            RuntimeEvent::Launched { entry: EntryId::job("up"), instance: 1, pid: 10 },
            now,
        );

        let step = core.step(
            RuntimeEvent::ProcessExited {
                entry: EntryId::job("up"),
                instance: 1,
                pid: 10,
                outcome: ExitOutcome::Code(0),
            },
            now,
        );
        assert!(!core.job("up").expect("up").is_running());
        let launched: Vec<_> = launches(&step).into_iter().map(|(e, _)| e.name).collect();
        assert_eq!(launched, vec!["down1".to_string(), "down2".to_string()]);
    }

    #[test]
    fn failed_upstream_respects_after_on_failure() {
        let mut core = core(&[job("up", "every 1h"), job("down", "after up")], &[]);
        core.config.after_on_failure = false;
        let now = Local::now();
        core.step(RuntimeEvent::Tick, now);
        core.step(
            RuntimeEvent::Launched { entry: EntryId::job("up"), instance: 1, pid: 10 },
            now,
        );
        let step = core.step(
            RuntimeEvent::ProcessExited {
                entry: EntryId::job("up"),
                instance: 1,
                pid: 10,
                outcome: ExitOutcome::Code(3),
            },
            now,
        );
        assert!(launches(&step).is_empty());
        assert_eq!(notices(&step), vec![NoticeKind::ReturnedCode(3)]);
    }

    #[test]
    fn watch_restart_is_notified_with_pid() {
        let mut core = core(&[], &[watch("w")]);
        let now = Local::now();
        core.step(RuntimeEvent::Tick, now);
        let step = core.step(
            RuntimeEvent::Launched { entry: EntryId::watch("w"), instance: 1, pid: 77 },
            now,
        );
        assert_eq!(notices(&step), vec![NoticeKind::Restarted]);
    }

    #[test]
    fn job_and_watch_may_share_a_name() {
        let mut core = core(&[job("same", "every 1h")], &[watch("same")]);
        let now = Local::now();
        core.step(RuntimeEvent::Tick, now);
        core.step(
            RuntimeEvent::Launched { entry: EntryId::job("same"), instance: 1, pid: 1 },
            now,
        );
        core.step(
            RuntimeEvent::Launched { entry: EntryId::watch("same"), instance: 2, pid: 2 },
            now,
        );
        let step = core.step(
            RuntimeEvent::ProcessExited {
                entry: EntryId::watch("same"),
                instance: 2,
                pid: 2,
                outcome: ExitOutcome::Code(0),
            },
            now + TimeDelta::seconds(1),
        );
        assert!(core.job("same").expect("job").is_running());
        assert_eq!(launches(&step), vec![(EntryId::watch("same"), 3)]);
    }

    #[test]
    fn reload_request_asks_shell_to_load() {
        let mut core = core(&[], &[]);
        let step = core.step(RuntimeEvent::ReloadRequested, Local::now());
        assert_eq!(step.commands, vec![CoreCommand::LoadConfig]);
    }

    #[test]
    fn reload_env_reaches_new_launches() {
        let mut core = core(&[job("a", "every 1h")], &[]);
        let mut config = core.config().clone();
        config.env.insert("GREETING".into(), "hi".into());
        core.step(RuntimeEvent::ConfigReloaded(Box::new(config)), Local::now());

        let step = core.step(RuntimeEvent::Tick, Local::now());
        let env = step
            .commands
            .iter()
            .find_map(|c| match c {
                CoreCommand::Launch(req) => Some(req.env.clone()),
                _ => None,
            })
            .expect("job launched");
        assert_eq!(env.get("GREETING").map(String::as_str), Some("hi"));
    }

    #[test]
    fn shutdown_terminates_live_children() {
        let mut core = core(&[job("a", "every 1h")], &[watch("w")]);
        let now = Local::now();
        core.step(RuntimeEvent::Tick, now);
        core.step(
            RuntimeEvent::Launched { entry: EntryId::job("a"), instance: 1, pid: 11 },
            now,
        );
        core.step(
            RuntimeEvent::Launched { entry: EntryId::watch("w"), instance: 2, pid: 22 },
            now,
        );

        let step = core.step(RuntimeEvent::ShutdownRequested, now);
        assert!(!step.keep_running);
        for pid in [11, 22] {
            assert!(step.commands.contains(&CoreCommand::Kill {
                pid,
                signal: KillSignal::Terminate,
            }));
        }
    }
}
