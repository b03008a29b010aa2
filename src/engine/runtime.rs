// src/engine/runtime.rs

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::config::load_and_validate_async;
use crate::errors::Result;
use crate::exec::ExecutorBackend;
use crate::notify::{hostname, Notice, Notifier};

use super::core::CoreRuntime;
use super::{CoreCommand, RuntimeEvent, TimerId, TimerPurpose};

/// Drives the controllers in response to `RuntimeEvent`s and dispatch
/// ticks, and delegates process work to an `ExecutorBackend`.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// supervision semantics. This struct handles async IO: the dispatch
/// interval, the event channel, timers, config reloads and notification
/// delivery.
pub struct Runtime<E: ExecutorBackend, N: Notifier + 'static> {
    core: CoreRuntime,
    config_path: PathBuf,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    /// Used by timer tasks to report back.
    event_tx: mpsc::Sender<RuntimeEvent>,
    executor: E,
    notifier: Arc<N>,
    hostname: String,
    timers: HashMap<TimerId, JoinHandle<()>>,
}

impl<E: ExecutorBackend, N: Notifier + 'static> fmt::Debug for Runtime<E, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("config_path", &self.config_path)
            .field("timers", &self.timers.len())
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend, N: Notifier + 'static> Runtime<E, N> {
    pub fn new(
        core: CoreRuntime,
        config_path: PathBuf,
        event_tx: mpsc::Sender<RuntimeEvent>,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        executor: E,
        notifier: Arc<N>,
    ) -> Self {
        Self {
            core,
            config_path,
            event_rx,
            event_tx,
            executor,
            notifier,
            hostname: hostname(),
            timers: HashMap::new(),
        }
    }

    /// Main event loop.
    ///
    /// - Turns every dispatch tick into `RuntimeEvent::Tick`.
    /// - Consumes `RuntimeEvent`s from `event_rx`.
    /// - Feeds them into the core runtime and executes the commands it
    ///   returns. Launch results go straight back into the core before the
    ///   next external event is taken.
    pub async fn run(mut self) -> Result<()> {
        info!(
            config = %self.config_path.display(),
            check_interval = ?self.core.check_interval(),
            "custodian runtime started"
        );

        let mut period = self.core.check_interval();
        let mut dispatch = dispatch_interval(Instant::now(), period);

        loop {
            let event = tokio::select! {
                _ = dispatch.tick() => RuntimeEvent::Tick,
                received = self.event_rx.recv() => match received {
                    Some(e) => e,
                    None => {
                        info!("runtime event channel closed; exiting");
                        break;
                    }
                },
            };

            if !self.process(event).await {
                info!("core requested exit; stopping runtime");
                break;
            }

            if self.core.check_interval() != period {
                period = self.core.check_interval();
                info!(check_interval = ?period, "dispatch interval changed");
                dispatch = dispatch_interval(Instant::now() + period, period);
            }
        }

        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
        info!("runtime exiting");
        Ok(())
    }

    /// Step one external event plus all the feedback it causes. Returns
    /// whether the loop should keep running.
    async fn process(&mut self, event: RuntimeEvent) -> bool {
        let mut pending = VecDeque::from([event]);
        while let Some(event) = pending.pop_front() {
            if let RuntimeEvent::TimerFired { timer, .. } = &event {
                self.timers.remove(timer);
            }
            if !matches!(event, RuntimeEvent::Tick) {
                debug!(?event, "runtime received event");
            }

            let step = self.core.step(event, Local::now());
            for command in step.commands {
                self.execute_command(command, &mut pending).await;
            }
            if !step.keep_running {
                return false;
            }
        }
        true
    }

    /// Execute a single command from the core.
    async fn execute_command(&mut self, command: CoreCommand, pending: &mut VecDeque<RuntimeEvent>) {
        match command {
            CoreCommand::Launch(request) => {
                let entry = request.entry.clone();
                let instance = request.instance;
                let event = match self.executor.launch(request).await {
                    Ok(pid) => RuntimeEvent::Launched {
                        entry,
                        instance,
                        pid,
                    },
                    Err(err) => RuntimeEvent::LaunchFailed {
                        entry,
                        instance,
                        error: err.to_string(),
                    },
                };
                pending.push_back(event);
            }
            CoreCommand::Kill { pid, signal } => self.executor.kill(pid, signal),
            CoreCommand::ArmTimer {
                timer,
                delay,
                purpose,
            } => self.arm_timer(timer, delay, purpose),
            CoreCommand::CancelTimer(timer) => {
                if let Some(handle) = self.timers.remove(&timer) {
                    handle.abort();
                }
            }
            CoreCommand::SampleMemory {
                name,
                instance,
                pid,
            } => self.executor.sample_memory(name, instance, pid),
            CoreCommand::ReleaseOutput(entry) => self.executor.release_output(&entry),
            CoreCommand::Notify(notice) => self.deliver(notice),
            CoreCommand::LoadConfig => self.spawn_reload(),
        }
    }

    /// Read and validate the config file off the dispatch task; a valid
    /// result comes back through the event channel as `ConfigReloaded`.
    fn spawn_reload(&self) {
        let path = self.config_path.clone();
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            match load_and_validate_async(&path).await {
                Ok(config) => {
                    let _ = tx.send(RuntimeEvent::ConfigReloaded(Box::new(config))).await;
                }
                Err(err) => {
                    error!(
                        config = %path.display(),
                        error = %err,
                        "reload failed; keeping previous configuration"
                    );
                }
            }
        });
    }

    fn arm_timer(&mut self, timer: TimerId, delay: Duration, purpose: TimerPurpose) {
        let tx = self.event_tx.clone();
        let handle = tokio::spawn(async move {
            time::sleep(delay).await;
            let _ = tx.send(RuntimeEvent::TimerFired { timer, purpose }).await;
        });
        if let Some(previous) = self.timers.insert(timer, handle) {
            previous.abort();
        }
    }

    /// Hand a notice to the notifier on its own task so a slow mail channel
    /// never blocks dispatch.
    fn deliver(&self, notice: Notice) {
        let Some(email) = notice.render(&self.core.config().routing, &self.hostname) else {
            info!(subject = %notice.subject(), "no notification address configured");
            return;
        };
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            let subject = email.subject.clone();
            if let Err(err) = notifier.send(email).await {
                error!(%subject, error = %err, "failed to send notification");
            }
        });
    }
}

fn dispatch_interval(start: Instant, period: Duration) -> Interval {
    let mut interval = time::interval_at(start, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}
