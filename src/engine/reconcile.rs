// src/engine/reconcile.rs

//! Startup build and reload diff for the controller registry.
//!
//! On reload every entry falls in one of three buckets:
//! - removed: torn down (running process killed, timers cancelled, sink
//!   closed) and dropped;
//! - added: a fresh controller with default state;
//! - kept: the new `JobSpec`/`WatchSpec` replaces the old one; runtime
//!   state (running process, `last_run`, `last_restart`) carries over.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use crate::config::GlobalConfig;
use crate::schedule::env::EnvMap;
use crate::schedule::{JobController, WatchController};

use super::CoreCommand;

/// All live controllers, keyed by entry name within their section.
#[derive(Debug, Default)]
pub struct Controllers {
    pub jobs: BTreeMap<String, JobController>,
    pub watches: BTreeMap<String, WatchController>,
}

impl Controllers {
    /// Build one controller per configured entry.
    pub fn build(config: &GlobalConfig, base_env: &Arc<EnvMap>) -> Self {
        let jobs = config
            .schedule
            .iter()
            .map(|(name, spec)| {
                (
                    name.clone(),
                    JobController::new(spec.clone(), Arc::clone(base_env)),
                )
            })
            .collect();
        let watches = config
            .watch
            .iter()
            .map(|(name, spec)| {
                (
                    name.clone(),
                    WatchController::new(spec.clone(), Arc::clone(base_env)),
                )
            })
            .collect();
        Self { jobs, watches }
    }

    /// Diff the registry against `config`. Returns the teardown commands for
    /// removed entries.
    pub fn reconcile(&mut self, config: &GlobalConfig, base_env: &Arc<EnvMap>) -> Vec<CoreCommand> {
        let mut commands = Vec::new();

        let removed: Vec<String> = self
            .jobs
            .keys()
            .filter(|name| !config.schedule.contains_key(*name))
            .cloned()
            .collect();
        for name in removed {
            if let Some(mut job) = self.jobs.remove(&name) {
                info!(job = %name, "removed from config");
                commands.extend(job.teardown());
            }
        }

        let removed: Vec<String> = self
            .watches
            .keys()
            .filter(|name| !config.watch.contains_key(*name))
            .cloned()
            .collect();
        for name in removed {
            if let Some(mut watch) = self.watches.remove(&name) {
                info!(watch = %name, "removed from config");
                commands.extend(watch.teardown());
            }
        }

        for (name, spec) in &config.schedule {
            match self.jobs.get_mut(name) {
                Some(job) => job.update_spec(spec.clone(), Arc::clone(base_env)),
                None => {
                    info!(job = %name, "added to config");
                    self.jobs.insert(
                        name.clone(),
                        JobController::new(spec.clone(), Arc::clone(base_env)),
                    );
                }
            }
        }

        for (name, spec) in &config.watch {
            match self.watches.get_mut(name) {
                Some(watch) => watch.update_spec(spec.clone(), Arc::clone(base_env)),
                None => {
                    info!(watch = %name, "added to config");
                    self.watches.insert(
                        name.clone(),
                        WatchController::new(spec.clone(), Arc::clone(base_env)),
                    );
                }
            }
        }

        commands
    }

    /// Tear down every controller (shutdown).
    pub fn teardown_all(&mut self) -> Vec<CoreCommand> {
        let mut commands = Vec::new();
        for job in self.jobs.values_mut() {
            commands.extend(job.teardown());
        }
        for watch in self.watches.values_mut() {
            commands.extend(watch.teardown());
        }
        commands
    }
}
