// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of spawning processes
//! itself. This makes it easy to swap in a fake executor in tests while
//! keeping the production launcher here.
//!
//! - `RealExecutorBackend` is the implementation used by `custodian`. It
//!   spawns the child with `tokio::process::Command`, binds its output sink,
//!   and hands the child to a waiter task that reports `ProcessExited`.
//! - Tests can provide their own `ExecutorBackend` that records launches and
//!   kills and emits exits on demand.

use std::future::Future;
use std::os::unix::process::ExitStatusExt;
use std::pin::Pin;
use std::process::Stdio;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::engine::{Instance, LaunchRequest, RuntimeEvent};
use crate::errors::{CustodianError, Result};
use crate::types::{EntryId, ExitOutcome, KillSignal};

use super::memory::resident_bytes;
use super::output::OutputSinks;

/// Trait abstracting how processes are started, stopped and inspected.
///
/// Production code uses [`RealExecutorBackend`]; tests can provide their own
/// implementation that doesn't spawn real processes.
pub trait ExecutorBackend: Send {
    /// Start one child and return its pid.
    ///
    /// The implementation must eventually emit exactly one
    /// `RuntimeEvent::ProcessExited` for every successful launch.
    fn launch(
        &mut self,
        request: LaunchRequest,
    ) -> Pin<Box<dyn Future<Output = Result<u32>> + Send + '_>>;

    /// Deliver `signal` to `pid`. A process that is already gone is not an
    /// error.
    fn kill(&mut self, pid: u32, signal: KillSignal);

    /// Query resident memory of a watched process; the result arrives later
    /// as `RuntimeEvent::MemorySampled`.
    fn sample_memory(&mut self, name: String, instance: Instance, pid: u32);

    /// Close the output sink held for `entry`, if any.
    fn release_output(&mut self, entry: &EntryId);
}

/// Real executor backend used in production.
pub struct RealExecutorBackend {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    sinks: OutputSinks,
}

impl RealExecutorBackend {
    /// Create a new real executor backend, wiring it to the given runtime
    /// event sender.
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self {
            runtime_tx,
            sinks: OutputSinks::new(),
        }
    }

    fn spawn(&mut self, request: &LaunchRequest) -> Result<tokio::process::Child> {
        let Some((program, args)) = request.argv.split_first() else {
            return Err(CustodianError::Launch("empty command line".to_string()));
        };

        let (stdout, stderr) = self
            .sinks
            .stdio_for(&request.entry, request.output.as_deref());

        let mut cmd = Command::new(program);
        cmd.args(args)
            .env_clear()
            .envs(&request.env)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr);
        if let Some(cwd) = &request.cwd {
            cmd.current_dir(cwd);
        }

        cmd.spawn()
            .map_err(|e| CustodianError::Launch(format!("{program}: {e}")))
    }
}

impl ExecutorBackend for RealExecutorBackend {
    fn launch(
        &mut self,
        request: LaunchRequest,
    ) -> Pin<Box<dyn Future<Output = Result<u32>> + Send + '_>> {
        Box::pin(async move {
            info!(entry = %request.entry, argv = ?request.argv, "exec");
            let mut child = self.spawn(&request)?;
            let Some(pid) = child.id() else {
                return Err(CustodianError::Launch(format!(
                    "{}: exited before its pid was read",
                    request.entry
                )));
            };

            let runtime_tx = self.runtime_tx.clone();
            let LaunchRequest {
                entry, instance, ..
            } = request;
            tokio::spawn(async move {
                let outcome = match child.wait().await {
                    Ok(status) => match (status.code(), status.signal()) {
                        (Some(code), _) => ExitOutcome::Code(code),
                        (None, Some(sig)) => ExitOutcome::Signaled(sig),
                        (None, None) => ExitOutcome::Code(-1),
                    },
                    Err(err) => {
                        error!(%entry, pid, error = %err, "waiting for child failed");
                        ExitOutcome::Code(-1)
                    }
                };
                debug!(%entry, pid, %outcome, "child exited");
                let event = RuntimeEvent::ProcessExited {
                    entry,
                    instance,
                    pid,
                    outcome,
                };
                if runtime_tx.send(event).await.is_err() {
                    debug!(pid, "runtime gone; dropping exit event");
                }
            });

            Ok(pid)
        })
    }

    fn kill(&mut self, pid: u32, kill_signal: KillSignal) {
        let sig = match kill_signal {
            KillSignal::Terminate => Signal::SIGTERM,
            KillSignal::Kill => Signal::SIGKILL,
        };
        let Ok(raw) = i32::try_from(pid) else {
            warn!(pid, "pid out of range; not signalling");
            return;
        };
        match signal::kill(Pid::from_raw(raw), sig) {
            Ok(()) => debug!(pid, signal = ?sig, "signal sent"),
            Err(nix::errno::Errno::ESRCH) => debug!(pid, "process already gone"),
            Err(err) => warn!(pid, signal = ?sig, error = %err, "failed to signal process"),
        }
    }

    fn sample_memory(&mut self, name: String, instance: Instance, pid: u32) {
        let runtime_tx = self.runtime_tx.clone();
        tokio::spawn(async move {
            match resident_bytes(pid).await {
                Ok(rss_bytes) => {
                    let event = RuntimeEvent::MemorySampled {
                        name,
                        instance,
                        pid,
                        rss_bytes,
                    };
                    let _ = runtime_tx.send(event).await;
                }
                Err(err) => debug!(watch = %name, pid, error = %err, "memory sample failed"),
            }
        });
    }

    fn release_output(&mut self, entry: &EntryId) {
        self.sinks.release(entry);
    }
}
