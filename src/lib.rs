// src/lib.rs

pub mod cli;
pub mod config;
pub mod daemon;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod notify;
pub mod schedule;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::config::GlobalConfig;
use crate::engine::{CoreRuntime, Runtime, RuntimeEvent};
use crate::errors::Result;
use crate::exec::RealExecutorBackend;
use crate::notify::SendmailNotifier;
use crate::schedule::env::ambient_environment;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - the pure core built from the already-loaded config
/// - the process executor
/// - the `sendmail` notifier
/// - SIGHUP (reload) and SIGTERM / Ctrl-C (shutdown) handling
pub async fn run(config_path: PathBuf, config: GlobalConfig) -> Result<()> {
    info!(
        jobs = config.schedule.len(),
        watches = config.watch.len(),
        "starting custodian"
    );

    // Runtime event channel.
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);

    // Process executor backend (real implementation in production).
    let executor = RealExecutorBackend::new(rt_tx.clone());
    let notifier = Arc::new(SendmailNotifier::default());

    spawn_signal_handlers(rt_tx.clone())?;

    // Construct the pure core runtime (single source of truth for semantics).
    let core = CoreRuntime::new(config, ambient_environment());

    // Construct the async IO shell around the core.
    let runtime = Runtime::new(core, config_path, rt_tx, rt_rx, executor, notifier);
    runtime.run().await
}

/// SIGHUP → reload, SIGTERM / Ctrl-C → graceful shutdown.
fn spawn_signal_handlers(rt_tx: mpsc::Sender<RuntimeEvent>) -> Result<()> {
    let mut hangup = signal(SignalKind::hangup()).context("installing SIGHUP handler")?;
    let mut terminate = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;

    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            while hangup.recv().await.is_some() {
                debug!("SIGHUP received");
                if tx.send(RuntimeEvent::ReloadRequested).await.is_err() {
                    break;
                }
            }
        });
    }

    tokio::spawn(async move {
        tokio::select! {
            _ = terminate.recv() => info!("SIGTERM received"),
            res = tokio::signal::ctrl_c() => match res {
                Ok(()) => info!("interrupt received"),
                Err(e) => {
                    error!(error = %e, "failed to listen for Ctrl+C");
                    return;
                }
            },
        }
        let _ = rt_tx.send(RuntimeEvent::ShutdownRequested).await;
    });

    Ok(())
}

/// Simple dry-run output: print the validated jobs and watches.
pub fn print_dry_run(cfg: &GlobalConfig) {
    println!("custodian dry-run");
    println!("  check_interval = {:?}", cfg.check_interval);
    if let Some(rate_limit) = cfg.rate_limit {
        println!("  rate_limit = {rate_limit:?}");
    }
    println!("  after_on_failure = {}", cfg.after_on_failure);
    if let Some(to) = &cfg.routing.to {
        println!("  notify = {to}");
    }
    println!();

    println!("schedule ({}):", cfg.schedule.len());
    for (name, job) in &cfg.schedule {
        println!("  - {name}");
        println!("      when: {}", job.trigger);
        match &job.cmd {
            Some(cmd) => println!("      cmd: {cmd}"),
            None => println!("      cmd: (missing)"),
        }
        if let Some(maxtime) = job.maxtime {
            println!("      maxtime: {maxtime:?}");
        }
        if let Some(output) = &job.output {
            println!("      output: {}", output.display());
        }
    }

    println!("watch ({}):", cfg.watch.len());
    for (name, watch) in &cfg.watch {
        println!("  - {name}");
        match &watch.cmd {
            Some(cmd) => println!("      cmd: {cmd}"),
            None => println!("      cmd: (missing)"),
        }
        if let Some(limit) = watch.mem_limit {
            println!("      mem_limit: {limit} bytes");
        }
        if watch.notify {
            println!("      notify: true");
        }
    }

    debug!("dry-run complete (nothing started)");
}
