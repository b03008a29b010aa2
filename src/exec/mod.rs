// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running the configured commands,
//! using `tokio::process::Command`, and reporting back to the supervision
//! runtime via `RuntimeEvent`s.
//!
//! - [`argv`] splits a command line into argv with `$NAME` expansion.
//! - [`output`] owns the per-entry append-mode output files.
//! - [`memory`] reads resident memory of a running child.
//! - [`backend`] provides the `ExecutorBackend` trait and a concrete
//!   `RealExecutorBackend` that the runtime uses in production, and which
//!   tests can replace with a fake implementation.

pub mod argv;
pub mod backend;
pub mod memory;
pub mod output;

pub use backend::{ExecutorBackend, RealExecutorBackend};
