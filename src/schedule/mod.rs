// src/schedule/mod.rs

//! Per-entry controllers and the pieces they are built from.
//!
//! - `trigger`: `every N[smhd]` / `after <job>` parsing and due checks.
//! - `env`: layered environment lookup.
//! - `job`: one controller per `schedule.<name>`.
//! - `watch`: one controller per `watch.<name>`.

pub mod env;
pub mod job;
pub mod trigger;
pub mod watch;

pub use job::{Completion, Fire, JobController};
pub use trigger::Trigger;
pub use watch::WatchController;
