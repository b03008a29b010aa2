// src/config/mod.rs

//! Configuration loading and validation for custodian.
//!
//! Responsibilities:
//! - Define the JSON-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate values and build the typed specs (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_and_validate_async, load_from_path, parse_str};
pub use model::{
    DaemonSettings, DynamicArg, GlobalConfig, JobSpec, NotificationRouting, RawConfigFile,
    RawJobConfig, RawWatchConfig, WatchSpec,
};
