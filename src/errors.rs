// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CustodianError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Daemon configuration error: {0}")]
    DaemonConfig(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Launch error: {0}")]
    Launch(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CustodianError {
    /// Process exit code used by `main` when this error aborts startup.
    ///
    /// Daemon-mode misconfiguration gets its own code so wrappers can tell it
    /// apart from an unreadable config file.
    pub fn exit_code(&self) -> i32 {
        match self {
            CustodianError::DaemonConfig(_) => 3,
            _ => 1,
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, CustodianError>;
