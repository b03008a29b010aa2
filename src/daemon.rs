// src/daemon.rs

//! Daemon mode: settings check, detaching, pid file lifecycle.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{info, warn};

use crate::config::DaemonSettings;
use crate::errors::{CustodianError, Result};

/// Resolved daemon-mode paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonPaths {
    pub log: PathBuf,
    pub pid: PathBuf,
}

/// Daemon mode needs both `log` and `pid`. Returns `None` when daemon mode
/// is off.
pub fn validate(settings: &DaemonSettings) -> Result<Option<DaemonPaths>> {
    if !settings.enabled {
        return Ok(None);
    }
    let log = settings.log.as_deref().ok_or_else(|| missing("log"))?;
    let pid = settings.pid.as_deref().ok_or_else(|| missing("pid"))?;
    Ok(Some(DaemonPaths {
        log: absolute(log)?,
        pid: absolute(pid)?,
    }))
}

fn missing(key: &str) -> CustodianError {
    CustodianError::DaemonConfig(format!(
        "'{key}' directive must be specified when run as a daemon"
    ))
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()?.join(path))
}

/// Detach from the controlling terminal. Must run before any threads (and
/// so before the async runtime) exist.
pub fn detach() -> Result<()> {
    nix::unistd::daemon(true, false)
        .context("failed to detach into the background")
        .map_err(CustodianError::from)
}

pub fn write_pid_file(path: &Path) -> Result<()> {
    fs::write(path, std::process::id().to_string())
        .with_context(|| format!("failed to write pid file {}", path.display()))?;
    info!(pid_file = %path.display(), "pid file written");
    Ok(())
}

pub fn remove_pid_file(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!(pid_file = %path.display(), error = %e, "failed to remove pid file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daemon_requires_log_and_pid() {
        let settings = DaemonSettings {
            enabled: true,
            log: Some(PathBuf::from("/tmp/c.log")),
            pid: None,
        };
        let err = validate(&settings).expect_err("pid missing");
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn disabled_daemon_needs_nothing() -> Result<()> {
        assert_eq!(validate(&DaemonSettings::default())?, None);
        Ok(())
    }

    #[test]
    fn pid_file_lifecycle() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("custodian.pid");
        write_pid_file(&path)?;
        assert_eq!(fs::read_to_string(&path)?, std::process::id().to_string());
        remove_pid_file(&path);
        assert!(!path.exists());
        Ok(())
    }
}
