// src/exec/memory.rs

//! Resident memory sampling for watched processes.
//!
//! Reads `VmRSS` from `/proc/<pid>/status`. Sampling runs on a background
//! task and its result is delivered to the runtime as an event, so the
//! dispatch loop never waits on procfs.

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};

/// Resident set size of `pid` in bytes.
pub async fn resident_bytes(pid: u32) -> Result<u64> {
    let path = PathBuf::from(format!("/proc/{pid}/status"));
    let contents = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    parse_vm_rss(&contents).ok_or_else(|| anyhow!("no VmRSS line in {}", path.display()))
}

/// Extract `VmRSS:   1234 kB` from a procfs status file, in bytes.
pub fn parse_vm_rss(status: &str) -> Option<u64> {
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let mut parts = line["VmRSS:".len()..].split_whitespace();
    let value: u64 = parts.next()?.parse().ok()?;
    let multiplier = match parts.next().map(str::to_ascii_lowercase).as_deref() {
        Some("kb") | None => 1024,
        Some("mb") => 1024 * 1024,
        Some("gb") => 1024 * 1024 * 1024,
        Some("b") => 1,
        Some(_) => return None,
    };
    value.checked_mul(multiplier)
}
