// src/exec/output.rs

//! Output Sink: where a child's combined stdout/stderr goes.
//!
//! A configured path is opened once in append mode and shared by both
//! streams; with no path, output is discarded. [`OutputSinks`] caches one sink
//! per entry. Controllers release it when a run ends, so the file can be
//! rotated between runs.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result};
use tracing::{debug, error};

use crate::types::EntryId;

#[derive(Debug)]
pub struct OutputSink {
    path: PathBuf,
    file: File,
}

impl OutputSink {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .mode(0o644)
            .open(path)
            .with_context(|| format!("opening output file {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fresh (stdout, stderr) handles onto the same append-mode file.
    pub fn stdio(&self) -> Result<(Stdio, Stdio)> {
        let out = self.file.try_clone().context("duplicating output descriptor")?;
        let err = self.file.try_clone().context("duplicating output descriptor")?;
        Ok((Stdio::from(out), Stdio::from(err)))
    }
}

/// Per-entry sink cache owned by the launcher.
#[derive(Debug, Default)]
pub struct OutputSinks {
    open: HashMap<EntryId, OutputSink>,
}

impl OutputSinks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stdio pair for launching `entry`.
    ///
    /// Reuses the cached sink when `path` matches it, reopens when the path
    /// changed, and discards output when there is no path or the file cannot
    /// be opened.
    pub fn stdio_for(&mut self, entry: &EntryId, path: Option<&Path>) -> (Stdio, Stdio) {
        let Some(path) = path else {
            self.release(entry);
            return (Stdio::null(), Stdio::null());
        };

        let reuse = self.open.get(entry).is_some_and(|s| s.path() == path);
        if !reuse {
            match OutputSink::open(path) {
                Ok(sink) => {
                    debug!(entry = %entry, path = %path.display(), "opened output sink");
                    self.open.insert(entry.clone(), sink);
                }
                Err(e) => {
                    error!(entry = %entry, error = %e, "error opening output file; discarding output");
                    self.open.remove(entry);
                    return (Stdio::null(), Stdio::null());
                }
            }
        }

        match self.open.get(entry).map(OutputSink::stdio) {
            Some(Ok(pair)) => pair,
            Some(Err(e)) => {
                error!(entry = %entry, error = %e, "output sink unusable; discarding output");
                (Stdio::null(), Stdio::null())
            }
            None => (Stdio::null(), Stdio::null()),
        }
    }

    /// Close the descriptor held for `entry`, if any.
    pub fn release(&mut self, entry: &EntryId) {
        if let Some(sink) = self.open.remove(entry) {
            debug!(entry = %entry, path = %sink.path().display(), "closed output sink");
        }
    }

    pub fn is_open(&self, entry: &EntryId) -> bool {
        self.open.contains_key(entry)
    }
}
