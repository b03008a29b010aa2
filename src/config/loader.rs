// src/config/loader.rs

use std::fs;
use std::path::Path;

use crate::config::model::{GlobalConfig, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw model.
///
/// This only performs JSON deserialization; semantic checks (durations,
/// memory sizes, intervals) happen in [`load_and_validate`].
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    parse_str(&contents)
}

pub fn parse_str(contents: &str) -> Result<RawConfigFile> {
    let config: RawConfigFile = serde_json::from_str(contents)?;
    Ok(config)
}

/// Load a configuration file from path and validate it.
///
/// Used both for the first load (errors are fatal) and for reloads (errors
/// are logged and the previous config stays in effect).
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<GlobalConfig> {
    let raw = load_from_path(path)?;
    GlobalConfig::try_from(raw)
}

/// Async counterpart of [`load_and_validate`] for reloads, so reading the
/// file never stalls the dispatch task.
pub async fn load_and_validate_async(path: impl AsRef<Path>) -> Result<GlobalConfig> {
    let contents = tokio::fs::read_to_string(path.as_ref()).await?;
    GlobalConfig::try_from(parse_str(&contents)?)
}
