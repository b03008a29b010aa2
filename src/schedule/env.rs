// src/schedule/env.rs

//! Environment chain for a controller.
//!
//! Lookup order: the entry's own `env` overlay, then the config's global
//! `env`, then the ambient process environment captured at startup. The chain
//! is rebuilt whenever the entry's spec changes on reload.

use std::collections::BTreeMap;
use std::sync::Arc;

pub type EnvMap = BTreeMap<String, String>;

/// Marker exported to every child so commands can tell they run supervised.
pub const SUPERVISED_MARKER: (&str, &str) = ("IN_CUSTODIAN", "1");

/// Process-wide base layer: the supervisor's environment plus the marker.
pub fn ambient_environment() -> EnvMap {
    let mut env: EnvMap = std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect();
    env.insert(
        SUPERVISED_MARKER.0.to_string(),
        SUPERVISED_MARKER.1.to_string(),
    );
    env
}

#[derive(Debug, Clone, Default)]
pub struct EnvChain {
    overlay: EnvMap,
    base: Arc<EnvMap>,
}

impl EnvChain {
    /// `base` is the already-merged global + ambient layer shared by every
    /// controller.
    pub fn new(overlay: EnvMap, base: Arc<EnvMap>) -> Self {
        Self { overlay, base }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.overlay
            .get(key)
            .or_else(|| self.base.get(key))
            .map(String::as_str)
    }

    /// Flattened view handed to the launcher (overlay keys win).
    pub fn resolved(&self) -> EnvMap {
        let mut env = (*self.base).clone();
        env.extend(self.overlay.iter().map(|(k, v)| (k.clone(), v.clone())));
        env
    }
}

/// Merge the config's global `env` over the ambient environment.
pub fn base_layer(ambient: &EnvMap, global: &EnvMap) -> Arc<EnvMap> {
    let mut env = ambient.clone();
    env.extend(global.iter().map(|(k, v)| (k.clone(), v.clone())));
    Arc::new(env)
}
