pub mod config;
pub mod outline;
pub mod run;
pub mod validate;

use anyhow::Context;
use seqnav_core::EngineConfig;
use serde_json::Value;
use std::path::Path;

/// Load the engine config; no path means defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(p) => EngineConfig::load(p).with_context(|| format!("failed to load config {}", p.display())),
        None => Ok(EngineConfig::default()),
    }
}

/// Read a tree-shape file. Text that is not JSON is passed through as a
/// string so the tree builder reports it with its own error code.
pub fn load_shape(path: &Path) -> anyhow::Result<Value> {
    let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}
