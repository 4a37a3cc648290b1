use crate::error::Result;
use crate::io;
use crate::sequencing::ControlMode;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const CONFIG_FILE: &str = "seqnav.yaml";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Applied to every activity whose shape leaves a control-mode flag unset.
    #[serde(default)]
    pub control_mode_defaults: ControlMode,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_true")]
    pub auto_complete_on_exit: bool,
    #[serde(default)]
    pub retry_resets_attempt_count: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_organization: Option<String>,
}

fn default_max_depth() -> usize {
    64
}

fn default_history_limit() -> usize {
    200
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            control_mode_defaults: ControlMode::default(),
            max_depth: default_max_depth(),
            history_limit: default_history_limit(),
            auto_complete_on_exit: default_true(),
            retry_resets_attempt_count: false,
            default_organization: None,
        }
    }
}

impl EngineConfig {
    pub fn from_yaml(data: &str) -> Result<Self> {
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(data)?)
    }

    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        Self::from_yaml(&data)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        io::atomic_write(path, data.as_bytes())
    }

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.max_depth == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "max_depth is 0; no item below the organization would be built".to_string(),
            });
        } else if self.max_depth > 1_000 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!("max_depth={} (>1000 is unusual)", self.max_depth),
            });
        }

        if self.history_limit == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "history_limit is 0; navigation history will not be kept".to_string(),
            });
        }

        let cm = &self.control_mode_defaults;
        if !cm.flow && cm.forward_only {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "forward_only has no effect while flow is disabled by default".to_string(),
            });
        }
        if !cm.flow && !cm.choice {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "both flow and choice are disabled by default; only start, jump and \
                          exit requests could ever succeed"
                    .to_string(),
            });
        }

        if let Some(org) = &self.default_organization {
            if org.trim().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: "default_organization is empty; the shape's default is used".to_string(),
                });
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
