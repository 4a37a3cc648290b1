use crate::error::Result;
use crate::session::HistoryEntry;
use crate::tracking::{GlobalObjectiveMap, TrackingRecord};
use crate::types::SessionPhase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use uuid::Uuid;

pub const SNAPSHOT_VERSION: u32 = 1;

/// Everything needed to pick a session up again on the same tree.
/// Activities are keyed by identifier, so a snapshot survives rebuilding
/// the tree from its shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub version: u32,
    pub session_id: Uuid,
    pub phase: SessionPhase,
    /// Identifier of the organization (root activity).
    pub organization: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspended: Option<String>,
    #[serde(default)]
    pub activities: BTreeMap<String, TrackingRecord>,
    #[serde(default)]
    pub global_objectives: GlobalObjectiveMap,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    pub saved_at: DateTime<Utc>,
}

impl SessionSnapshot {
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn from_yaml(data: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(data)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_yaml(&data)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = self.to_yaml()?;
        crate::io::atomic_write(path, data.as_bytes())?;
        tracing::debug!(path = %path.display(), "snapshot saved");
        Ok(())
    }
}
