use std::{collections::HashMap, sync::RwLock};

use serde::{Deserialize, Serialize};

/// Last known presence of a fully resource-qualified identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceStatus {
    pub online: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_id: Option<String>,
}

/// Read-only view of the host's presence cache.
pub trait PresenceCache: Send + Sync {
    fn status(&self, full_id: &str) -> Option<PresenceStatus>;
}

/// Presence cache kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryPresenceCache {
    entries: RwLock<HashMap<String, PresenceStatus>>,
}

impl MemoryPresenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, full_id: impl Into<String>, status: PresenceStatus) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(full_id.into(), status);
    }

    pub fn remove(&self, full_id: &str) -> Option<PresenceStatus> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(full_id)
    }
}

impl PresenceCache for MemoryPresenceCache {
    fn status(&self, full_id: &str) -> Option<PresenceStatus> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(full_id).cloned()
    }
}
