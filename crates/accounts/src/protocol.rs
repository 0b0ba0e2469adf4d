use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A capability a backend family may or may not offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Accounts can be enabled and disabled.
    Enablement,
    /// New accounts can be registered through the backend.
    AccountCreation,
    DirectMessages,
    RoomMessages,
    /// Room joins are confirmed by an asynchronous event.
    RoomJoin,
    UserInfo,
    Avatars,
    BuddyList,
}

/// Static metadata describing one backend family.
///
/// Immutable once built; accounts of the same family share one instance
/// behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolDescriptor {
    id: String,
    display_name: String,
    capabilities: BTreeSet<Capability>,
}

impl ProtocolDescriptor {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        capabilities: impl IntoIterator<Item = Capability>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            capabilities: capabilities.into_iter().collect(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn capabilities(&self) -> impl Iterator<Item = Capability> + '_ {
        self.capabilities.iter().copied()
    }

    pub fn is_supported(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Fail fast with [`Error::NotSupported`] when `capability` is absent.
    pub fn require(&self, capability: Capability, operation: &str) -> Result<()> {
        if self.is_supported(capability) {
            Ok(())
        } else {
            Err(Error::not_supported(&self.id, operation))
        }
    }
}
