use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Suffix appended to a room handle when the requested nick is taken.
pub const CONFLICT_SUFFIX: &str = "[m]";

/// Configuration for a single native XMPP account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct XmppAccountConfig {
    /// Resource the bridge appends to the account JID in `from` addresses.
    pub resource: String,

    /// Default wait for a room join confirmation, in milliseconds.
    pub join_timeout_ms: u64,

    /// Wait for a vCard user-info reply, in milliseconds.
    pub user_info_timeout_ms: u64,

    /// Wait for a vCard avatar reply, in milliseconds.
    pub avatar_timeout_ms: u64,

    /// Prefix for generated message ids.
    pub message_id_prefix: String,

    /// How long sent message ids are remembered for echo suppression, in seconds.
    pub sent_message_ttl_secs: u64,

    /// Upper bound on remembered sent message ids.
    pub sent_message_max_entries: usize,
}

impl Default for XmppAccountConfig {
    fn default() -> Self {
        Self {
            resource: "bridge".into(),
            join_timeout_ms: 5_000,
            user_info_timeout_ms: 10_000,
            avatar_timeout_ms: 5_000,
            message_id_prefix: "pbridge".into(),
            sent_message_ttl_secs: 300,
            sent_message_max_entries: 1_000,
        }
    }
}

impl XmppAccountConfig {
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn user_info_timeout(&self) -> Duration {
        Duration::from_millis(self.user_info_timeout_ms)
    }

    pub fn avatar_timeout(&self) -> Duration {
        Duration::from_millis(self.avatar_timeout_ms)
    }

    pub fn sent_message_ttl(&self) -> Duration {
        Duration::from_secs(self.sent_message_ttl_secs)
    }
}
