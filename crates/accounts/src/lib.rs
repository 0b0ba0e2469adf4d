//! Account contract shared by every imbridge backend.
//!
//! Defines the uniform [`BridgeAccount`] trait, protocol descriptors, the
//! correlation registry used to pair fire-and-forget actions with their
//! asynchronous confirmations, and the per-backend event router.

pub mod account;
pub mod correlation;
pub mod error;
pub mod events;
pub mod message;
pub mod presence;
pub mod protocol;
pub mod registry;

pub use {
    account::{
        AccountRef, BridgeAccount, Buddy, JoinOption, JoinProperties, RemoteId, UserInfo,
        join_property,
    },
    correlation::{CorrelationRegistry, Pending},
    error::{Error, Result},
    events::{ChatJoined, Conversation, EventRouter, SubscriptionId},
    message::{Attachment, BasicMessage, FormattedBody},
    presence::{MemoryPresenceCache, PresenceCache, PresenceStatus},
    protocol::{Capability, ProtocolDescriptor},
    registry::{AccountFactory, AccountRegistry},
};
