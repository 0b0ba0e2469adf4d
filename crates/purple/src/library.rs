//! Boundary to the legacy multi-protocol IM library.
//!
//! Every call is synchronous and returns once the library has accepted it.
//! Outcomes that take a round trip to the remote network (room joins,
//! user info, buddy icons) arrive later as [`crate::PurpleEvent`]s.

use imbridge_accounts::{Buddy, JoinOption, JoinProperties};

use crate::error::Result;

/// Opaque library-side account reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccountHandle(pub u64);

pub trait PurpleLibrary: Send + Sync {
    /// Look up an existing account by username and protocol id.
    fn find_account(&self, username: &str, protocol_id: &str) -> Option<AccountHandle>;

    fn new_account(
        &self,
        username: &str,
        protocol_id: &str,
        password: Option<&str>,
    ) -> Result<AccountHandle>;

    fn get_enabled(&self, account: AccountHandle) -> bool;

    fn set_enabled(&self, account: AccountHandle, enabled: bool) -> Result<()>;

    fn is_connected(&self, account: AccountHandle) -> bool;

    fn send_im(&self, account: AccountHandle, recipient: &str, body: &str) -> Result<()>;

    fn send_chat(&self, account: AccountHandle, room: &str, body: &str) -> Result<()>;

    fn find_buddy(&self, account: AccountHandle, name: &str) -> Option<Buddy>;

    /// Fields the protocol plugin needs to join a room.
    fn chat_params(&self, account: AccountHandle) -> Vec<JoinOption>;

    fn join_chat(&self, account: AccountHandle, properties: &JoinProperties) -> Result<()>;

    fn leave_chat(&self, account: AccountHandle, properties: &JoinProperties) -> Result<()>;

    /// Decline a room invitation.
    fn reject_chat(&self, account: AccountHandle, properties: &JoinProperties) -> Result<()>;

    fn get_user_info(&self, account: AccountHandle, who: &str) -> Result<()>;

    fn request_buddy_icon(&self, account: AccountHandle, who: &str, icon_ref: &str) -> Result<()>;
}
