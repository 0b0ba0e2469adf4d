use imbridge_accounts::{
    ChatJoined, EventRouter,
    events::{
        BUDDY_ICON, BuddyIcon, CHAT_INVITED, CHAT_JOINED, ChatInvite, RECEIVED_IM_MSG, ReceivedIm,
        USER_INFO_RESPONSE, UserInfoResponse,
    },
};

/// Library callbacks, as delivered through a purple backend's router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurpleEvent {
    ChatJoined(ChatJoined),
    ReceivedIm(ReceivedIm),
    ChatInvite(ChatInvite),
    UserInfo(UserInfoResponse),
    BuddyIcon(BuddyIcon),
}

impl PurpleEvent {
    /// Router event name for this callback.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ChatJoined(_) => CHAT_JOINED,
            Self::ReceivedIm(_) => RECEIVED_IM_MSG,
            Self::ChatInvite(_) => CHAT_INVITED,
            Self::UserInfo(_) => USER_INFO_RESPONSE,
            Self::BuddyIcon(_) => BUDDY_ICON,
        }
    }
}

/// Emit a library callback under its own name.
pub fn dispatch(router: &EventRouter<PurpleEvent>, event: PurpleEvent) -> usize {
    router.emit(event.name(), &event)
}
