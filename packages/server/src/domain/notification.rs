//! サーバーからクライアントへ送る通知（ドメイン表現）
//!
//! ワイヤ形式（JSON）への変換は Infrastructure 層の DTO が担当します。

use super::{
    ChannelId, ChatMessage, ConnectionId, DisplayName, Member, MessageId, Reactions, RoomName,
    Timestamp, User, UserId,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Connected {
        connection_id: ConnectionId,
    },
    Authenticated {
        user: User,
    },
    PresenceSnapshot {
        users: Vec<User>,
    },
    RoomJoined {
        room: RoomName,
        history: Vec<ChatMessage>,
        members: Vec<Member>,
        with_user: Option<User>,
    },
    RoomJoinFailed {
        reason: String,
    },
    RoomMembers {
        room: RoomName,
        members: Vec<Member>,
    },
    RoomLeft {
        room: RoomName,
    },
    Message(ChatMessage),
    MessageHistory {
        room: RoomName,
        messages: Vec<ChatMessage>,
    },
    ReactionsUpdated {
        message_id: MessageId,
        room: RoomName,
        reactions: Reactions,
    },
    Typing {
        room: RoomName,
        user_id: UserId,
        display_name: DisplayName,
        is_typing: bool,
    },
    VoiceRoster {
        channel_id: ChannelId,
        participants: Vec<Member>,
    },
    UserLeft {
        room: RoomName,
        user_id: UserId,
        display_name: DisplayName,
        at: Timestamp,
    },
    SessionSuperseded,
    Error {
        kind: &'static str,
        message: String,
    },
}
