//! WebSocket message DTOs.
//!
//! Every frame is a JSON object tagged by `"type"`; field names are camelCase.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Events sent by clients.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    Authenticate {
        provider_id: String,
        #[serde(default)]
        display_name_hint: Option<String>,
        #[serde(default)]
        email: Option<String>,
        #[serde(default)]
        avatar_url: Option<String>,
        #[serde(default)]
        provider: Option<String>,
    },
    JoinRoom {
        room: String,
    },
    LeaveRoom {
        room: String,
    },
    JoinPrivateChat {
        target_user_id: String,
    },
    SendMessage {
        #[serde(default)]
        room: Option<String>,
        #[serde(default)]
        recipient_user_id: Option<String>,
        text: String,
    },
    AddReaction {
        message_id: String,
        emoji: String,
    },
    SetTyping {
        room: String,
        is_typing: bool,
    },
    JoinVoiceChannel {
        channel_id: String,
    },
    LeaveVoiceChannel {
        channel_id: String,
    },
    GetMessageHistory {
        room: String,
        #[serde(default)]
        limit: Option<usize>,
    },
    GetVoiceChannelParticipants {
        channel_id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    pub id: String,
    pub display_name: String,
    pub online: bool,
    pub last_seen_at: i64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub provider: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    pub id: String,
    pub room: String,
    pub sender_id: String,
    pub sender_display_name: String,
    pub text: String,
    pub timestamp: i64,
    /// `timestamp` の表示用（JST, RFC 3339）
    #[serde(default)]
    pub sent_at: String,
    pub reactions: BTreeMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub receiver_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberDto {
    pub connection_id: String,
    pub user_id: String,
    pub display_name: String,
}

/// Events sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    Connected {
        connection_id: String,
    },
    Authenticated {
        user: UserDto,
    },
    PresenceSnapshot {
        users: Vec<UserDto>,
    },
    RoomJoined {
        room: String,
        history: Vec<MessageDto>,
        members: Vec<MemberDto>,
        #[serde(skip_serializing_if = "Option::is_none")]
        with_user: Option<UserDto>,
    },
    RoomJoinFailed {
        reason: String,
    },
    RoomMembers {
        room: String,
        members: Vec<MemberDto>,
    },
    RoomLeft {
        room: String,
    },
    Message(MessageDto),
    MessageHistory {
        room: String,
        messages: Vec<MessageDto>,
    },
    ReactionsUpdated {
        message_id: String,
        room: String,
        reactions: BTreeMap<String, Vec<String>>,
    },
    Typing {
        room: String,
        user_id: String,
        display_name: String,
        is_typing: bool,
    },
    VoiceRoster {
        channel_id: String,
        participants: Vec<MemberDto>,
    },
    UserLeft {
        room: String,
        user_id: String,
        display_name: String,
        at: i64,
    },
    SessionSuperseded,
    Error {
        kind: String,
        message: String,
    },
}
