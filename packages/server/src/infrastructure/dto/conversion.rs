//! Conversion logic between DTOs and domain entities.

use tsudoi_shared::time::timestamp_to_jst_rfc3339;

use crate::domain::{ChatMessage, ExternalIdentity, Member, Notification, User};
use crate::infrastructure::dto::{http, websocket as dto};

// ========================================
// Domain Entity → DTO
// ========================================

impl From<&User> for dto::UserDto {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.as_str().to_string(),
            display_name: user.display_name.as_str().to_string(),
            online: user.online,
            last_seen_at: user.last_seen_at.value(),
            email: user.meta.email.clone(),
            avatar_url: user.meta.avatar_url.clone(),
            provider: user.meta.provider.clone(),
        }
    }
}

impl From<&ChatMessage> for dto::MessageDto {
    fn from(message: &ChatMessage) -> Self {
        Self {
            id: message.id.as_str().to_string(),
            room: message.room.as_str().to_string(),
            sender_id: message.sender_id.as_str().to_string(),
            sender_display_name: message.sender_display_name.as_str().to_string(),
            text: message.text.as_str().to_string(),
            timestamp: message.timestamp.value(),
            sent_at: timestamp_to_jst_rfc3339(message.timestamp.value()),
            reactions: message.reactions.to_map(),
            receiver_id: message.receiver_id.as_ref().map(|r| r.as_str().to_string()),
        }
    }
}

impl From<&Member> for dto::MemberDto {
    fn from(member: &Member) -> Self {
        Self {
            connection_id: member.connection_id.to_string(),
            user_id: member.user_id.as_str().to_string(),
            display_name: member.display_name.as_str().to_string(),
        }
    }
}

fn users(users: &[User]) -> Vec<dto::UserDto> {
    users.iter().map(dto::UserDto::from).collect()
}

fn messages(messages: &[ChatMessage]) -> Vec<dto::MessageDto> {
    messages.iter().map(dto::MessageDto::from).collect()
}

fn members(members: &[Member]) -> Vec<dto::MemberDto> {
    members.iter().map(dto::MemberDto::from).collect()
}

impl From<&Notification> for dto::ServerEvent {
    fn from(notification: &Notification) -> Self {
        match notification {
            Notification::Connected { connection_id } => Self::Connected {
                connection_id: connection_id.to_string(),
            },
            Notification::Authenticated { user } => Self::Authenticated { user: user.into() },
            Notification::PresenceSnapshot { users: list } => Self::PresenceSnapshot {
                users: users(list),
            },
            Notification::RoomJoined {
                room,
                history,
                members: list,
                with_user,
            } => Self::RoomJoined {
                room: room.as_str().to_string(),
                history: messages(history),
                members: members(list),
                with_user: with_user.as_ref().map(dto::UserDto::from),
            },
            Notification::RoomJoinFailed { reason } => Self::RoomJoinFailed {
                reason: reason.clone(),
            },
            Notification::RoomMembers { room, members: list } => Self::RoomMembers {
                room: room.as_str().to_string(),
                members: members(list),
            },
            Notification::RoomLeft { room } => Self::RoomLeft {
                room: room.as_str().to_string(),
            },
            Notification::Message(message) => Self::Message(message.into()),
            Notification::MessageHistory {
                room,
                messages: list,
            } => Self::MessageHistory {
                room: room.as_str().to_string(),
                messages: messages(list),
            },
            Notification::ReactionsUpdated {
                message_id,
                room,
                reactions,
            } => Self::ReactionsUpdated {
                message_id: message_id.as_str().to_string(),
                room: room.as_str().to_string(),
                reactions: reactions.to_map(),
            },
            Notification::Typing {
                room,
                user_id,
                display_name,
                is_typing,
            } => Self::Typing {
                room: room.as_str().to_string(),
                user_id: user_id.as_str().to_string(),
                display_name: display_name.as_str().to_string(),
                is_typing: *is_typing,
            },
            Notification::VoiceRoster {
                channel_id,
                participants,
            } => Self::VoiceRoster {
                channel_id: channel_id.as_str().to_string(),
                participants: members(participants),
            },
            Notification::UserLeft {
                room,
                user_id,
                display_name,
                at,
            } => Self::UserLeft {
                room: room.as_str().to_string(),
                user_id: user_id.as_str().to_string(),
                display_name: display_name.as_str().to_string(),
                at: at.value(),
            },
            Notification::SessionSuperseded => Self::SessionSuperseded,
            Notification::Error { kind, message } => Self::Error {
                kind: kind.to_string(),
                message: message.clone(),
            },
        }
    }
}

// ========================================
// DTO → Domain
// ========================================

impl From<http::CreateUserRequest> for ExternalIdentity {
    fn from(request: http::CreateUserRequest) -> Self {
        Self {
            provider_id: request.provider_id,
            display_name_hint: request.display_name.unwrap_or_default(),
            email: request.email,
            avatar_url: request.avatar_url,
            provider: request.provider,
        }
    }
}
