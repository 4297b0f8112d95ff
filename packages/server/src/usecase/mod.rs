//! UseCase 層
//!
//! 1 操作 = 1 構造体。どのユースケースも [`ChatContext`] を共有し、
//! Room ごとの直列化ロックを通して状態を更新・配信します。

pub mod authenticate;
pub mod connect_participant;
pub mod context;
pub mod disconnect_participant;
pub mod error;
pub mod get_messages;
pub mod get_rooms;
pub mod get_users;
pub mod health_check;
pub mod issue_call_credential;
pub mod join_room;
pub mod send_message;
pub mod set_typing;
pub mod toggle_reaction;
pub mod voice_channel;

pub use authenticate::{AuthOutcome, AuthenticateUseCase};
pub use connect_participant::ConnectParticipantUseCase;
pub use context::{ChatContext, ChatSettings, DEFAULT_HISTORY_LIMIT, SupersedePolicy};
pub use disconnect_participant::{DisconnectOutcome, DisconnectParticipantUseCase};
pub use error::ChatError;
pub use get_messages::GetMessagesUseCase;
pub use get_rooms::GetRoomsUseCase;
pub use get_users::GetUsersUseCase;
pub use health_check::{HealthCheckUseCase, StoreHealth};
pub use issue_call_credential::IssueCallCredentialUseCase;
pub use join_room::{JoinRoomUseCase, MAX_HISTORY_LIMIT};
pub use send_message::{MessageTarget, SendMessageUseCase};
pub use set_typing::SetTypingUseCase;
pub use toggle_reaction::ToggleReactionUseCase;
pub use voice_channel::VoiceChannelUseCase;
