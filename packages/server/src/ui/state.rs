//! Server state shared by every handler.

use std::sync::Arc;

use crate::{
    domain::MessagePusher,
    infrastructure::credential::CallCredentialIssuer,
    usecase::{
        AuthenticateUseCase, ChatContext, ConnectParticipantUseCase, DisconnectParticipantUseCase,
        GetMessagesUseCase, GetRoomsUseCase, GetUsersUseCase, HealthCheckUseCase,
        IssueCallCredentialUseCase, JoinRoomUseCase, SendMessageUseCase, SetTypingUseCase,
        ToggleReactionUseCase, VoiceChannelUseCase,
    },
};

/// 既定の接続ごとの送信キュー長
pub const DEFAULT_OUTBOUND_QUEUE: usize = 256;

/// Shared application state
pub struct AppState {
    /// MessagePusher（メッセージ通知の抽象化）
    pub message_pusher: Arc<dyn MessagePusher>,
    pub connect_participant_usecase: Arc<ConnectParticipantUseCase>,
    pub disconnect_participant_usecase: Arc<DisconnectParticipantUseCase>,
    pub authenticate_usecase: Arc<AuthenticateUseCase>,
    pub join_room_usecase: Arc<JoinRoomUseCase>,
    pub send_message_usecase: Arc<SendMessageUseCase>,
    pub toggle_reaction_usecase: Arc<ToggleReactionUseCase>,
    pub set_typing_usecase: Arc<SetTypingUseCase>,
    pub voice_channel_usecase: Arc<VoiceChannelUseCase>,
    pub get_users_usecase: Arc<GetUsersUseCase>,
    pub get_messages_usecase: Arc<GetMessagesUseCase>,
    pub get_rooms_usecase: Arc<GetRoomsUseCase>,
    pub health_check_usecase: Arc<HealthCheckUseCase>,
    pub issue_call_credential_usecase: Arc<IssueCallCredentialUseCase>,
    /// 接続ごとの送信キュー長（溢れた接続は切断される）
    pub outbound_queue: usize,
}

impl AppState {
    /// 共有コンテキストから全ユースケースを組み立てる
    pub fn new(context: ChatContext, issuer: CallCredentialIssuer, outbound_queue: usize) -> Self {
        Self {
            message_pusher: context.message_pusher.clone(),
            connect_participant_usecase: Arc::new(ConnectParticipantUseCase::new(context.clone())),
            disconnect_participant_usecase: Arc::new(DisconnectParticipantUseCase::new(
                context.clone(),
            )),
            authenticate_usecase: Arc::new(AuthenticateUseCase::new(context.clone())),
            join_room_usecase: Arc::new(JoinRoomUseCase::new(context.clone())),
            send_message_usecase: Arc::new(SendMessageUseCase::new(context.clone())),
            toggle_reaction_usecase: Arc::new(ToggleReactionUseCase::new(context.clone())),
            set_typing_usecase: Arc::new(SetTypingUseCase::new(context.clone())),
            voice_channel_usecase: Arc::new(VoiceChannelUseCase::new(context.clone())),
            get_users_usecase: Arc::new(GetUsersUseCase::new(context.clone())),
            get_messages_usecase: Arc::new(GetMessagesUseCase::new(context.clone())),
            get_rooms_usecase: Arc::new(GetRoomsUseCase::new(context.clone())),
            health_check_usecase: Arc::new(HealthCheckUseCase::new(context.store.clone())),
            issue_call_credential_usecase: Arc::new(IssueCallCredentialUseCase::new(
                issuer,
                context.clock.clone(),
            )),
            outbound_queue: outbound_queue.max(1),
        }
    }
}
