//! 1 接続分のライフサイクル管理
//!
//! 受信したフレームを解釈してユースケースに振り分け、失敗は要求元の接続にだけ返す。
//! トランスポート（WebSocket）には依存しないため、テストからは送信キューだけで駆動できる。

use std::sync::Arc;

use crate::{
    domain::{ConnectionId, ExternalIdentity, PusherChannel, Session},
    infrastructure::dto::websocket::ClientEvent,
    usecase::{ChatError, DisconnectOutcome, MessageTarget},
};

use super::state::AppState;

pub struct ConnectionController {
    state: Arc<AppState>,
    session: Session,
}

impl ConnectionController {
    /// 接続を登録し、`connected` を送る
    pub async fn open(state: Arc<AppState>, sender: PusherChannel) -> Self {
        let session = state.connect_participant_usecase.execute(sender).await;
        Self { state, session }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.session.connection_id
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// 受信したテキストフレームを処理する
    ///
    /// 解釈できないフレームには `malformedRequest` を返し、接続は維持する。
    pub async fn handle_text(&mut self, text: &str) {
        let result = match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => self.handle_event(event).await,
            Err(e) => Err(ChatError::MalformedRequest(e.to_string())),
        };
        if let Err(e) = result {
            tracing::debug!(
                "Request from '{}' failed: {}",
                self.session.connection_id,
                e
            );
            self.reply_error(&e).await;
        }
    }

    pub async fn handle_event(&mut self, event: ClientEvent) -> Result<(), ChatError> {
        let state = self.state.clone();
        let session = &mut self.session;
        match event {
            ClientEvent::Authenticate {
                provider_id,
                display_name_hint,
                email,
                avatar_url,
                provider,
            } => {
                let identity = ExternalIdentity {
                    provider_id,
                    display_name_hint: display_name_hint.unwrap_or_default(),
                    email,
                    avatar_url,
                    provider,
                };
                state
                    .authenticate_usecase
                    .execute(session, identity)
                    .await
                    .map(|_| ())
            }
            ClientEvent::JoinRoom { room } => state
                .join_room_usecase
                .join_public(session, room)
                .await
                .map(|_| ()),
            ClientEvent::LeaveRoom { room } => state.join_room_usecase.leave(session, room).await,
            ClientEvent::JoinPrivateChat { target_user_id } => state
                .join_room_usecase
                .join_private(session, target_user_id)
                .await
                .map(|_| ()),
            ClientEvent::SendMessage {
                room,
                recipient_user_id,
                text,
            } => {
                let target = MessageTarget::from_fields(room, recipient_user_id)?;
                state
                    .send_message_usecase
                    .execute(session, target, text)
                    .await
                    .map(|_| ())
            }
            ClientEvent::AddReaction { message_id, emoji } => state
                .toggle_reaction_usecase
                .execute(session, message_id, emoji)
                .await
                .map(|_| ()),
            ClientEvent::SetTyping { room, is_typing } => {
                state
                    .set_typing_usecase
                    .execute(session, room, is_typing)
                    .await
            }
            ClientEvent::JoinVoiceChannel { channel_id } => {
                state.voice_channel_usecase.join(session, channel_id).await
            }
            ClientEvent::LeaveVoiceChannel { channel_id } => {
                state.voice_channel_usecase.leave(session, channel_id).await
            }
            ClientEvent::GetMessageHistory { room, limit } => {
                state.join_room_usecase.history(session, room, limit).await
            }
            ClientEvent::GetVoiceChannelParticipants { channel_id } => {
                state
                    .voice_channel_usecase
                    .participants(session, channel_id)
                    .await
            }
        }
    }

    async fn reply_error(&self, error: &ChatError) {
        if let Err(e) = self
            .state
            .message_pusher
            .push_to(&self.session.connection_id, &error.to_notification())
            .await
        {
            tracing::debug!(
                "Failed to report error to '{}': {}",
                self.session.connection_id,
                e
            );
        }
    }

    /// 切断時の後始末（2 回目以降の呼び出しは何もしない）
    pub async fn close(&mut self) -> DisconnectOutcome {
        self.state
            .disconnect_participant_usecase
            .execute(&mut self.session)
            .await
    }
}
