//! UseCase: 接続の受け付け

use crate::domain::{ConnectionId, Notification, PusherChannel, Session};

use super::context::ChatContext;

/// 接続受け付けのユースケース
pub struct ConnectParticipantUseCase {
    context: ChatContext,
}

impl ConnectParticipantUseCase {
    pub fn new(context: ChatContext) -> Self {
        Self { context }
    }

    /// 接続を MessagePusher と Room 管理に登録し、未認証のセッションを作る
    ///
    /// 登録直後に `connected` を返し、現在のユーザー一覧も送る。
    pub async fn execute(&self, sender: PusherChannel) -> Session {
        let ctx = &self.context;
        let session = Session::new(ConnectionId::generate(), ctx.now());
        ctx.rooms.open(session.connection_id).await;
        ctx.message_pusher
            .register_client(session.connection_id, sender)
            .await;
        tracing::info!("Connection '{}' opened", session.connection_id);

        ctx.reply(
            &session.connection_id,
            Notification::Connected {
                connection_id: session.connection_id,
            },
        )
        .await;
        let users = ctx.users(false).await;
        ctx.reply(
            &session.connection_id,
            Notification::PresenceSnapshot { users },
        )
        .await;
        session
    }
}
