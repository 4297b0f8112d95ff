//! UseCase: 入力中表示
//!
//! 永続化しない。送信者以外の参加者へ配信するだけで、サーバー側での
//! タイムアウトは行わない（解除はクライアントが `isTyping: false` を送る）。

use crate::domain::{ConnectionId, Notification, RoomName, Session};

use super::{context::ChatContext, error::ChatError};

pub struct SetTypingUseCase {
    context: ChatContext,
}

impl SetTypingUseCase {
    pub fn new(context: ChatContext) -> Self {
        Self { context }
    }

    pub async fn execute(
        &self,
        session: &Session,
        room: String,
        is_typing: bool,
    ) -> Result<(), ChatError> {
        let member = session.member().cloned().ok_or(ChatError::AuthRequired)?;
        let room = RoomName::new(room)?;
        let ctx = &self.context;

        let sequencer = ctx.rooms.sequencer(&room).await;
        let _order = sequencer.lock().await;

        let members = ctx.rooms.member_connections(&room).await;
        if !members.contains(&member.connection_id) {
            return Err(ChatError::MalformedRequest(format!(
                "not a member of '{room}'"
            )));
        }
        let targets: Vec<ConnectionId> = members
            .into_iter()
            .filter(|c| *c != member.connection_id)
            .collect();

        ctx.broadcast(
            &targets,
            Notification::Typing {
                room,
                user_id: member.user_id,
                display_name: member.display_name,
                is_typing,
            },
        )
        .await;
        Ok(())
    }
}
