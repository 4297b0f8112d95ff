//! UseCase: メッセージ送信処理
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - SendMessageUseCase::execute() メソッド
//! - 宛先の解決 → 永続化 → Room の参加者（送信者を含む）へのブロードキャスト
//!
//! ### なぜこのテストが必要か
//! - 送信者は自分のメッセージをブロードキャスト経由でちょうど 1 回受け取る
//! - Room 内の配信順序が処理順と一致することを保証する
//!
//! ### どのような状況を想定しているか
//! - 正常系：公開 Room への送信、相手ユーザー宛ての送信
//! - 異常系：未認証、空の本文、他人のプライベート Room への送信
//! - エッジケース：永続化の失敗（送信者にだけ SendFailed）

use crate::domain::{
    ChatMessage, MessageText, NewMessage, Notification, RoomKind, RoomName, Session, UserId,
};

use super::{context::ChatContext, error::ChatError};

/// 送信先
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageTarget {
    /// Room 名を指定（公開 Room、または自分が参加者のプライベート Room）
    Room(String),
    /// 相手ユーザーを指定（プライベート Room 名を導出する）
    Recipient(String),
}

impl MessageTarget {
    /// `sendMessage` の `room` / `recipientUserId` から送信先を決める（相手指定を優先）
    pub fn from_fields(
        room: Option<String>,
        recipient_user_id: Option<String>,
    ) -> Result<Self, ChatError> {
        match (room, recipient_user_id) {
            (_, Some(recipient)) => Ok(Self::Recipient(recipient)),
            (Some(room), None) => Ok(Self::Room(room)),
            (None, None) => Err(ChatError::MalformedRequest(
                "either room or recipientUserId is required".to_string(),
            )),
        }
    }
}

/// メッセージ送信のユースケース
pub struct SendMessageUseCase {
    context: ChatContext,
}

impl SendMessageUseCase {
    pub fn new(context: ChatContext) -> Self {
        Self { context }
    }

    /// メッセージ送信を実行
    ///
    /// # Returns
    ///
    /// * `Ok(ChatMessage)` - 永続化され、ID が採番されたメッセージ
    /// * `Err(ChatError)` - 送信失敗（ブロードキャストは行われない）
    pub async fn execute(
        &self,
        session: &Session,
        target: MessageTarget,
        text: String,
    ) -> Result<ChatMessage, ChatError> {
        let member = session.member().cloned().ok_or(ChatError::AuthRequired)?;
        let text = MessageText::new(text)?;
        let (room, receiver_id) = resolve_target(&member.user_id, target)?;

        let ctx = &self.context;
        let sequencer = ctx.rooms.sequencer(&room).await;
        let mut clock = sequencer.lock().await;

        let timestamp = clock.next(ctx.now());
        let stored = ctx
            .store
            .append_message(NewMessage {
                room: room.clone(),
                sender_id: member.user_id.clone(),
                sender_display_name: member.display_name.clone(),
                text,
                timestamp,
                receiver_id: receiver_id.clone(),
            })
            .await
            .map_err(|e| {
                tracing::error!("Failed to persist message in '{}': {}", room, e);
                ChatError::SendFailed(e.to_string())
            })?;

        let mut targets = ctx.rooms.member_connections(&room).await;
        if !targets.contains(&member.connection_id) {
            targets.push(member.connection_id);
        }
        // 相手がまだ Room を開いていなくても、オンラインなら届ける
        if let Some(peer) = &receiver_id
            && let Some(peer_connection) = ctx.presence.connection_of(peer).await
            && !targets.contains(&peer_connection)
        {
            targets.push(peer_connection);
        }

        tracing::debug!(
            "Message '{}' from '{}' in '{}' to {} connection(s)",
            stored.id,
            member.user_id,
            room,
            targets.len()
        );
        ctx.broadcast(&targets, Notification::Message(stored.clone()))
            .await;
        drop(clock);

        Ok(stored)
    }
}

fn resolve_target(
    me: &UserId,
    target: MessageTarget,
) -> Result<(RoomName, Option<UserId>), ChatError> {
    match target {
        MessageTarget::Recipient(recipient) => {
            let recipient = UserId::new(recipient.trim().to_string())?;
            if recipient == *me {
                return Err(ChatError::MalformedRequest(
                    "cannot send a private message to yourself".to_string(),
                ));
            }
            Ok((RoomName::private_between(me, &recipient), Some(recipient)))
        }
        MessageTarget::Room(room) => {
            let room = RoomName::new(room.trim().to_string())?;
            match room.kind() {
                RoomKind::Public => Ok((room, None)),
                RoomKind::Private => {
                    let peer = room.private_peer(me).ok_or_else(|| {
                        ChatError::MalformedRequest(format!("not a participant of '{room}'"))
                    })?;
                    Ok((room, Some(peer)))
                }
                RoomKind::Voice => Err(ChatError::MalformedRequest(
                    "voice channels do not carry messages".to_string(),
                )),
            }
        }
    }
}
