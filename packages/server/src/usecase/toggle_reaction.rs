//! UseCase: リアクションのトグル
//!
//! メッセージを読み直してからトグル・保存・配信までを Room の直列化ロック内で
//! 行うため、同じメッセージへの同時リアクションで更新が失われない。

use crate::domain::{
    ChatMessage, ConnectionId, Emoji, MessageId, Notification, Reactions, RoomKind, Session,
    StoreError, UserId,
};

use super::{context::ChatContext, error::ChatError};

pub struct ToggleReactionUseCase {
    context: ChatContext,
}

impl ToggleReactionUseCase {
    pub fn new(context: ChatContext) -> Self {
        Self { context }
    }

    /// リアクションをトグルし、更新後のリアクション集合を Room へ配信する
    ///
    /// # Errors
    ///
    /// * `ChatError::MessageNotFound` - メッセージが存在しない（または参照できない）
    pub async fn execute(
        &self,
        session: &Session,
        message_id: String,
        emoji: String,
    ) -> Result<Reactions, ChatError> {
        let member = session.member().cloned().ok_or(ChatError::AuthRequired)?;
        let message_id = MessageId::new(message_id)?;
        let emoji = Emoji::new(emoji)?;

        let ctx = &self.context;
        let room = self.find_visible(&message_id, &member.user_id).await?.room;

        let sequencer = ctx.rooms.sequencer(&room).await;
        let _order = sequencer.lock().await;

        let mut message = self.find_visible(&message_id, &member.user_id).await?;
        let added = message.reactions.toggle(emoji.clone(), member.user_id.clone());
        ctx.store
            .update_reactions(&message.id, &message.reactions)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => ChatError::MessageNotFound(message_id.to_string()),
                StoreError::Unavailable(reason) => ChatError::SendFailed(reason),
            })?;

        tracing::debug!(
            "'{}' {} reaction '{}' on message '{}'",
            member.user_id,
            if added { "added" } else { "removed" },
            emoji,
            message.id
        );

        let mut targets: Vec<ConnectionId> = ctx.rooms.member_connections(&room).await;
        if !targets.contains(&member.connection_id) {
            targets.push(member.connection_id);
        }
        ctx.broadcast(
            &targets,
            Notification::ReactionsUpdated {
                message_id: message.id.clone(),
                room,
                reactions: message.reactions.clone(),
            },
        )
        .await;

        Ok(message.reactions)
    }

    /// メッセージを取得する（他人のプライベート Room のメッセージは存在しない扱い）
    async fn find_visible(
        &self,
        message_id: &MessageId,
        user_id: &UserId,
    ) -> Result<ChatMessage, ChatError> {
        let not_found = || ChatError::MessageNotFound(message_id.to_string());
        let message = self
            .context
            .store
            .find_message(message_id)
            .await
            .map_err(|e| {
                tracing::debug!("Message '{}' lookup failed: {}", message_id, e);
                not_found()
            })?;
        if message.room.kind() == RoomKind::Private && message.room.private_peer(user_id).is_none()
        {
            return Err(not_found());
        }
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{
            ChatStore, DisplayName, MessagePusher, MessageText, NewMessage, RoomName, Timestamp,
        },
        infrastructure::{message_pusher::WebSocketMessagePusher, repository::InMemoryChatStore},
        usecase::context::ChatSettings,
    };
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tsudoi_shared::time::FixedClock;

    fn context() -> ChatContext {
        ChatContext::new(
            Arc::new(InMemoryChatStore::new()),
            Arc::new(WebSocketMessagePusher::new()),
            Arc::new(FixedClock::new(1_000)),
            ChatSettings::default(),
        )
    }

    async fn session(ctx: &ChatContext, user: &str) -> (Session, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(64);
        let mut session = Session::new(ConnectionId::generate(), Timestamp::new(0));
        ctx.rooms.open(session.connection_id).await;
        ctx.message_pusher
            .register_client(session.connection_id, tx)
            .await;
        session.authenticate(
            UserId::new(user.to_string()).unwrap(),
            DisplayName::new(user.to_string()).unwrap(),
        );
        (session, rx)
    }

    async fn post(ctx: &ChatContext, room: RoomName) -> ChatMessage {
        ctx.store
            .append_message(NewMessage {
                room,
                sender_id: UserId::new("alice".to_string()).unwrap(),
                sender_display_name: DisplayName::new("Alice".to_string()).unwrap(),
                text: MessageText::new("hello".to_string()).unwrap(),
                timestamp: Timestamp::new(1),
                receiver_id: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_toggle_twice_restores_original() {
        // テスト項目: 同じユーザー・絵文字で 2 回トグルすると元のリアクション集合に戻る
        // given (前提条件):
        let ctx = context();
        let usecase = ToggleReactionUseCase::new(ctx.clone());
        let (bob, mut bob_rx) = session(&ctx, "bob").await;
        let message = post(&ctx, RoomName::public("general".to_string()).unwrap()).await;

        // when (操作):
        let added = usecase
            .execute(&bob, message.id.to_string(), "👍".to_string())
            .await
            .unwrap();
        let removed = usecase
            .execute(&bob, message.id.to_string(), "👍".to_string())
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(added.to_map().get("👍"), Some(&vec!["bob".to_string()]));
        assert_eq!(removed, message.reactions);
        let stored = ctx.store.find_message(&message.id).await.unwrap();
        assert!(stored.reactions.is_empty());

        let frame: serde_json::Value =
            serde_json::from_str(&bob_rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame["type"], "reactionsUpdated");
        assert_eq!(frame["reactions"]["👍"][0], "bob");
    }

    #[tokio::test]
    async fn test_unknown_message_is_message_not_found() {
        // テスト項目: 存在しないメッセージへのリアクションは MessageNotFound
        // given (前提条件):
        let ctx = context();
        let usecase = ToggleReactionUseCase::new(ctx.clone());
        let (bob, _rx) = session(&ctx, "bob").await;

        // when (操作):
        let result = usecase
            .execute(&bob, "local-999999".to_string(), "👍".to_string())
            .await;

        // then (期待する結果):
        assert!(matches!(result, Err(ChatError::MessageNotFound(_))));
    }

    #[tokio::test]
    async fn test_foreign_private_message_is_hidden() {
        // テスト項目: 他人のプライベート Room のメッセージにはリアクションできない
        // given (前提条件):
        let ctx = context();
        let usecase = ToggleReactionUseCase::new(ctx.clone());
        let (carol, _rx) = session(&ctx, "carol").await;
        let room = RoomName::private_between(
            &UserId::new("alice".to_string()).unwrap(),
            &UserId::new("bob".to_string()).unwrap(),
        );
        let message = post(&ctx, room).await;

        // when (操作):
        let result = usecase
            .execute(&carol, message.id.to_string(), "👍".to_string())
            .await;

        // then (期待する結果):
        assert!(matches!(result, Err(ChatError::MessageNotFound(_))));
    }

    #[tokio::test]
    async fn test_concurrent_toggles_are_not_lost() {
        // テスト項目: 異なるユーザーが同時にリアクションしても全員分が保存される
        // given (前提条件):
        let ctx = context();
        let usecase = Arc::new(ToggleReactionUseCase::new(ctx.clone()));
        let message = post(&ctx, RoomName::public("general".to_string()).unwrap()).await;

        // when (操作):
        let mut handles = Vec::new();
        for i in 0..10 {
            let (s, _rx) = session(&ctx, &format!("user{i}")).await;
            let usecase = usecase.clone();
            let id = message.id.to_string();
            handles.push(tokio::spawn(async move {
                usecase.execute(&s, id, "🎉".to_string()).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // then (期待する結果):
        let stored = ctx.store.find_message(&message.id).await.unwrap();
        let emoji = Emoji::new("🎉".to_string()).unwrap();
        assert_eq!(stored.reactions.users(&emoji).map(|u| u.len()), Some(10));
    }
}
