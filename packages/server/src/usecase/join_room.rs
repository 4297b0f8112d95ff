//! UseCase: Room への参加・退出・履歴取得
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - 公開 Room への参加（履歴と参加者の返却、参加者リストの配信）
//! - プライベートチャットの開始（相手の解決、双方の参加）
//! - 退出と履歴取得
//!
//! ### どのような状況を想定しているか
//! - 正常系：参加、Room の切り替え、プライベートチャット
//! - 異常系：未認証、存在しない相手、自分自身とのプライベートチャット
//! - エッジケース：他人のプライベート Room の履歴取得

use crate::domain::{
    ConnectionId, Member, Notification, RoomKind, RoomName, Session, User, UserId,
};

use super::{context::ChatContext, error::ChatError};

/// 1 回の履歴取得で返す最大件数
pub const MAX_HISTORY_LIMIT: usize = 500;

/// Room 参加のユースケース
pub struct JoinRoomUseCase {
    context: ChatContext,
}

impl JoinRoomUseCase {
    pub fn new(context: ChatContext) -> Self {
        Self { context }
    }

    fn member(session: &Session) -> Result<Member, ChatError> {
        session.member().cloned().ok_or(ChatError::AuthRequired)
    }

    /// 公開 Room に参加する
    pub async fn join_public(&self, session: &Session, room: String) -> Result<RoomName, ChatError> {
        let member = Self::member(session)?;
        let room = RoomName::public(room)?;
        self.enter(member, room.clone(), None).await;
        Ok(room)
    }

    /// 相手ユーザーとのプライベートチャットを開始する
    ///
    /// 相手がオンラインなら、相手の接続も同じ Room に参加させる。
    ///
    /// # Errors
    ///
    /// * `ChatError::RoomJoinFailed` - 相手がオンラインでもストアにも存在しない、または自分自身
    pub async fn join_private(
        &self,
        session: &Session,
        target_user_id: String,
    ) -> Result<RoomName, ChatError> {
        let member = Self::member(session)?;
        let target = UserId::new(target_user_id.trim().to_string())?;
        if target == member.user_id {
            return Err(ChatError::RoomJoinFailed(
                "cannot open a private chat with yourself".to_string(),
            ));
        }

        let peer = self.resolve_user(&target).await.ok_or_else(|| {
            ChatError::RoomJoinFailed(format!("user '{target}' could not be found"))
        })?;
        let room = RoomName::private_between(&member.user_id, &target);

        let me = self
            .resolve_user(&member.user_id)
            .await
            .unwrap_or_else(|| {
                let mut me = User::new(
                    member.user_id.clone(),
                    member.display_name.clone(),
                    Default::default(),
                    self.context.now(),
                );
                me.online = true;
                me
            });

        self.enter(member.clone(), room.clone(), Some(peer.clone()))
            .await;

        if let Some(peer_connection) = self.context.presence.connection_of(&target).await
            && peer_connection != member.connection_id
        {
            let peer_member = Member::new(peer_connection, peer.id.clone(), peer.display_name.clone());
            self.enter(peer_member, room.clone(), Some(me)).await;
        }

        tracing::info!(
            "Private chat '{}' opened by '{}'",
            room,
            member.user_id
        );
        Ok(room)
    }

    /// Room から抜ける
    pub async fn leave(&self, session: &Session, room: String) -> Result<(), ChatError> {
        let member = Self::member(session)?;
        let room = RoomName::new(room)?;
        let ctx = &self.context;

        let sequencer = ctx.rooms.sequencer(&room).await;
        let _order = sequencer.lock().await;
        let departure = ctx
            .rooms
            .leave(&member.connection_id, Some(&room))
            .await
            .ok_or_else(|| ChatError::MalformedRequest(format!("not a member of '{room}'")))?;

        ctx.reply(&member.connection_id, Notification::RoomLeft { room })
            .await;
        ctx.announce_departure(&departure, true).await;
        Ok(())
    }

    /// Room の履歴を要求元へ返す
    ///
    /// プライベート Room は参加者本人のみ取得できる。
    pub async fn history(
        &self,
        session: &Session,
        room: String,
        limit: Option<usize>,
    ) -> Result<(), ChatError> {
        let member = Self::member(session)?;
        let room = RoomName::new(room)?;
        match room.kind() {
            RoomKind::Public => {}
            RoomKind::Private if room.private_peer(&member.user_id).is_some() => {}
            RoomKind::Private | RoomKind::Voice => {
                return Err(ChatError::MalformedRequest(format!(
                    "history of '{room}' is not available"
                )));
            }
        }

        let limit = limit
            .unwrap_or(self.context.settings.history_limit)
            .clamp(1, MAX_HISTORY_LIMIT);
        let messages = self.load_history(&room, limit).await;
        self.context
            .reply(
                &member.connection_id,
                Notification::MessageHistory { room, messages },
            )
            .await;
        Ok(())
    }

    /// 参加処理の本体
    ///
    /// 参加者の追加から履歴の読み出し・通知までを Room の直列化ロック内で行うため、
    /// 参加と同時に送られたメッセージが欠けたり重複したりしない。
    async fn enter(&self, member: Member, room: RoomName, with_user: Option<User>) {
        let ctx = &self.context;
        let connection_id = member.connection_id;

        if let Some(current) = ctx.rooms.current_room(&connection_id).await
            && current != room
        {
            ctx.leave_current_room(&connection_id, false).await;
        }

        let sequencer = ctx.rooms.sequencer(&room).await;
        let _order = sequencer.lock().await;

        let Some(outcome) = ctx.rooms.join(member, &room).await else {
            tracing::debug!(
                "Connection '{}' is closed; not joining room '{}'",
                connection_id,
                room
            );
            return;
        };
        if let Some(left) = &outcome.left {
            ctx.announce_departure(left, false).await;
        }

        let history = self.load_history(&room, ctx.settings.history_limit).await;
        ctx.reply(
            &connection_id,
            Notification::RoomJoined {
                room: room.clone(),
                history,
                members: outcome.members.clone(),
                with_user,
            },
        )
        .await;

        if !outcome.already_member {
            tracing::info!("Connection '{}' joined room '{}'", connection_id, room);
            let targets: Vec<ConnectionId> =
                outcome.members.iter().map(|m| m.connection_id).collect();
            ctx.broadcast(
                &targets,
                Notification::RoomMembers {
                    room,
                    members: outcome.members,
                },
            )
            .await;
        }
    }

    async fn load_history(&self, room: &RoomName, limit: usize) -> Vec<crate::domain::ChatMessage> {
        match self.context.store.list_messages(room, limit).await {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!("Failed to load history of '{}': {}", room, e);
                Vec::new()
            }
        }
    }

    /// オンラインのユーザー、またはストアにいるユーザーを解決する
    async fn resolve_user(&self, user_id: &UserId) -> Option<User> {
        let ctx = &self.context;
        let online = ctx.presence.online_users().await;
        let entry = online.into_iter().find(|(id, _)| id == user_id);

        match ctx.store.find_user(user_id).await {
            Ok(mut user) => {
                user.online = entry.is_some();
                Some(user)
            }
            Err(e) => {
                tracing::debug!("User '{}' not found in store: {}", user_id, e);
                entry.map(|(id, entry)| {
                    let mut user = User::new(id, entry.display_name, Default::default(), ctx.now());
                    user.online = true;
                    user
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{
            ChatStore, DisplayName, MessagePusher, MessageText, NewMessage, ProviderMeta,
            Timestamp,
        },
        infrastructure::{message_pusher::WebSocketMessagePusher, repository::InMemoryChatStore},
        usecase::context::ChatSettings,
    };
    use serde_json::Value;
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

    async fn authenticated(ctx: &ChatContext, user: &str) -> (Session, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(64);
        let mut session = Session::new(ConnectionId::generate(), Timestamp::new(0));
        ctx.rooms.open(session.connection_id).await;
        ctx.message_pusher
            .register_client(session.connection_id, tx)
            .await;
        let user_id = UserId::new(user.to_string()).unwrap();
        let name = DisplayName::new(user.to_string()).unwrap();
        ctx.store
            .upsert_user(&user_id, &name, &ProviderMeta::default(), Timestamp::new(0))
            .await
            .unwrap();
        ctx.presence
            .set_online(&user_id, session.connection_id, &name)
            .await;
        session.authenticate(user_id, name);
        (session, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(serde_json::from_str(&frame).unwrap());
        }
        frames
    }

    #[tokio::test]
    async fn test_join_public_returns_history_and_members() {
        // テスト項目: 公開 Room に参加すると履歴と参加者が返り、参加者リストが配信される
        // given (前提条件):
        let ctx = context();
        let usecase = JoinRoomUseCase::new(ctx.clone());
        let (alice, mut alice_rx) = authenticated(&ctx, "alice").await;
        let (bob, mut bob_rx) = authenticated(&ctx, "bob").await;
        let general = RoomName::public("general".to_string()).unwrap();
        ctx.store
            .append_message(NewMessage {
                room: general.clone(),
                sender_id: UserId::new("alice".to_string()).unwrap(),
                sender_display_name: DisplayName::new("alice".to_string()).unwrap(),
                text: MessageText::new("earlier".to_string()).unwrap(),
                timestamp: Timestamp::new(10),
                receiver_id: None,
            })
            .await
            .unwrap();
        usecase.join_public(&alice, "general".to_string()).await.unwrap();
        drain(&mut alice_rx);

        // when (操作):
        usecase.join_public(&bob, "general".to_string()).await.unwrap();

        // then (期待する結果):
        let bob_frames = drain(&mut bob_rx);
        assert_eq!(bob_frames[0]["type"], "roomJoined");
        assert_eq!(bob_frames[0]["history"][0]["text"], "earlier");
        assert_eq!(bob_frames[0]["members"].as_array().unwrap().len(), 2);
        let alice_frames = drain(&mut alice_rx);
        assert_eq!(alice_frames.len(), 1);
        assert_eq!(alice_frames[0]["type"], "roomMembers");
    }

    #[tokio::test]
    async fn test_join_requires_authentication() {
        // テスト項目: 未認証のセッションは Room に参加できない
        // given (前提条件):
        let ctx = context();
        let usecase = JoinRoomUseCase::new(ctx.clone());
        let session = Session::new(ConnectionId::generate(), Timestamp::new(0));

        // when (操作):
        let result = usecase.join_public(&session, "general".to_string()).await;

        // then (期待する結果):
        assert_eq!(result, Err(ChatError::AuthRequired));
        assert!(ctx.rooms.public_rooms().await.is_empty());
    }

    #[tokio::test]
    async fn test_join_private_moves_both_sessions() {
        // テスト項目: プライベートチャットを開始すると、双方のセッションが同じ Room に入る
        // given (前提条件):
        let ctx = context();
        let usecase = JoinRoomUseCase::new(ctx.clone());
        let (alice, _alice_rx) = authenticated(&ctx, "alice").await;
        let (bob, mut bob_rx) = authenticated(&ctx, "bob").await;
        usecase.join_public(&bob, "general".to_string()).await.unwrap();
        drain(&mut bob_rx);

        // when (操作):
        let room = usecase
            .join_private(&alice, "bob".to_string())
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(room.as_str(), "private:alice:bob");
        assert_eq!(ctx.rooms.current_room(&alice.connection_id).await, Some(room.clone()));
        assert_eq!(ctx.rooms.current_room(&bob.connection_id).await, Some(room));
        let bob_frames = drain(&mut bob_rx);
        let joined = bob_frames
            .iter()
            .find(|f| f["type"] == "roomJoined")
            .unwrap();
        assert_eq!(joined["withUser"]["id"], "alice");
    }

    #[tokio::test]
    async fn test_join_private_with_unknown_user_fails() {
        // テスト項目: 存在しない相手・自分自身とのプライベートチャットは RoomJoinFailed
        // given (前提条件):
        let ctx = context();
        let usecase = JoinRoomUseCase::new(ctx.clone());
        let (alice, _rx) = authenticated(&ctx, "alice").await;

        // when (操作):
        let unknown = usecase.join_private(&alice, "ghost".to_string()).await;
        let myself = usecase.join_private(&alice, "alice".to_string()).await;

        // then (期待する結果):
        assert!(matches!(unknown, Err(ChatError::RoomJoinFailed(_))));
        assert!(matches!(myself, Err(ChatError::RoomJoinFailed(_))));
        assert!(ctx.rooms.current_room(&alice.connection_id).await.is_none());
    }

    #[tokio::test]
    async fn test_join_private_with_offline_stored_user() {
        // テスト項目: オフラインでもストアにいる相手とはプライベート Room を開ける
        // given (前提条件):
        let ctx = context();
        let usecase = JoinRoomUseCase::new(ctx.clone());
        let (alice, mut alice_rx) = authenticated(&ctx, "alice").await;
        ctx.store
            .upsert_user(
                &UserId::new("carol".to_string()).unwrap(),
                &DisplayName::new("Carol".to_string()).unwrap(),
                &ProviderMeta::default(),
                Timestamp::new(0),
            )
            .await
            .unwrap();

        // when (操作):
        let room = usecase.join_private(&alice, "carol".to_string()).await.unwrap();

        // then (期待する結果):
        assert_eq!(ctx.rooms.members(&room).await.len(), 1);
        let frames = drain(&mut alice_rx);
        assert_eq!(frames[0]["withUser"]["online"], false);
    }

    #[tokio::test]
    async fn test_join_private_skips_peer_connection_being_closed() {
        // テスト項目: 切断処理中（Room からは抜けたが Presence にはまだ残っている）の相手の接続は
        //             プライベート Room に入らない
        // given (前提条件):
        let ctx = context();
        let usecase = JoinRoomUseCase::new(ctx.clone());
        let (alice, _alice_rx) = authenticated(&ctx, "alice").await;
        let (bob, _bob_rx) = authenticated(&ctx, "bob").await;
        ctx.message_pusher.unregister_client(&bob.connection_id).await;
        ctx.close_connection(&bob.connection_id).await;

        // when (操作):
        let room = usecase
            .join_private(&alice, "bob".to_string())
            .await
            .unwrap();
        ctx.presence
            .set_offline(bob.user_id().unwrap(), bob.connection_id)
            .await;

        // then (期待する結果):
        assert_eq!(
            ctx.rooms.member_connections(&room).await,
            vec![alice.connection_id]
        );
        assert!(ctx.rooms.current_room(&bob.connection_id).await.is_none());
    }

    #[tokio::test]
    async fn test_history_of_private_room_with_colon_ids() {
        // テスト項目: ID に区切り文字を含むユーザーでも、他人のプライベート Room の履歴は読めない
        // given (前提条件):
        let ctx = context();
        let usecase = JoinRoomUseCase::new(ctx.clone());
        let (a, _a_rx) = authenticated(&ctx, "a").await;
        let (a_b, mut a_b_rx) = authenticated(&ctx, "a:b").await;
        let (_b_c, _b_c_rx) = authenticated(&ctx, "b:c").await;
        let room = usecase.join_private(&a, "b:c".to_string()).await.unwrap();
        drain(&mut a_b_rx);

        // when (操作):
        let guessed = usecase
            .history(&a_b, "private:a:b:c".to_string(), None)
            .await;
        let actual = usecase.history(&a_b, room.as_str().to_string(), None).await;

        // then (期待する結果):
        assert!(matches!(guessed, Err(ChatError::MalformedRequest(_))));
        assert!(matches!(actual, Err(ChatError::MalformedRequest(_))));
        assert!(drain(&mut a_b_rx).is_empty());
    }

    #[tokio::test]
    async fn test_history_of_foreign_private_room_is_rejected() {
        // テスト項目: 他人同士のプライベート Room の履歴は取得できない
        // given (前提条件):
        let ctx = context();
        let usecase = JoinRoomUseCase::new(ctx.clone());
        let (carol, _rx) = authenticated(&ctx, "carol").await;

        // when (操作):
        let result = usecase
            .history(&carol, "private:alice:bob".to_string(), None)
            .await;

        // then (期待する結果):
        assert!(matches!(result, Err(ChatError::MalformedRequest(_))));
    }

    #[tokio::test]
    async fn test_leave_announces_to_remaining_members() {
        // テスト項目: 退出すると残りの参加者へ参加者リストと userLeft が届く
        // given (前提条件):
        let ctx = context();
        let usecase = JoinRoomUseCase::new(ctx.clone());
        let (alice, mut alice_rx) = authenticated(&ctx, "alice").await;
        let (bob, mut bob_rx) = authenticated(&ctx, "bob").await;
        usecase.join_public(&alice, "general".to_string()).await.unwrap();
        usecase.join_public(&bob, "general".to_string()).await.unwrap();
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        // when (操作):
        usecase.leave(&bob, "general".to_string()).await.unwrap();

        // then (期待する結果):
        let bob_frames = drain(&mut bob_rx);
        assert_eq!(bob_frames[0]["type"], "roomLeft");
        let alice_frames = drain(&mut alice_rx);
        let types: Vec<&str> = alice_frames
            .iter()
            .map(|f| f["type"].as_str().unwrap())
            .collect();
        assert_eq!(types, vec!["roomMembers", "userLeft"]);
        assert!(
            usecase
                .leave(&bob, "general".to_string())
                .await
                .is_err()
        );
    }
}
