//! UseCase: 認証
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - AuthenticateUseCase::execute() メソッド
//! - 外部 ID の解決 → ユーザーの upsert → Presence への登録 → 一覧の配信
//!
//! ### どのような状況を想定しているか
//! - 正常系：初回認証、同じプロバイダ ID での再認証
//! - 異常系：空のプロバイダ ID、認証済みセッションでの別ユーザーへの切り替え
//! - エッジケース：同じユーザーが別の接続で認証（以前の接続の置き換え）

use crate::domain::{
    ConnectionId, ExternalIdentity, IdentityResolver, Notification, Session, User,
};

use super::{
    context::{ChatContext, SupersedePolicy},
    error::ChatError,
};

/// 認証結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    pub user: User,
    /// 置き換えられた以前の接続
    pub superseded: Option<ConnectionId>,
}

/// 認証のユースケース
pub struct AuthenticateUseCase {
    context: ChatContext,
    resolver: IdentityResolver,
}

impl AuthenticateUseCase {
    pub fn new(context: ChatContext) -> Self {
        Self {
            context,
            resolver: IdentityResolver::new(),
        }
    }

    /// 認証を実行
    ///
    /// # Arguments
    ///
    /// * `session` - 認証するセッション（成功時に認証済みになる）
    /// * `identity` - 外部 ID プロバイダで検証済みの ID 情報
    ///
    /// # Errors
    ///
    /// * `ChatError::InvalidIdentity` - プロバイダ ID が空
    /// * `ChatError::MalformedRequest` - 認証済みのセッションが別のユーザーとして認証しようとした
    pub async fn execute(
        &self,
        session: &mut Session,
        identity: ExternalIdentity,
    ) -> Result<AuthOutcome, ChatError> {
        let resolved = self.resolver.resolve(&identity)?;
        if let Some(current) = session.user_id()
            && *current != resolved.user_id
        {
            return Err(ChatError::MalformedRequest(
                "session is already authenticated as another user".to_string(),
            ));
        }

        let ctx = &self.context;
        let now = ctx.now();
        let mut user = match ctx
            .store
            .upsert_user(
                &resolved.user_id,
                &resolved.display_name,
                &resolved.meta,
                now,
            )
            .await
        {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!("Failed to upsert user '{}': {}", resolved.user_id, e);
                User::new(
                    resolved.user_id.clone(),
                    resolved.display_name.clone(),
                    resolved.meta.clone(),
                    now,
                )
            }
        };
        user.mark(true, now);

        let superseded = ctx
            .presence
            .set_online(&user.id, session.connection_id, &user.display_name)
            .await;
        // Presence を先に更新し、古い接続の切断処理がオフラインを書き込まないようにする
        if let Err(e) = ctx.store.set_user_online(&user.id, true, now).await {
            tracing::warn!("Failed to persist online state of '{}': {}", user.id, e);
        }
        session.authenticate(user.id.clone(), user.display_name.clone());
        tracing::info!(
            "Connection '{}' authenticated as '{}' ({})",
            session.connection_id,
            user.id,
            user.display_name
        );

        ctx.reply(
            &session.connection_id,
            Notification::Authenticated { user: user.clone() },
        )
        .await;

        if let Some(previous) = superseded {
            self.handle_superseded(previous, &user).await;
        }
        ctx.broadcast_presence().await;

        Ok(AuthOutcome { user, superseded })
    }

    async fn handle_superseded(&self, previous: ConnectionId, user: &User) {
        match self.context.settings.on_superseded {
            SupersedePolicy::Linger => {
                tracing::info!(
                    "Connection '{}' of '{}' was superseded and is left open",
                    previous,
                    user.id
                );
            }
            SupersedePolicy::Close => {
                tracing::info!(
                    "Connection '{}' of '{}' was superseded; closing it",
                    previous,
                    user.id
                );
                self.context
                    .reply(&previous, Notification::SessionSuperseded)
                    .await;
                // 送信キューを閉じると、その接続は通常の切断処理を経て終了する
                self.context.message_pusher.unregister_client(&previous).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{ChatStore, MessagePusher, Timestamp},
        infrastructure::{message_pusher::WebSocketMessagePusher, repository::InMemoryChatStore},
        usecase::{DisconnectParticipantUseCase, context::ChatSettings},
    };
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tsudoi_shared::time::FixedClock;

    fn context(policy: SupersedePolicy) -> ChatContext {
        ChatContext::new(
            Arc::new(InMemoryChatStore::new()),
            Arc::new(WebSocketMessagePusher::new()),
            Arc::new(FixedClock::new(1_000)),
            ChatSettings {
                on_superseded: policy,
                ..Default::default()
            },
        )
    }

    async fn connect(ctx: &ChatContext) -> (Session, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(32);
        let session = Session::new(ConnectionId::generate(), Timestamp::new(0));
        ctx.rooms.open(session.connection_id).await;
        ctx.message_pusher
            .register_client(session.connection_id, tx)
            .await;
        (session, rx)
    }

    fn identity(provider_id: &str, name: &str) -> ExternalIdentity {
        ExternalIdentity {
            provider_id: provider_id.to_string(),
            display_name_hint: name.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_authenticate_marks_user_online() {
        // テスト項目: 認証するとユーザーが作成され、オンライン一覧に載る
        // given (前提条件):
        let ctx = context(SupersedePolicy::Linger);
        let usecase = AuthenticateUseCase::new(ctx.clone());
        let (mut session, mut rx) = connect(&ctx).await;

        // when (操作):
        let outcome = usecase
            .execute(&mut session, identity("p1", "Alice"))
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(outcome.user.id.as_str(), "p1");
        assert!(outcome.user.online);
        assert_eq!(session.user_id(), Some(&outcome.user.id));
        let online = ctx.users(true).await;
        assert_eq!(online.len(), 1);
        assert_eq!(online[0].display_name.as_str(), "Alice");
        assert!(ctx.store.find_user(&outcome.user.id).await.unwrap().online);

        let first: serde_json::Value =
            serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(first["type"], "authenticated");
        let second: serde_json::Value =
            serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(second["type"], "presenceSnapshot");
    }

    #[tokio::test]
    async fn test_empty_provider_id_is_invalid_identity() {
        // テスト項目: 空のプロバイダ ID は InvalidIdentity となり、状態は変わらない
        // given (前提条件):
        let ctx = context(SupersedePolicy::Linger);
        let usecase = AuthenticateUseCase::new(ctx.clone());
        let (mut session, _rx) = connect(&ctx).await;

        // when (操作):
        let result = usecase.execute(&mut session, identity("  ", "Alice")).await;

        // then (期待する結果):
        assert!(matches!(result, Err(ChatError::InvalidIdentity(_))));
        assert!(session.user_id().is_none());
        assert_eq!(ctx.presence.count().await, 0);
    }

    #[tokio::test]
    async fn test_reauthenticate_as_other_user_is_rejected() {
        // テスト項目: 認証済みのセッションが別のユーザーとして認証すると拒否される
        // given (前提条件):
        let ctx = context(SupersedePolicy::Linger);
        let usecase = AuthenticateUseCase::new(ctx.clone());
        let (mut session, _rx) = connect(&ctx).await;
        usecase
            .execute(&mut session, identity("p1", "Alice"))
            .await
            .unwrap();

        // when (操作):
        let same = usecase.execute(&mut session, identity("p1", "Alice")).await;
        let other = usecase.execute(&mut session, identity("p2", "Bob")).await;

        // then (期待する結果):
        assert!(same.is_ok());
        assert_eq!(same.unwrap().superseded, None);
        assert!(matches!(other, Err(ChatError::MalformedRequest(_))));
        assert_eq!(session.user_id().map(|u| u.as_str()), Some("p1"));
    }

    #[tokio::test]
    async fn test_close_policy_closes_superseded_connection() {
        // テスト項目: close ポリシーでは以前の接続に sessionSuperseded を送り、キューを閉じる
        // given (前提条件):
        let ctx = context(SupersedePolicy::Close);
        let usecase = AuthenticateUseCase::new(ctx.clone());
        let (mut old_session, mut old_rx) = connect(&ctx).await;
        let (mut new_session, _new_rx) = connect(&ctx).await;
        usecase
            .execute(&mut old_session, identity("p1", "Alice"))
            .await
            .unwrap();

        // when (操作):
        let outcome = usecase
            .execute(&mut new_session, identity("p1", "Alice"))
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(outcome.superseded, Some(old_session.connection_id));
        let mut last = None;
        while let Some(frame) = old_rx.recv().await {
            last = Some(frame);
        }
        assert_eq!(last.as_deref(), Some(r#"{"type":"sessionSuperseded"}"#));
        assert_eq!(ctx.message_pusher.count_clients().await, 1);
    }

    #[tokio::test]
    async fn test_linger_policy_keeps_superseded_connection() {
        // テスト項目: linger ポリシーでは以前の接続は開いたまま
        // given (前提条件):
        let ctx = context(SupersedePolicy::Linger);
        let usecase = AuthenticateUseCase::new(ctx.clone());
        let (mut old_session, _old_rx) = connect(&ctx).await;
        let (mut new_session, _new_rx) = connect(&ctx).await;
        usecase
            .execute(&mut old_session, identity("p1", "Alice"))
            .await
            .unwrap();

        // when (操作):
        usecase
            .execute(&mut new_session, identity("p1", "Alice"))
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(ctx.message_pusher.count_clients().await, 2);
        assert_eq!(
            ctx.presence.connection_of(&new_session.user_id().unwrap().clone()).await,
            Some(new_session.connection_id)
        );
    }

    #[tokio::test]
    async fn test_superseded_disconnect_keeps_stored_online_flag() {
        // テスト項目: 別の接続で認証し直した後に古い接続が切断しても、ストアの online は true のまま
        // given (前提条件):
        let ctx = context(SupersedePolicy::Linger);
        let usecase = AuthenticateUseCase::new(ctx.clone());
        let disconnect = DisconnectParticipantUseCase::new(ctx.clone());
        let (mut old_session, _old_rx) = connect(&ctx).await;
        let (mut new_session, _new_rx) = connect(&ctx).await;
        usecase
            .execute(&mut old_session, identity("p1", "Alice"))
            .await
            .unwrap();
        let user = usecase
            .execute(&mut new_session, identity("p1", "Alice"))
            .await
            .unwrap()
            .user;

        // when (操作):
        let outcome = disconnect.execute(&mut old_session).await;

        // then (期待する結果):
        assert!(!outcome.went_offline);
        assert!(ctx.presence.is_online(&user.id).await);
        assert!(ctx.store.find_user(&user.id).await.unwrap().online);
    }
}
