//! UseCase: ユーザー一覧・取得・登録（HTTP API 向け）

use crate::domain::{ExternalIdentity, IdentityResolver, StoreError, User, UserId};

use super::{context::ChatContext, error::ChatError};

pub struct GetUsersUseCase {
    context: ChatContext,
    resolver: IdentityResolver,
}

impl GetUsersUseCase {
    pub fn new(context: ChatContext) -> Self {
        Self {
            context,
            resolver: IdentityResolver::new(),
        }
    }

    pub async fn execute(&self, online_only: bool) -> Vec<User> {
        self.context.users(online_only).await
    }

    /// ID でユーザーを取得する（オンライン状態は Presence Registry を正とする）
    pub async fn find(&self, id: String) -> Option<User> {
        let ctx = &self.context;
        let id = UserId::new(id).ok()?;
        let online = ctx.presence.online_users().await;
        let entry = online.into_iter().find(|(user_id, _)| *user_id == id);

        match ctx.store.find_user(&id).await {
            Ok(mut user) => {
                user.online = entry.is_some();
                Some(user)
            }
            Err(e) => {
                if let StoreError::Unavailable(reason) = &e {
                    tracing::warn!("Failed to look up user '{}': {}", id, reason);
                }
                entry.map(|(id, entry)| {
                    let mut user = User::new(id, entry.display_name, Default::default(), ctx.now());
                    user.online = true;
                    user
                })
            }
        }
    }

    /// プロバイダ ID からユーザーを作成または更新する
    ///
    /// # Errors
    ///
    /// * `ChatError::InvalidIdentity` - プロバイダ ID が空
    /// * `ChatError::SendFailed` - ストアへの書き込みに失敗
    pub async fn register(&self, identity: ExternalIdentity) -> Result<User, ChatError> {
        let ctx = &self.context;
        let resolved = self.resolver.resolve(&identity)?;
        let mut user = ctx
            .store
            .upsert_user(
                &resolved.user_id,
                &resolved.display_name,
                &resolved.meta,
                ctx.now(),
            )
            .await
            .map_err(|e| ChatError::SendFailed(e.to_string()))?;
        user.online = ctx.presence.is_online(&user.id).await;
        tracing::info!("Registered user '{}'", user.id);
        Ok(user)
    }
}
