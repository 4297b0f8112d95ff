//! Repository trait 定義
//!
//! ドメイン層が必要とする永続ストアのインターフェースを定義します。
//! 具体的な実装は Infrastructure 層が提供します（依存性の逆転）。
//!
//! - `SqliteChatStore`: 永続ストア
//! - `InMemoryChatStore`: フォールバック用のインメモリ実装
//! - `FallbackChatStore`: 上 2 つを束ね、リトライとフォールバックを行うアダプタ
//!
//! どの操作も `StoreError::Unavailable` で失敗し得ます。

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use super::{
    ChatMessage, DisplayName, MessageId, NewMessage, ProviderMeta, Reactions, RoomName,
    StoreError, Timestamp, User, UserId,
};

/// チャットの永続ストア
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// ユーザーを作成または更新する（オンライン状態は変更しない）
    async fn upsert_user(
        &self,
        id: &UserId,
        display_name: &DisplayName,
        meta: &ProviderMeta,
        at: Timestamp,
    ) -> Result<User, StoreError>;

    /// オンライン状態と最終確認時刻を更新する
    async fn set_user_online(
        &self,
        id: &UserId,
        online: bool,
        at: Timestamp,
    ) -> Result<(), StoreError>;

    /// ユーザーを取得（存在しなければ `StoreError::NotFound`）
    async fn find_user(&self, id: &UserId) -> Result<User, StoreError>;

    /// ユーザー一覧を取得
    async fn list_users(&self, online_only: bool) -> Result<Vec<User>, StoreError>;

    /// メッセージを追加し、ID を採番したメッセージを返す
    async fn append_message(&self, message: NewMessage) -> Result<ChatMessage, StoreError>;

    /// Room のメッセージ履歴を時刻の昇順で取得（新しい方から最大 `limit` 件）
    async fn list_messages(
        &self,
        room: &RoomName,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, StoreError>;

    /// メッセージを ID で取得
    async fn find_message(&self, id: &MessageId) -> Result<ChatMessage, StoreError>;

    /// リアクション集合を置き換える
    async fn update_reactions(
        &self,
        id: &MessageId,
        reactions: &Reactions,
    ) -> Result<(), StoreError>;

    /// ストアが利用可能か（ヘルスチェック）
    async fn is_available(&self) -> bool;
}
