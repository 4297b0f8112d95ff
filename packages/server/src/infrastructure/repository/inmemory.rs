//! InMemory ChatStore 実装
//!
//! 永続ストアが使えないときのフォールバック。`ChatStore` と同じ契約を
//! プロセス内の HashMap で実装します。
//!
//! - ユーザー: ID をキーにした HashMap
//! - メッセージ: Room ごとのリングバッファ（既定 100 件、古いものから破棄）
//! - メッセージ ID: `local-<n>`（プロセス内で一意）

use std::{
    collections::{HashMap, VecDeque},
    sync::atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{
    ChatMessage, ChatStore, DisplayName, MessageId, NewMessage, ProviderMeta, Reactions, RoomName,
    StoreError, Timestamp, User, UserId,
};

/// Room ごとに保持するメッセージ数の既定値
pub const DEFAULT_ROOM_HISTORY_CAPACITY: usize = 100;

/// フォールバック時に採番するメッセージ ID の接頭辞
pub const LOCAL_MESSAGE_ID_PREFIX: &str = "local-";

static NEXT_LOCAL_MESSAGE_ID: AtomicU64 = AtomicU64::new(1);

/// インメモリ ChatStore 実装
pub struct InMemoryChatStore {
    users: Mutex<HashMap<UserId, User>>,
    rooms: Mutex<HashMap<RoomName, VecDeque<ChatMessage>>>,
    room_capacity: usize,
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_ROOM_HISTORY_CAPACITY)
    }

    /// Room ごとの保持件数を指定して作成
    pub fn with_capacity(room_capacity: usize) -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            rooms: Mutex::new(HashMap::new()),
            room_capacity: room_capacity.max(1),
        }
    }

    /// このストアが採番した ID かどうか
    pub fn owns_message_id(id: &MessageId) -> bool {
        id.as_str().starts_with(LOCAL_MESSAGE_ID_PREFIX)
    }

    fn next_message_id() -> Result<MessageId, StoreError> {
        let n = NEXT_LOCAL_MESSAGE_ID.fetch_add(1, Ordering::Relaxed);
        MessageId::new(format!("{LOCAL_MESSAGE_ID_PREFIX}{n}"))
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

impl Default for InMemoryChatStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatStore for InMemoryChatStore {
    async fn upsert_user(
        &self,
        id: &UserId,
        display_name: &DisplayName,
        meta: &ProviderMeta,
        at: Timestamp,
    ) -> Result<User, StoreError> {
        let mut users = self.users.lock().await;
        let user = users
            .entry(id.clone())
            .and_modify(|existing| {
                existing.display_name = display_name.clone();
                existing.meta.email = meta.email.clone().or(existing.meta.email.take());
                existing.meta.avatar_url =
                    meta.avatar_url.clone().or(existing.meta.avatar_url.take());
                existing.meta.provider = meta.provider.clone().or(existing.meta.provider.take());
            })
            .or_insert_with(|| User::new(id.clone(), display_name.clone(), meta.clone(), at));
        Ok(user.clone())
    }

    async fn set_user_online(
        &self,
        id: &UserId,
        online: bool,
        at: Timestamp,
    ) -> Result<(), StoreError> {
        let mut users = self.users.lock().await;
        let user = users
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("user '{id}'")))?;
        user.mark(online, at);
        Ok(())
    }

    async fn find_user(&self, id: &UserId) -> Result<User, StoreError> {
        let users = self.users.lock().await;
        users
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("user '{id}'")))
    }

    async fn list_users(&self, online_only: bool) -> Result<Vec<User>, StoreError> {
        let users = self.users.lock().await;
        let mut listed: Vec<User> = users
            .values()
            .filter(|u| !online_only || u.online)
            .cloned()
            .collect();
        listed.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(listed)
    }

    async fn append_message(&self, message: NewMessage) -> Result<ChatMessage, StoreError> {
        let stored = message.with_id(Self::next_message_id()?);

        let mut rooms = self.rooms.lock().await;
        let history = rooms.entry(stored.room.clone()).or_default();
        while history.len() >= self.room_capacity {
            history.pop_front();
        }
        history.push_back(stored.clone());
        Ok(stored)
    }

    async fn list_messages(
        &self,
        room: &RoomName,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let rooms = self.rooms.lock().await;
        let Some(history) = rooms.get(room) else {
            return Ok(Vec::new());
        };
        // 挿入順 = 時刻順（同時刻は挿入順）
        let skip = history.len().saturating_sub(limit);
        Ok(history.iter().skip(skip).cloned().collect())
    }

    async fn find_message(&self, id: &MessageId) -> Result<ChatMessage, StoreError> {
        let rooms = self.rooms.lock().await;
        rooms
            .values()
            .flat_map(|history| history.iter())
            .find(|m| &m.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("message '{id}'")))
    }

    async fn update_reactions(
        &self,
        id: &MessageId,
        reactions: &Reactions,
    ) -> Result<(), StoreError> {
        let mut rooms = self.rooms.lock().await;
        let message = rooms
            .values_mut()
            .flat_map(|history| history.iter_mut())
            .find(|m| &m.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("message '{id}'")))?;
        message.reactions = reactions.clone();
        Ok(())
    }

    async fn is_available(&self) -> bool {
        true
    }
}
