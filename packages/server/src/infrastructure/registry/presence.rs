//! Presence Registry
//!
//! オンライン中のユーザーと、そのユーザーの「現在の」接続を管理します。
//! 1 ユーザーにつき有効な接続は 1 つだけで、再認証すると後から来た接続で
//! 置き換わります（前の接続は閉じずに紐付けだけ外す）。

use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::domain::{ConnectionId, DisplayName, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceEntry {
    pub connection_id: ConnectionId,
    pub display_name: DisplayName,
}

#[derive(Default)]
pub struct PresenceRegistry {
    entries: Mutex<HashMap<UserId, PresenceEntry>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// ユーザーをオンラインにし、接続を紐付ける
    ///
    /// # Returns
    ///
    /// 置き換えられた以前の接続（同じ接続での再実行や新規の場合は `None`）
    pub async fn set_online(
        &self,
        user_id: &UserId,
        connection_id: ConnectionId,
        display_name: &DisplayName,
    ) -> Option<ConnectionId> {
        let mut entries = self.entries.lock().await;
        let previous = entries.insert(
            user_id.clone(),
            PresenceEntry {
                connection_id,
                display_name: display_name.clone(),
            },
        );
        previous
            .map(|entry| entry.connection_id)
            .filter(|previous| *previous != connection_id)
    }

    /// 指定の接続がまだ有効な接続であればオフラインにする
    ///
    /// # Returns
    ///
    /// オフラインにした場合 `true`（別の接続に置き換わっていた場合は `false`）
    pub async fn set_offline(&self, user_id: &UserId, connection_id: ConnectionId) -> bool {
        let mut entries = self.entries.lock().await;
        match entries.get(user_id) {
            Some(entry) if entry.connection_id == connection_id => {
                entries.remove(user_id);
                true
            }
            _ => false,
        }
    }

    pub async fn connection_of(&self, user_id: &UserId) -> Option<ConnectionId> {
        let entries = self.entries.lock().await;
        entries.get(user_id).map(|e| e.connection_id)
    }

    pub async fn is_online(&self, user_id: &UserId) -> bool {
        self.entries.lock().await.contains_key(user_id)
    }

    /// オンライン中のユーザー（ID 順）
    pub async fn online_users(&self) -> Vec<(UserId, PresenceEntry)> {
        let entries = self.entries.lock().await;
        let mut users: Vec<(UserId, PresenceEntry)> = entries
            .iter()
            .map(|(id, entry)| (id.clone(), entry.clone()))
            .collect();
        users.sort_by(|a, b| a.0.cmp(&b.0));
        users
    }

    #[cfg(test)]
    pub async fn count(&self) -> usize {
        self.entries.lock().await.len()
    }
}
