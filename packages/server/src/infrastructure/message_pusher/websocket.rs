//! WebSocket を使った MessagePusher 実装
//!
//! ## 責務
//!
//! - 接続ごとの有界キュー（`mpsc::Sender<String>`）を管理
//! - `Notification` を JSON（`ServerEvent`）に変換して送信
//!
//! ## 設計ノート
//!
//! WebSocket の生成は UI 層（`ui/handler/websocket.rs`）で行われます。
//! この実装は生成されたキューの送信側を受け取り、メッセージ送信に使用します。
//!
//! キューが満杯の受信者は切断します（送信側を破棄して登録を解除する）。
//! 遅い受信者が他の受信者への配信を止めることはありません。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc::error::TrySendError};

use crate::{
    domain::{ConnectionId, MessagePushError, MessagePusher, Notification, PusherChannel},
    infrastructure::dto::websocket::ServerEvent,
};

/// WebSocket を使った MessagePusher 実装
///
/// ```ignore
/// let pusher = WebSocketMessagePusher::new();
/// let (tx, rx) = tokio::sync::mpsc::channel(256);
/// pusher.register_client(connection_id, tx).await;
/// pusher.push_to(&connection_id, &Notification::SessionSuperseded).await?;
/// ```
#[derive(Default)]
pub struct WebSocketMessagePusher {
    clients: Mutex<HashMap<ConnectionId, PusherChannel>>,
}

impl WebSocketMessagePusher {
    pub fn new() -> Self {
        Self::default()
    }

    fn encode(notification: &Notification) -> Result<String, MessagePushError> {
        serde_json::to_string(&ServerEvent::from(notification))
            .map_err(|e| MessagePushError::PushFailed(e.to_string()))
    }

    /// 1 件送信する。満杯・切断済みのキューは呼び出し側で登録解除する。
    fn deliver(
        connection_id: &ConnectionId,
        sender: &PusherChannel,
        payload: String,
    ) -> Result<(), MessagePushError> {
        match sender.try_send(payload) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                Err(MessagePushError::QueueOverflow(connection_id.to_string()))
            }
            Err(TrySendError::Closed(_)) => Err(MessagePushError::PushFailed(format!(
                "connection '{connection_id}' is closed"
            ))),
        }
    }
}

#[async_trait]
impl MessagePusher for WebSocketMessagePusher {
    async fn register_client(&self, connection_id: ConnectionId, sender: PusherChannel) {
        let mut clients = self.clients.lock().await;
        clients.insert(connection_id, sender);
        tracing::debug!("Connection '{}' registered to MessagePusher", connection_id);
    }

    async fn unregister_client(&self, connection_id: &ConnectionId) {
        let mut clients = self.clients.lock().await;
        if clients.remove(connection_id).is_some() {
            tracing::debug!("Connection '{}' unregistered from MessagePusher", connection_id);
        }
    }

    async fn push_to(
        &self,
        connection_id: &ConnectionId,
        notification: &Notification,
    ) -> Result<(), MessagePushError> {
        let payload = Self::encode(notification)?;
        let mut clients = self.clients.lock().await;

        let Some(sender) = clients.get(connection_id) else {
            return Err(MessagePushError::ClientNotFound(connection_id.to_string()));
        };
        match Self::deliver(connection_id, sender, payload) {
            Ok(()) => {
                tracing::debug!("Pushed message to connection '{}'", connection_id);
                Ok(())
            }
            Err(e) => {
                clients.remove(connection_id);
                tracing::warn!("Dropping connection '{}': {}", connection_id, e);
                Err(e)
            }
        }
    }

    async fn broadcast(
        &self,
        targets: &[ConnectionId],
        notification: &Notification,
    ) -> Result<(), MessagePushError> {
        let payload = Self::encode(notification)?;
        let mut clients = self.clients.lock().await;
        let mut dropped = Vec::new();

        for target in targets {
            match clients.get(target) {
                // ブロードキャストでは一部の送信失敗を許容
                Some(sender) => {
                    if let Err(e) = Self::deliver(target, sender, payload.clone()) {
                        tracing::warn!("Dropping connection '{}': {}", target, e);
                        dropped.push(*target);
                    }
                }
                None => {
                    tracing::debug!("Connection '{}' not found during broadcast, skipping", target);
                }
            }
        }

        for target in dropped {
            clients.remove(&target);
        }
        Ok(())
    }

    async fn broadcast_all(&self, notification: &Notification) -> Result<(), MessagePushError> {
        let targets: Vec<ConnectionId> = self.clients.lock().await.keys().copied().collect();
        self.broadcast(&targets, notification).await
    }

    async fn count_clients(&self) -> usize {
        self.clients.lock().await.len()
    }
}
