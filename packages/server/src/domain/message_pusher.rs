//! MessagePusher trait 定義
//!
//! サーバーからクライアントへの通知（push）を抽象化します。
//! 宛先は接続ハンドル（`ConnectionId`）単位です。
//!
//! ## 実装
//!
//! - `WebSocketMessagePusher`: 接続ごとの有界キューへ送る実装

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{ConnectionId, MessagePushError, Notification};

/// クライアントへの送信チャンネル（有界キュー）
pub type PusherChannel = mpsc::Sender<String>;

/// メッセージ通知の抽象化
#[async_trait]
pub trait MessagePusher: Send + Sync {
    /// 接続を登録
    async fn register_client(&self, connection_id: ConnectionId, sender: PusherChannel);

    /// 接続の登録を解除（送信キューが閉じ、その接続は終了する）
    async fn unregister_client(&self, connection_id: &ConnectionId);

    /// 特定の接続へ送信
    async fn push_to(
        &self,
        connection_id: &ConnectionId,
        notification: &Notification,
    ) -> Result<(), MessagePushError>;

    /// 複数の接続へ送信（一部の失敗は許容する）
    async fn broadcast(
        &self,
        targets: &[ConnectionId],
        notification: &Notification,
    ) -> Result<(), MessagePushError>;

    /// 全ての接続へ送信
    async fn broadcast_all(&self, notification: &Notification) -> Result<(), MessagePushError>;

    /// 登録中の接続数
    async fn count_clients(&self) -> usize;
}
