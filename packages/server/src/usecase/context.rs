//! UseCase が共有する依存関係と設定

use std::sync::Arc;

use tsudoi_shared::time::Clock;

use crate::{
    domain::{
        ChatStore, ConnectionId, MessagePusher, Notification, RoomName, Timestamp, User,
    },
    infrastructure::registry::{PresenceRegistry, RoomDeparture, RoomRegistry, VoiceRoster},
};

/// 既定の履歴取得件数
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// 同じユーザーが別の接続で認証したときの、以前の接続の扱い
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum SupersedePolicy {
    /// 紐付けだけ外し、接続は閉じない
    #[default]
    Linger,
    /// `sessionSuperseded` を送って接続を閉じる
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatSettings {
    /// Room 参加時・履歴取得時の最大件数
    pub history_limit: usize,
    pub on_superseded: SupersedePolicy,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            on_superseded: SupersedePolicy::default(),
        }
    }
}

/// UseCase の依存関係
#[derive(Clone)]
pub struct ChatContext {
    pub store: Arc<dyn ChatStore>,
    pub message_pusher: Arc<dyn MessagePusher>,
    pub presence: Arc<PresenceRegistry>,
    pub rooms: Arc<RoomRegistry>,
    pub voice: Arc<VoiceRoster>,
    pub clock: Arc<dyn Clock>,
    pub settings: ChatSettings,
}

impl ChatContext {
    pub fn new(
        store: Arc<dyn ChatStore>,
        message_pusher: Arc<dyn MessagePusher>,
        clock: Arc<dyn Clock>,
        settings: ChatSettings,
    ) -> Self {
        Self {
            store,
            message_pusher,
            presence: Arc::new(PresenceRegistry::new()),
            rooms: Arc::new(RoomRegistry::new()),
            voice: Arc::new(VoiceRoster::new()),
            clock,
            settings,
        }
    }

    pub fn now(&self) -> Timestamp {
        Timestamp::new(self.clock.now_millis())
    }

    /// 要求元の接続へ送る（送れなくても処理は続ける）
    pub async fn reply(&self, connection_id: &ConnectionId, notification: Notification) {
        if let Err(e) = self.message_pusher.push_to(connection_id, &notification).await {
            tracing::debug!("Failed to reply to '{}': {}", connection_id, e);
        }
    }

    pub async fn broadcast(&self, targets: &[ConnectionId], notification: Notification) {
        if targets.is_empty() {
            return;
        }
        if let Err(e) = self.message_pusher.broadcast(targets, &notification).await {
            tracing::warn!("Failed to broadcast: {}", e);
        }
    }

    pub async fn broadcast_all(&self, notification: Notification) {
        if let Err(e) = self.message_pusher.broadcast_all(&notification).await {
            tracing::warn!("Failed to broadcast to all connections: {}", e);
        }
    }

    /// ユーザー一覧（オンライン状態は Presence Registry を正とする）
    ///
    /// ストアから読めないユーザーも、オンラインなら Presence の情報で補う。
    pub async fn users(&self, online_only: bool) -> Vec<User> {
        let mut users = match self.store.list_users(false).await {
            Ok(users) => users,
            Err(e) => {
                tracing::warn!("Failed to list users: {}", e);
                Vec::new()
            }
        };
        let online = self.presence.online_users().await;

        for user in users.iter_mut() {
            user.online = online.iter().any(|(id, _)| *id == user.id);
        }
        let now = self.now();
        for (id, entry) in online {
            if !users.iter().any(|u| u.id == id) {
                let mut user = User::new(id, entry.display_name, Default::default(), now);
                user.online = true;
                users.push(user);
            }
        }

        users.retain(|u| !online_only || u.online);
        users.sort_by(|a, b| a.id.cmp(&b.id));
        users
    }

    /// 全接続へユーザー一覧を配信する
    pub async fn broadcast_presence(&self) {
        let users = self.users(false).await;
        self.broadcast_all(Notification::PresenceSnapshot { users })
            .await;
    }

    /// Room から抜けたことを残りの参加者へ知らせる
    ///
    /// `notice` が `true` なら `userLeft` も送る（明示的な退出・切断時）。
    pub async fn announce_departure(&self, departure: &RoomDeparture, notice: bool) {
        let targets: Vec<ConnectionId> =
            departure.remaining.iter().map(|m| m.connection_id).collect();
        self.broadcast(
            &targets,
            Notification::RoomMembers {
                room: departure.room.clone(),
                members: departure.remaining.clone(),
            },
        )
        .await;
        if notice {
            self.broadcast(
                &targets,
                Notification::UserLeft {
                    room: departure.room.clone(),
                    user_id: departure.member.user_id.clone(),
                    display_name: departure.member.display_name.clone(),
                    at: self.now(),
                },
            )
            .await;
        }
    }

    /// 現在の Room から抜ける（Room の直列化ロックを取ってから）
    pub async fn leave_current_room(
        &self,
        connection_id: &ConnectionId,
        notice: bool,
    ) -> Option<RoomDeparture> {
        let room: RoomName = self.rooms.current_room(connection_id).await?;
        let sequencer = self.rooms.sequencer(&room).await;
        let _order = sequencer.lock().await;

        let departure = self.rooms.leave(connection_id, Some(&room)).await?;
        self.announce_departure(&departure, notice).await;
        Some(departure)
    }

    /// 接続を閉じて Room から抜け、残りの参加者に `userLeft` を知らせる
    ///
    /// 閉じた後は他の接続の操作でもこの接続を Room に入れられない。
    pub async fn close_connection(&self, connection_id: &ConnectionId) -> Option<RoomDeparture> {
        let sequencer = match self.rooms.current_room(connection_id).await {
            Some(room) => Some(self.rooms.sequencer(&room).await),
            None => None,
        };
        let _order = match &sequencer {
            Some(sequencer) => Some(sequencer.lock().await),
            None => None,
        };

        let departure = self.rooms.close(connection_id).await?;
        self.announce_departure(&departure, true).await;
        Some(departure)
    }
}
