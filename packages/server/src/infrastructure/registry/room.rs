//! Room Membership Manager
//!
//! Room ごとの参加者（チャット Room のみ。ボイスは `VoiceRoster`）を管理します。
//!
//! ## 不変条件
//!
//! - 1 つの接続が同時に参加できるチャット Room は 1 つだけ
//! - 同じ接続が同じ Room に 2 回入ることはない
//! - 参加者リストと「接続 → 現在の Room」は同じロックで更新する
//! - 開いている接続だけが参加できる。`close()` の後は参加を受け付けない
//!
//! ## Room ごとの直列化
//!
//! `sequencer()` が返すロックを保持している間に「永続化 → ブロードキャスト」を
//! 行うことで、Room 内の配信順序を処理順と一致させます。
//! ロックの中身 `RoomClock` は Room 内のタイムスタンプを単調非減少に保ちます。

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use tokio::sync::Mutex;

use crate::domain::{ConnectionId, Member, RoomKind, RoomName, Timestamp};

/// Room 内の時刻（単調非減少）
#[derive(Debug, Default)]
pub struct RoomClock {
    last: Option<Timestamp>,
}

impl RoomClock {
    /// `now` と直前の時刻の大きい方を返し、記録する
    pub fn next(&mut self, now: Timestamp) -> Timestamp {
        let next = match self.last {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last = Some(next);
        next
    }
}

/// Room からの退出結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomDeparture {
    pub room: RoomName,
    pub member: Member,
    /// 退出後に残っている参加者
    pub remaining: Vec<Member>,
}

/// Room への参加結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    /// 参加後の参加者（参加順）
    pub members: Vec<Member>,
    /// 切り替えで抜けた以前の Room
    pub left: Option<RoomDeparture>,
    /// すでに同じ Room にいた場合 `true`
    pub already_member: bool,
}

#[derive(Default)]
struct Rooms {
    members: HashMap<RoomName, Vec<Member>>,
    current: HashMap<ConnectionId, RoomName>,
    open: HashSet<ConnectionId>,
}

impl Rooms {
    fn remove(&mut self, connection_id: &ConnectionId) -> Option<RoomDeparture> {
        let room = self.current.remove(connection_id)?;
        let members = self.members.get_mut(&room)?;
        let position = members
            .iter()
            .position(|m| m.connection_id == *connection_id)?;
        let member = members.remove(position);
        let remaining = members.clone();
        if remaining.is_empty() {
            self.members.remove(&room);
        }
        Some(RoomDeparture {
            room,
            member,
            remaining,
        })
    }
}

#[derive(Default)]
pub struct RoomRegistry {
    rooms: Mutex<Rooms>,
    sequencers: Mutex<HashMap<RoomName, Arc<Mutex<RoomClock>>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Room ごとの直列化ロック（なければ作成）
    pub async fn sequencer(&self, room: &RoomName) -> Arc<Mutex<RoomClock>> {
        let mut sequencers = self.sequencers.lock().await;
        sequencers.entry(room.clone()).or_default().clone()
    }

    /// 接続を参加可能にする
    pub async fn open(&self, connection_id: ConnectionId) {
        self.rooms.lock().await.open.insert(connection_id);
    }

    /// 接続を閉じ、参加中の Room から抜ける
    ///
    /// 以後この接続の `join()` は `None` を返す。
    pub async fn close(&self, connection_id: &ConnectionId) -> Option<RoomDeparture> {
        let mut rooms = self.rooms.lock().await;
        rooms.open.remove(connection_id);
        rooms.remove(connection_id)
    }

    /// Room に参加する（別の Room にいた場合はそこから抜ける）
    ///
    /// 開いていない接続は参加できず `None` を返す。
    pub async fn join(&self, member: Member, room: &RoomName) -> Option<JoinOutcome> {
        let mut rooms = self.rooms.lock().await;
        if !rooms.open.contains(&member.connection_id) {
            return None;
        }

        if rooms.current.get(&member.connection_id) == Some(room) {
            let members = rooms.members.get(room).cloned().unwrap_or_default();
            return Some(JoinOutcome {
                members,
                left: None,
                already_member: true,
            });
        }

        let left = rooms.remove(&member.connection_id);
        rooms.current.insert(member.connection_id, room.clone());
        let members = rooms.members.entry(room.clone()).or_default();
        members.push(member);

        Some(JoinOutcome {
            members: members.clone(),
            left,
            already_member: false,
        })
    }

    /// 現在の Room から抜ける
    ///
    /// `room` を指定した場合、現在の Room と一致するときだけ抜ける。
    pub async fn leave(
        &self,
        connection_id: &ConnectionId,
        room: Option<&RoomName>,
    ) -> Option<RoomDeparture> {
        let mut rooms = self.rooms.lock().await;
        if let Some(room) = room
            && rooms.current.get(connection_id) != Some(room)
        {
            return None;
        }
        rooms.remove(connection_id)
    }

    pub async fn current_room(&self, connection_id: &ConnectionId) -> Option<RoomName> {
        self.rooms.lock().await.current.get(connection_id).cloned()
    }

    pub async fn members(&self, room: &RoomName) -> Vec<Member> {
        let rooms = self.rooms.lock().await;
        rooms.members.get(room).cloned().unwrap_or_default()
    }

    pub async fn member_connections(&self, room: &RoomName) -> Vec<ConnectionId> {
        let rooms = self.rooms.lock().await;
        rooms
            .members
            .get(room)
            .map(|members| members.iter().map(|m| m.connection_id).collect())
            .unwrap_or_default()
    }

    /// 参加者のいる公開 Room の一覧（名前順）
    pub async fn public_rooms(&self) -> Vec<(RoomName, Vec<Member>)> {
        let rooms = self.rooms.lock().await;
        let mut listed: Vec<(RoomName, Vec<Member>)> = rooms
            .members
            .iter()
            .filter(|(room, _)| room.kind() == RoomKind::Public)
            .map(|(room, members)| (room.clone(), members.clone()))
            .collect();
        listed.sort_by(|a, b| a.0.cmp(&b.0));
        listed
    }
}
