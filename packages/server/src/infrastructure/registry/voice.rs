//! ボイスチャンネルの参加者名簿
//!
//! チャット Room と同じ形（参加・退出・一覧）ですが、履歴は持ちません。
//! チャット Room とは独立しているため、1 つの接続が複数のチャンネルに
//! 同時に参加できます。

use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::domain::{ChannelId, ConnectionId, Member, RoomName};

struct Channel {
    id: ChannelId,
    participants: Vec<Member>,
}

#[derive(Default)]
pub struct VoiceRoster {
    channels: Mutex<HashMap<RoomName, Channel>>,
}

impl VoiceRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// チャンネルに参加し、参加後の名簿を返す（参加済みなら何もしない）
    pub async fn join(&self, channel_id: &ChannelId, member: Member) -> Vec<Member> {
        let mut channels = self.channels.lock().await;
        let channel = channels
            .entry(RoomName::voice(channel_id))
            .or_insert_with(|| Channel {
                id: channel_id.clone(),
                participants: Vec::new(),
            });
        if !channel
            .participants
            .iter()
            .any(|m| m.connection_id == member.connection_id)
        {
            channel.participants.push(member);
        }
        channel.participants.clone()
    }

    /// チャンネルから抜け、退出後の名簿を返す（参加していなければ `None`）
    pub async fn leave(
        &self,
        channel_id: &ChannelId,
        connection_id: &ConnectionId,
    ) -> Option<Vec<Member>> {
        let mut channels = self.channels.lock().await;
        let key = RoomName::voice(channel_id);
        let channel = channels.get_mut(&key)?;
        let position = channel
            .participants
            .iter()
            .position(|m| m.connection_id == *connection_id)?;
        channel.participants.remove(position);
        let remaining = channel.participants.clone();
        if remaining.is_empty() {
            channels.remove(&key);
        }
        Some(remaining)
    }

    /// 接続が参加している全てのチャンネルから抜ける（切断時）
    pub async fn leave_all(&self, connection_id: &ConnectionId) -> Vec<(ChannelId, Vec<Member>)> {
        let mut channels = self.channels.lock().await;
        let mut left = Vec::new();
        for channel in channels.values_mut() {
            if let Some(position) = channel
                .participants
                .iter()
                .position(|m| m.connection_id == *connection_id)
            {
                channel.participants.remove(position);
                left.push((channel.id.clone(), channel.participants.clone()));
            }
        }
        channels.retain(|_, channel| !channel.participants.is_empty());
        left.sort_by(|a, b| a.0.cmp(&b.0));
        left
    }

    pub async fn participants(&self, channel_id: &ChannelId) -> Vec<Member> {
        let channels = self.channels.lock().await;
        channels
            .get(&RoomName::voice(channel_id))
            .map(|c| c.participants.clone())
            .unwrap_or_default()
    }
}
