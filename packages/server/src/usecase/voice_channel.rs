//! UseCase: ボイスチャンネルへの参加・退出
//!
//! 名簿の更新は Room 単位ではなく全接続へ配信します。

use crate::domain::{ChannelId, Notification, Session};

use super::{context::ChatContext, error::ChatError};

pub struct VoiceChannelUseCase {
    context: ChatContext,
}

impl VoiceChannelUseCase {
    pub fn new(context: ChatContext) -> Self {
        Self { context }
    }

    pub async fn join(&self, session: &Session, channel_id: String) -> Result<(), ChatError> {
        let member = session.member().cloned().ok_or(ChatError::AuthRequired)?;
        let channel_id = ChannelId::new(channel_id)?;
        let connection_id = member.connection_id;

        let participants = self.context.voice.join(&channel_id, member).await;
        tracing::info!(
            "Connection '{}' joined voice channel '{}'",
            connection_id,
            channel_id
        );
        self.context
            .broadcast_all(Notification::VoiceRoster {
                channel_id,
                participants,
            })
            .await;
        Ok(())
    }

    pub async fn leave(&self, session: &Session, channel_id: String) -> Result<(), ChatError> {
        let member = session.member().ok_or(ChatError::AuthRequired)?;
        let channel_id = ChannelId::new(channel_id)?;

        match self
            .context
            .voice
            .leave(&channel_id, &member.connection_id)
            .await
        {
            Some(participants) => {
                self.context
                    .broadcast_all(Notification::VoiceRoster {
                        channel_id,
                        participants,
                    })
                    .await;
            }
            None => {
                tracing::debug!(
                    "Connection '{}' is not in voice channel '{}'",
                    member.connection_id,
                    channel_id
                );
            }
        }
        Ok(())
    }

    /// 現在の名簿を要求元へ返す
    pub async fn participants(&self, session: &Session, channel_id: String) -> Result<(), ChatError> {
        let member = session.member().ok_or(ChatError::AuthRequired)?;
        let channel_id = ChannelId::new(channel_id)?;
        let participants = self.context.voice.participants(&channel_id).await;
        self.context
            .reply(
                &member.connection_id,
                Notification::VoiceRoster {
                    channel_id,
                    participants,
                },
            )
            .await;
        Ok(())
    }

    /// 切断時: 参加中の全チャンネルから抜け、名簿を配信する
    pub async fn leave_all(&self, session: &Session) {
        for (channel_id, participants) in self.context.voice.leave_all(&session.connection_id).await
        {
            self.context
                .broadcast_all(Notification::VoiceRoster {
                    channel_id,
                    participants,
                })
                .await;
        }
    }
}
