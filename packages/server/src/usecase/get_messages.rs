//! UseCase: 公開 Room のメッセージ履歴取得（HTTP API 向け）
//!
//! HTTP には認証がないため、プライベート Room とボイス Room の履歴は返さない。

use crate::domain::{ChatMessage, RoomKind, RoomName};

use super::{context::ChatContext, error::ChatError, join_room::MAX_HISTORY_LIMIT};

pub struct GetMessagesUseCase {
    context: ChatContext,
}

impl GetMessagesUseCase {
    pub fn new(context: ChatContext) -> Self {
        Self { context }
    }

    pub async fn execute(
        &self,
        room: String,
        limit: Option<usize>,
    ) -> Result<(RoomName, Vec<ChatMessage>), ChatError> {
        let room = RoomName::new(room)?;
        if room.kind() != RoomKind::Public {
            return Err(ChatError::MalformedRequest(format!(
                "'{room}' is not a public room"
            )));
        }
        let limit = limit
            .unwrap_or(self.context.settings.history_limit)
            .clamp(1, MAX_HISTORY_LIMIT);

        let messages = self
            .context
            .store
            .list_messages(&room, limit)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to list messages of '{}': {}", room, e);
                Vec::new()
            });
        Ok((room, messages))
    }
}
