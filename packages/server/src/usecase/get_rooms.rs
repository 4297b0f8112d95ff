//! UseCase: 参加者のいる公開 Room の一覧

use crate::domain::{Member, RoomName};

use super::context::ChatContext;

pub struct GetRoomsUseCase {
    context: ChatContext,
}

impl GetRoomsUseCase {
    pub fn new(context: ChatContext) -> Self {
        Self { context }
    }

    pub async fn execute(&self) -> Vec<(RoomName, Vec<Member>)> {
        self.context.rooms.public_rooms().await
    }
}
