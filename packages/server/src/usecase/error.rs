//! UseCase 層のエラー型
//!
//! どのエラーも要求した接続だけに返され、接続を切ったり他のセッションへ
//! 伝播したりはしません。

use thiserror::Error;

use crate::domain::{IdentityError, Notification, ValueObjectError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),
    #[error("authentication required")]
    AuthRequired,
    #[error("room join failed: {0}")]
    RoomJoinFailed(String),
    #[error("message '{0}' not found")]
    MessageNotFound(String),
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error("malformed request: {0}")]
    MalformedRequest(String),
}

impl ChatError {
    /// ワイヤ上の `error.kind`
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidIdentity(_) => "invalidIdentity",
            Self::AuthRequired => "authRequired",
            Self::RoomJoinFailed(_) => "roomJoinFailed",
            Self::MessageNotFound(_) => "messageNotFound",
            Self::SendFailed(_) => "sendFailed",
            Self::MalformedRequest(_) => "malformedRequest",
        }
    }

    /// 要求元へ返す通知
    ///
    /// `RoomJoinFailed` は専用のイベント、それ以外は `error` イベントになる。
    pub fn to_notification(&self) -> Notification {
        match self {
            Self::RoomJoinFailed(reason) => Notification::RoomJoinFailed {
                reason: reason.clone(),
            },
            other => Notification::Error {
                kind: other.kind(),
                message: other.to_string(),
            },
        }
    }
}

impl From<ValueObjectError> for ChatError {
    fn from(e: ValueObjectError) -> Self {
        Self::MalformedRequest(e.to_string())
    }
}

impl From<IdentityError> for ChatError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::InvalidIdentity(reason) => Self::InvalidIdentity(reason),
        }
    }
}
