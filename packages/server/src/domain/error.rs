//! ドメイン層のエラー型

use thiserror::Error;

/// 値オブジェクト生成時のバリデーションエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueObjectError {
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("{field} exceeds {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("room name '{0}' uses a reserved prefix")]
    ReservedPrefix(String),
}

/// 永続ストアのエラー
///
/// `Unavailable` はフォールバックで回復され、クライアントには届きません。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("not found: {0}")]
    NotFound(String),
}

/// MessagePusher のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessagePushError {
    #[error("client '{0}' not found")]
    ClientNotFound(String),
    #[error("push failed: {0}")]
    PushFailed(String),
    #[error("outbound queue of '{0}' overflowed; client disconnected")]
    QueueOverflow(String),
}

/// 外部 ID の解決エラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),
}
