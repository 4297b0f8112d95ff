//! ドメイン層
//!
//! チャット・プレゼンスのドメインモデルと、ドメイン層が必要とする
//! インターフェース（Repository / MessagePusher）を定義します。

pub mod entity;
pub mod error;
pub mod identity;
pub mod message_pusher;
pub mod notification;
pub mod repository;
pub mod value_object;

pub use entity::{
    ChatMessage, Member, NewMessage, ProviderMeta, Reactions, ResolvedIdentity, Session,
    SessionState, User,
};
pub use error::{IdentityError, MessagePushError, StoreError, ValueObjectError};
pub use identity::{ExternalIdentity, IdentityResolver};
pub use message_pusher::{MessagePusher, PusherChannel};
pub use notification::Notification;
pub use repository::ChatStore;
pub use value_object::{
    ChannelId, ConnectionId, DisplayName, Emoji, MessageId, MessageText, RoomKind, RoomName,
    Timestamp, UserId,
};
