//! プロセス内で共有する接続状態（Presence / Room / ボイスチャンネル）
//!
//! いずれも内部のマップを公開せず、操作単位のメソッドだけを提供します。

pub mod presence;
pub mod room;
pub mod voice;

pub use presence::{PresenceEntry, PresenceRegistry};
pub use room::{JoinOutcome, RoomClock, RoomDeparture, RoomRegistry};
pub use voice::VoiceRoster;
