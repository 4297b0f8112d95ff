//! ChatStore の実装群

pub mod fallback;
pub mod inmemory;
pub mod retry;
pub mod sqlite;

pub use fallback::{DEFAULT_PROBE_INTERVAL, FallbackChatStore};
pub use inmemory::{DEFAULT_ROOM_HISTORY_CAPACITY, InMemoryChatStore};
pub use retry::RetryPolicy;
pub use sqlite::SqliteChatStore;
