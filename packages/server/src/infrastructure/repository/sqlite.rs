//! SQLite ChatStore 実装（永続ストア）
//!
//! sqlx の `SqlitePool` を使います。スキーマは接続時に作成します。
//! メッセージ ID は `INTEGER PRIMARY KEY AUTOINCREMENT` の値を文字列化したもの。

use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};

use crate::domain::{
    ChatMessage, ChatStore, DisplayName, MessageId, MessageText, NewMessage, ProviderMeta,
    Reactions, RoomName, StoreError, Timestamp, User, UserId,
};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        display_name TEXT NOT NULL,
        online INTEGER NOT NULL DEFAULT 0,
        last_seen_at INTEGER NOT NULL,
        email TEXT,
        avatar_url TEXT,
        provider TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_users_online ON users (online)",
    "CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        room TEXT NOT NULL,
        sender_id TEXT NOT NULL,
        sender_display_name TEXT NOT NULL,
        text TEXT NOT NULL,
        timestamp INTEGER NOT NULL,
        receiver_id TEXT,
        reactions TEXT NOT NULL DEFAULT '{}'
    )",
    "CREATE INDEX IF NOT EXISTS idx_messages_room_time ON messages (room, timestamp, id)",
];

type UserRow = (
    String,
    String,
    bool,
    i64,
    Option<String>,
    Option<String>,
    Option<String>,
);

type MessageRow = (
    i64,
    String,
    String,
    String,
    String,
    i64,
    Option<String>,
    String,
);

const USER_COLUMNS: &str = "id, display_name, online, last_seen_at, email, avatar_url, provider";
const MESSAGE_COLUMNS: &str =
    "id, room, sender_id, sender_display_name, text, timestamp, receiver_id, reactions";

/// SQLite ChatStore 実装
#[derive(Clone)]
pub struct SqliteChatStore {
    pool: SqlitePool,
}

impl SqliteChatStore {
    /// URL（例: `sqlite://tsudoi.db?mode=rwc`）へ接続し、スキーマを用意する
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(3))
            .connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        Self::from_pool(pool).await
    }

    /// テスト用のインメモリ SQLite（単一コネクションを保持し続ける）
    pub async fn connect_in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(map_sqlx_error)?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(map_sqlx_error)?;
        }
        Ok(Self { pool })
    }

    /// プールを閉じる（以降の操作は Unavailable になる）
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn map_sqlx_error(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::RowNotFound => StoreError::NotFound("row".to_string()),
        other => StoreError::Unavailable(other.to_string()),
    }
}

fn corrupt(e: impl std::fmt::Display) -> StoreError {
    StoreError::Unavailable(format!("corrupt row: {e}"))
}

fn user_from_row(row: UserRow) -> Result<User, StoreError> {
    let (id, display_name, online, last_seen_at, email, avatar_url, provider) = row;
    Ok(User {
        id: UserId::new(id).map_err(corrupt)?,
        display_name: DisplayName::new(display_name).map_err(corrupt)?,
        online,
        last_seen_at: Timestamp::new(last_seen_at),
        meta: ProviderMeta {
            email,
            avatar_url,
            provider,
        },
    })
}

fn message_from_row(row: MessageRow) -> Result<ChatMessage, StoreError> {
    let (id, room, sender_id, sender_display_name, text, timestamp, receiver_id, reactions) = row;
    let reactions: BTreeMap<String, Vec<String>> =
        serde_json::from_str(&reactions).map_err(corrupt)?;
    Ok(ChatMessage {
        id: MessageId::new(id.to_string()).map_err(corrupt)?,
        room: RoomName::new(room).map_err(corrupt)?,
        sender_id: UserId::new(sender_id).map_err(corrupt)?,
        sender_display_name: DisplayName::new(sender_display_name).map_err(corrupt)?,
        text: MessageText::new(text).map_err(corrupt)?,
        timestamp: Timestamp::new(timestamp),
        reactions: Reactions::from_map(reactions).map_err(corrupt)?,
        receiver_id: receiver_id.map(UserId::new).transpose().map_err(corrupt)?,
    })
}

fn row_id(id: &MessageId) -> Result<i64, StoreError> {
    id.as_str()
        .parse()
        .map_err(|_| StoreError::NotFound(format!("message '{id}'")))
}

#[async_trait]
impl ChatStore for SqliteChatStore {
    async fn upsert_user(
        &self,
        id: &UserId,
        display_name: &DisplayName,
        meta: &ProviderMeta,
        at: Timestamp,
    ) -> Result<User, StoreError> {
        sqlx::query(
            "INSERT INTO users (id, display_name, online, last_seen_at, email, avatar_url, provider)
             VALUES (?, ?, 0, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                display_name = excluded.display_name,
                email = COALESCE(excluded.email, users.email),
                avatar_url = COALESCE(excluded.avatar_url, users.avatar_url),
                provider = COALESCE(excluded.provider, users.provider)",
        )
        .bind(id.as_str())
        .bind(display_name.as_str())
        .bind(at.value())
        .bind(meta.email.as_deref())
        .bind(meta.avatar_url.as_deref())
        .bind(meta.provider.as_deref())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        self.find_user(id).await
    }

    async fn set_user_online(
        &self,
        id: &UserId,
        online: bool,
        at: Timestamp,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET online = ?, last_seen_at = ? WHERE id = ?")
            .bind(online)
            .bind(at.value())
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("user '{id}'")));
        }
        Ok(())
    }

    async fn find_user(&self, id: &UserId) -> Result<User, StoreError> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        match row {
            Some(row) => user_from_row(row),
            None => Err(StoreError::NotFound(format!("user '{id}'"))),
        }
    }

    async fn list_users(&self, online_only: bool) -> Result<Vec<User>, StoreError> {
        let sql = if online_only {
            format!("SELECT {USER_COLUMNS} FROM users WHERE online = 1 ORDER BY id")
        } else {
            format!("SELECT {USER_COLUMNS} FROM users ORDER BY id")
        };
        let rows: Vec<UserRow> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.into_iter().map(user_from_row).collect()
    }

    async fn append_message(&self, message: NewMessage) -> Result<ChatMessage, StoreError> {
        let result = sqlx::query(
            "INSERT INTO messages
                (room, sender_id, sender_display_name, text, timestamp, receiver_id, reactions)
             VALUES (?, ?, ?, ?, ?, ?, '{}')",
        )
        .bind(message.room.as_str())
        .bind(message.sender_id.as_str())
        .bind(message.sender_display_name.as_str())
        .bind(message.text.as_str())
        .bind(message.timestamp.value())
        .bind(message.receiver_id.as_ref().map(|r| r.as_str()))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let id = MessageId::new(result.last_insert_rowid().to_string()).map_err(corrupt)?;
        Ok(message.with_id(id))
    }

    async fn list_messages(
        &self,
        room: &RoomName,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM (
                SELECT {MESSAGE_COLUMNS} FROM messages
                WHERE room = ?
                ORDER BY timestamp DESC, id DESC
                LIMIT ?
             ) ORDER BY timestamp ASC, id ASC"
        ))
        .bind(room.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        rows.into_iter().map(message_from_row).collect()
    }

    async fn find_message(&self, id: &MessageId) -> Result<ChatMessage, StoreError> {
        let row: Option<MessageRow> =
            sqlx::query_as(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?"))
                .bind(row_id(id)?)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        match row {
            Some(row) => message_from_row(row),
            None => Err(StoreError::NotFound(format!("message '{id}'"))),
        }
    }

    async fn update_reactions(
        &self,
        id: &MessageId,
        reactions: &Reactions,
    ) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(&reactions.to_map()).map_err(corrupt)?;
        let result = sqlx::query("UPDATE messages SET reactions = ? WHERE id = ?")
            .bind(encoded)
            .bind(row_id(id)?)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("message '{id}'")));
        }
        Ok(())
    }

    async fn is_available(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}
