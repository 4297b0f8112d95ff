//! 永続ストア + インメモリのフォールバック構成
//!
//! - 永続ストアへの呼び出しは `RetryPolicy` でリトライする
//! - リトライしても `Unavailable` ならフォールバックへ切り替え、警告ログを出す
//! - 切り替え後は `probe_interval` に 1 回だけ疎通確認し、戻れば永続ストアに復帰する
//! - 疎通確認は別タスクで行い、その間の呼び出しは待たずにインメモリで処理する
//! - ユーザーは常にインメモリにも書き込む（障害中も在席情報を失わない）
//! - 障害中に書いたメッセージは永続ストアへ書き戻さない。プロセスが生きている間は
//!   履歴取得時にインメモリ側と合わせて返す
//!
//! `NotFound` はフォールバックの対象ではなく、そのまま呼び出し元へ返す。

use std::{
    collections::BTreeMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;

use super::{InMemoryChatStore, RetryPolicy};
use crate::domain::{
    ChatMessage, ChatStore, DisplayName, MessageId, NewMessage, ProviderMeta, Reactions, RoomName,
    StoreError, Timestamp, User, UserId,
};

/// 既定の疎通確認間隔
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(10);

pub struct FallbackChatStore {
    durable: Option<Arc<dyn ChatStore>>,
    memory: InMemoryChatStore,
    retry: RetryPolicy,
    available: Arc<AtomicBool>,
    probing: Arc<AtomicBool>,
    probe_interval: Duration,
    last_probe: Mutex<Option<Instant>>,
}

impl FallbackChatStore {
    pub fn new(
        durable: Option<Arc<dyn ChatStore>>,
        memory: InMemoryChatStore,
        retry: RetryPolicy,
        probe_interval: Duration,
    ) -> Self {
        let available = durable.is_some();
        Self {
            durable,
            memory,
            retry,
            available: Arc::new(AtomicBool::new(available)),
            probing: Arc::new(AtomicBool::new(false)),
            probe_interval,
            last_probe: Mutex::new(None),
        }
    }

    /// 永続ストアなし（インメモリのみ）
    pub fn memory_only(memory: InMemoryChatStore) -> Self {
        Self::new(None, memory, RetryPolicy::default(), DEFAULT_PROBE_INTERVAL)
    }

    pub fn has_durable(&self) -> bool {
        self.durable.is_some()
    }

    /// 永続ストアを使ってよいなら返す
    ///
    /// 停止中は `None` を返し、間隔が空いていれば疎通確認を別タスクで始める。
    async fn durable_ready(&self) -> Option<&Arc<dyn ChatStore>> {
        let durable = self.durable.as_ref()?;
        if self.available.load(Ordering::SeqCst) {
            return Some(durable);
        }
        self.spawn_probe(durable);
        None
    }

    fn spawn_probe(&self, durable: &Arc<dyn ChatStore>) {
        {
            let Ok(mut last_probe) = self.last_probe.lock() else {
                return;
            };
            if let Some(at) = *last_probe
                && at.elapsed() < self.probe_interval
            {
                return;
            }
            if self.probing.swap(true, Ordering::SeqCst) {
                return;
            }
            *last_probe = Some(Instant::now());
        }

        let durable = durable.clone();
        let available = self.available.clone();
        let probing = self.probing.clone();
        tokio::spawn(async move {
            if durable.is_available().await {
                available.store(true, Ordering::SeqCst);
                tracing::info!("Durable store is reachable again, leaving fallback mode");
            } else {
                tracing::debug!("Durable store probe failed, staying in fallback mode");
            }
            probing.store(false, Ordering::SeqCst);
        });
    }

    fn mark_unavailable(&self, operation: &str, reason: &str) {
        if self.available.swap(false, Ordering::SeqCst) {
            tracing::warn!(
                "Durable store unavailable during '{}': {}; switching to in-memory fallback",
                operation,
                reason
            );
        }
    }
}

#[async_trait]
impl ChatStore for FallbackChatStore {
    async fn upsert_user(
        &self,
        id: &UserId,
        display_name: &DisplayName,
        meta: &ProviderMeta,
        at: Timestamp,
    ) -> Result<User, StoreError> {
        let mirrored = self.memory.upsert_user(id, display_name, meta, at).await?;
        if let Some(durable) = self.durable_ready().await {
            match self
                .retry
                .run("upsert_user", || durable.upsert_user(id, display_name, meta, at))
                .await
            {
                Ok(user) => return Ok(user),
                Err(StoreError::Unavailable(reason)) => {
                    self.mark_unavailable("upsert_user", &reason)
                }
                Err(e) => return Err(e),
            }
        }
        Ok(mirrored)
    }

    async fn set_user_online(
        &self,
        id: &UserId,
        online: bool,
        at: Timestamp,
    ) -> Result<(), StoreError> {
        let mirrored = self.memory.set_user_online(id, online, at).await;
        if let Some(durable) = self.durable_ready().await {
            match self
                .retry
                .run("set_user_online", || durable.set_user_online(id, online, at))
                .await
            {
                Ok(()) => return Ok(()),
                Err(StoreError::Unavailable(reason)) => {
                    self.mark_unavailable("set_user_online", &reason)
                }
                // 障害中に作られたユーザーは永続ストアに無いことがある
                Err(e) if mirrored.is_err() => return Err(e),
                Err(_) => {}
            }
        }
        mirrored
    }

    async fn find_user(&self, id: &UserId) -> Result<User, StoreError> {
        if let Some(durable) = self.durable_ready().await {
            match self.retry.run("find_user", || durable.find_user(id)).await {
                Ok(user) => return Ok(user),
                Err(StoreError::Unavailable(reason)) => self.mark_unavailable("find_user", &reason),
                Err(StoreError::NotFound(_)) => {}
            }
        }
        self.memory.find_user(id).await
    }

    async fn list_users(&self, online_only: bool) -> Result<Vec<User>, StoreError> {
        let memory_users = self.memory.list_users(online_only).await?;
        let Some(durable) = self.durable_ready().await else {
            return Ok(memory_users);
        };

        match self
            .retry
            .run("list_users", || durable.list_users(online_only))
            .await
        {
            Ok(durable_users) => {
                let mut merged: BTreeMap<UserId, User> = memory_users
                    .into_iter()
                    .map(|u| (u.id.clone(), u))
                    .collect();
                for user in durable_users {
                    merged.insert(user.id.clone(), user);
                }
                Ok(merged.into_values().collect())
            }
            Err(StoreError::Unavailable(reason)) => {
                self.mark_unavailable("list_users", &reason);
                Ok(memory_users)
            }
            Err(e) => Err(e),
        }
    }

    async fn append_message(&self, message: NewMessage) -> Result<ChatMessage, StoreError> {
        if let Some(durable) = self.durable_ready().await {
            match self
                .retry
                .run("append_message", || durable.append_message(message.clone()))
                .await
            {
                Ok(stored) => return Ok(stored),
                Err(StoreError::Unavailable(reason)) => {
                    self.mark_unavailable("append_message", &reason)
                }
                Err(e) => return Err(e),
            }
        }
        self.memory.append_message(message).await
    }

    async fn list_messages(
        &self,
        room: &RoomName,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let local = self.memory.list_messages(room, limit).await?;
        let Some(durable) = self.durable_ready().await else {
            return Ok(local);
        };

        match self
            .retry
            .run("list_messages", || durable.list_messages(room, limit))
            .await
        {
            Ok(mut messages) => {
                if local.is_empty() {
                    return Ok(messages);
                }
                messages.extend(local);
                // 安定ソートなので同時刻は永続ストア側が先
                messages.sort_by_key(|m| m.timestamp);
                let skip = messages.len().saturating_sub(limit);
                Ok(messages.into_iter().skip(skip).collect())
            }
            Err(StoreError::Unavailable(reason)) => {
                self.mark_unavailable("list_messages", &reason);
                Ok(local)
            }
            Err(e) => Err(e),
        }
    }

    async fn find_message(&self, id: &MessageId) -> Result<ChatMessage, StoreError> {
        if InMemoryChatStore::owns_message_id(id) {
            return self.memory.find_message(id).await;
        }
        if let Some(durable) = self.durable_ready().await {
            match self.retry.run("find_message", || durable.find_message(id)).await {
                Err(StoreError::Unavailable(reason)) => {
                    self.mark_unavailable("find_message", &reason)
                }
                result => return result,
            }
        }
        self.memory.find_message(id).await
    }

    async fn update_reactions(
        &self,
        id: &MessageId,
        reactions: &Reactions,
    ) -> Result<(), StoreError> {
        if InMemoryChatStore::owns_message_id(id) {
            return self.memory.update_reactions(id, reactions).await;
        }
        if let Some(durable) = self.durable_ready().await {
            match self
                .retry
                .run("update_reactions", || durable.update_reactions(id, reactions))
                .await
            {
                Err(StoreError::Unavailable(reason)) => {
                    self.mark_unavailable("update_reactions", &reason)
                }
                result => return result,
            }
        }
        self.memory.update_reactions(id, reactions).await
    }

    /// 永続ストアで動作中なら `true`（フォールバック中・永続ストアなしは `false`）
    async fn is_available(&self) -> bool {
        self.durable_ready().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MessageText, repository::MockChatStore};

    fn user_id(id: &str) -> UserId {
        UserId::new(id.to_string()).unwrap()
    }

    fn name(value: &str) -> DisplayName {
        DisplayName::new(value.to_string()).unwrap()
    }

    fn room(value: &str) -> RoomName {
        RoomName::new(value.to_string()).unwrap()
    }

    fn new_message(text: &str, timestamp: i64) -> NewMessage {
        NewMessage {
            room: room("general"),
            sender_id: user_id("alice"),
            sender_display_name: name("Alice"),
            text: MessageText::new(text.to_string()).unwrap(),
            timestamp: Timestamp::new(timestamp),
            receiver_id: None,
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1))
    }

    fn store_with(mock: MockChatStore, probe_interval: Duration) -> FallbackChatStore {
        FallbackChatStore::new(
            Some(Arc::new(mock)),
            InMemoryChatStore::new(),
            fast_retry(),
            probe_interval,
        )
    }

    /// 疎通確認を始め、永続ストアへ戻るまで待つ
    async fn wait_for_recovery(store: &FallbackChatStore) {
        assert!(!store.is_available().await);
        tokio::time::timeout(Duration::from_secs(1), async {
            while !store.available.load(Ordering::SeqCst) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("durable store should be restored");
    }

    #[tokio::test]
    async fn test_append_falls_back_after_retries() {
        // テスト項目: 永続ストアがリトライ上限まで失敗すると、インメモリへ書き込まれる
        // given (前提条件):
        let mut mock = MockChatStore::new();
        mock.expect_append_message()
            .times(3)
            .returning(|_| Err(StoreError::Unavailable("connection refused".to_string())));
        mock.expect_is_available().returning(|| false);
        let store = store_with(mock, Duration::from_secs(60));

        // when (操作):
        let stored = store.append_message(new_message("hi", 1)).await.unwrap();

        // then (期待する結果):
        assert!(InMemoryChatStore::owns_message_id(&stored.id));
        assert!(!store.is_available().await);
        let history = store.list_messages(&room("general"), 10).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_not_found_is_not_a_fallback_trigger() {
        // テスト項目: NotFound はリトライもフォールバックもせずにそのまま返る
        // given (前提条件):
        let mut mock = MockChatStore::new();
        mock.expect_find_message()
            .times(1)
            .returning(|id| Err(StoreError::NotFound(id.to_string())));
        let store = store_with(mock, Duration::from_secs(60));

        // when (操作):
        let result = store
            .find_message(&MessageId::new("42".to_string()).unwrap())
            .await;

        // then (期待する結果):
        assert!(matches!(result, Err(StoreError::NotFound(_))));
        assert!(store.available.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_probe_restores_durable_store() {
        // テスト項目: フォールバック中でも疎通確認に成功すれば永続ストアへ戻る
        // given (前提条件):
        let mut mock = MockChatStore::new();
        let mut seq = mockall::Sequence::new();
        mock.expect_append_message()
            .times(3)
            .in_sequence(&mut seq)
            .returning(|_| Err(StoreError::Unavailable("down".to_string())));
        mock.expect_is_available()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| true);
        mock.expect_append_message()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|m| Ok(m.with_id(MessageId::new("7".to_string()).unwrap())));
        let store = store_with(mock, Duration::ZERO);
        store.append_message(new_message("during outage", 1)).await.unwrap();
        wait_for_recovery(&store).await;

        // when (操作):
        let stored = store.append_message(new_message("recovered", 2)).await.unwrap();

        // then (期待する結果):
        assert_eq!(stored.id.as_str(), "7");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slow_probe_does_not_block_callers() {
        // テスト項目: フォールバック中の疎通確認が遅くても、ストアの呼び出しは待たされずインメモリから返る
        // given (前提条件):
        let mut mock = MockChatStore::new();
        mock.expect_append_message()
            .returning(|_| Err(StoreError::Unavailable("down".to_string())));
        mock.expect_is_available().returning(|| {
            std::thread::sleep(Duration::from_millis(500));
            false
        });
        let store = store_with(mock, Duration::ZERO);
        store.append_message(new_message("during outage", 1)).await.unwrap();

        // when (操作):
        let started = Instant::now();
        let mut lengths = Vec::new();
        for _ in 0..3 {
            let history = store.list_messages(&room("general"), 10).await.unwrap();
            lengths.push(history.len());
        }
        let elapsed = started.elapsed();

        // then (期待する結果):
        assert_eq!(lengths, vec![1, 1, 1]);
        assert!(elapsed < Duration::from_millis(250), "took {elapsed:?}");
    }

    #[tokio::test]
    async fn test_local_message_id_never_reaches_durable_store() {
        // テスト項目: `local-` で始まる ID はインメモリ側だけで処理される
        // given (前提条件):
        let mut mock = MockChatStore::new();
        mock.expect_append_message()
            .returning(|_| Err(StoreError::Unavailable("down".to_string())));
        mock.expect_is_available().returning(|| false);
        let store = store_with(mock, Duration::from_secs(60));
        let stored = store.append_message(new_message("hi", 1)).await.unwrap();

        // when (操作):
        let found = store.find_message(&stored.id).await.unwrap();

        // then (期待する結果):
        assert_eq!(found.text.as_str(), "hi");
    }

    #[tokio::test]
    async fn test_user_mirror_answers_when_durable_misses() {
        // テスト項目: 永続ストアに無いユーザーもインメモリのミラーから見つかる
        // given (前提条件):
        let mut mock = MockChatStore::new();
        mock.expect_upsert_user()
            .times(3)
            .returning(|_, _, _, _| Err(StoreError::Unavailable("down".to_string())));
        mock.expect_find_user()
            .returning(|id| Err(StoreError::NotFound(id.to_string())));
        mock.expect_is_available().returning(|| true);
        let store = store_with(mock, Duration::ZERO);
        store
            .upsert_user(
                &user_id("p1"),
                &name("Alice"),
                &ProviderMeta::default(),
                Timestamp::new(1),
            )
            .await
            .unwrap();

        // when (操作):
        let found = store.find_user(&user_id("p1")).await.unwrap();

        // then (期待する結果):
        assert_eq!(found.display_name.as_str(), "Alice");
    }

    #[tokio::test]
    async fn test_history_merges_outage_messages() {
        // テスト項目: 障害中にインメモリへ書いたメッセージも、復帰後の履歴に時刻順で含まれる
        // given (前提条件):
        let mut mock = MockChatStore::new();
        let mut seq = mockall::Sequence::new();
        mock.expect_append_message()
            .times(3)
            .in_sequence(&mut seq)
            .returning(|_| Err(StoreError::Unavailable("down".to_string())));
        mock.expect_is_available()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| true);
        mock.expect_list_messages()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                let first = new_message("before", 1).with_id(MessageId::new("1".to_string()).unwrap());
                let last = new_message("after", 3).with_id(MessageId::new("2".to_string()).unwrap());
                Ok(vec![first, last])
            });
        let store = store_with(mock, Duration::ZERO);
        store.append_message(new_message("during", 2)).await.unwrap();
        wait_for_recovery(&store).await;

        // when (操作):
        let history = store.list_messages(&room("general"), 10).await.unwrap();

        // then (期待する結果):
        let texts: Vec<&str> = history.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["before", "during", "after"]);
    }

    #[tokio::test]
    async fn test_memory_only_store() {
        // テスト項目: 永続ストアなしの構成ではインメモリだけで動作し、常に非永続扱い
        // given (前提条件):
        let store = FallbackChatStore::memory_only(InMemoryChatStore::new());

        // when (操作):
        let stored = store.append_message(new_message("hi", 1)).await.unwrap();

        // then (期待する結果):
        assert!(!store.has_durable());
        assert!(!store.is_available().await);
        assert!(InMemoryChatStore::owns_message_id(&stored.id));
    }
}
