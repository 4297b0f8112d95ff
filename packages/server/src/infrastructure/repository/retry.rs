//! 永続ストア呼び出しのリトライポリシー
//!
//! 回数上限つきの指数バックオフ。`FallbackChatStore` の境界でのみ適用し、
//! 呼び出し元ごとにリトライを書かない。

use std::{future::Future, time::Duration};

use crate::domain::StoreError;

/// リトライポリシー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 最大試行回数（1 ならリトライなし）
    pub max_attempts: u32,
    /// 初回リトライまでの待ち時間（以降は 2 倍ずつ）
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// `attempt` 回目（0 始まり）の失敗後に待つ時間
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.min(16)))
    }

    /// 操作を実行し、`StoreError::Unavailable` の間だけリトライする
    ///
    /// `NotFound` などそれ以外のエラーは即座に返す。
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Err(StoreError::Unavailable(reason)) if attempt + 1 < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    tracing::debug!(
                        "Store operation '{}' failed (attempt {}/{}): {}; retrying in {:?}",
                        operation,
                        attempt + 1,
                        self.max_attempts,
                        reason,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}
