//! UseCase: ヘルスチェック

use std::sync::Arc;

use crate::domain::ChatStore;

/// 現在どちらのストアでリクエストを処理しているか
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreHealth {
    Durable,
    Fallback,
}

impl StoreHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Durable => "durable",
            Self::Fallback => "fallback",
        }
    }
}

pub struct HealthCheckUseCase {
    store: Arc<dyn ChatStore>,
}

impl HealthCheckUseCase {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self { store }
    }

    pub async fn execute(&self) -> StoreHealth {
        if self.store.is_available().await {
            StoreHealth::Durable
        } else {
            StoreHealth::Fallback
        }
    }
}
