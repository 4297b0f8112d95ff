//! Tsudoi chat and presence server.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin tsudoi-server
//! cargo run --bin tsudoi-server -- --host 0.0.0.0 --port 3000 --database-url "sqlite://tsudoi.db?mode=rwc"
//! ```

use std::sync::Arc;

use clap::Parser;
use tsudoi_server::{
    config::ServerConfig,
    domain::ChatStore,
    infrastructure::{
        message_pusher::WebSocketMessagePusher,
        repository::{FallbackChatStore, InMemoryChatStore, SqliteChatStore},
    },
    ui::{AppState, Server},
    usecase::ChatContext,
};
use tsudoi_shared::{logger::setup_logger, time::SystemClock};

#[tokio::main]
async fn main() {
    let config = ServerConfig::parse();

    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), &config.log_level);

    // Initialize dependencies in order:
    // 1. Store (durable + in-memory fallback)
    // 2. MessagePusher
    // 3. UseCases (AppState)
    // 4. Server

    // 1. Create Store
    let durable: Option<Arc<dyn ChatStore>> = match config.database_url.as_deref() {
        Some(url) => match SqliteChatStore::connect(url).await {
            Ok(store) => {
                tracing::info!("Connected to durable store");
                Some(Arc::new(store))
            }
            Err(e) => {
                tracing::warn!("Durable store unavailable, using in-memory store: {}", e);
                None
            }
        },
        None => {
            tracing::info!("No database configured, using in-memory store");
            None
        }
    };
    let store = Arc::new(FallbackChatStore::new(
        durable,
        InMemoryChatStore::new(),
        config.retry_policy(),
        config.probe_interval(),
    ));

    // 2. Create MessagePusher (WebSocket implementation)
    let message_pusher = Arc::new(WebSocketMessagePusher::new());

    // 3. Create UseCases
    let context = ChatContext::new(
        store,
        message_pusher,
        Arc::new(SystemClock),
        config.chat_settings(),
    );
    let issuer = config.call_credential_issuer();
    if !issuer.is_configured() {
        tracing::info!("Call credentials disabled (no secret configured)");
    }
    let state = AppState::new(context, issuer, config.outbound_queue);

    // 4. Create and run the server
    let server = Server::new(state);
    if let Err(e) = server.run(config.host, config.port).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
