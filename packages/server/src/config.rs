//! Server configuration (command line flags, each also readable from the environment).

use std::time::Duration;

use clap::Parser;

use crate::{
    infrastructure::{credential::CallCredentialIssuer, repository::RetryPolicy},
    ui::DEFAULT_OUTBOUND_QUEUE,
    usecase::{ChatSettings, DEFAULT_HISTORY_LIMIT, SupersedePolicy},
};

#[derive(Parser, Debug, Clone)]
#[command(name = "tsudoi-server")]
#[command(about = "Real-time chat and presence server", long_about = None)]
pub struct ServerConfig {
    /// Host address to bind the server to
    #[arg(short = 'H', long, env = "TSUDOI_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, env = "TSUDOI_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Durable store (e.g. `sqlite://tsudoi.db?mode=rwc`); in-memory only when absent
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Messages returned on room join and by default for history requests
    #[arg(long, env = "TSUDOI_HISTORY_LIMIT", default_value_t = DEFAULT_HISTORY_LIMIT)]
    pub history_limit: usize,

    /// Outbound queue length per connection; a full queue disconnects the client
    #[arg(long, env = "TSUDOI_OUTBOUND_QUEUE", default_value_t = DEFAULT_OUTBOUND_QUEUE)]
    pub outbound_queue: usize,

    /// Attempts per durable store operation before falling back
    #[arg(long, env = "TSUDOI_STORE_RETRY_ATTEMPTS", default_value_t = 3)]
    pub store_retry_attempts: u32,

    /// Base delay of the exponential backoff between attempts
    #[arg(long, env = "TSUDOI_STORE_RETRY_BASE_MS", default_value_t = 50)]
    pub store_retry_base_ms: u64,

    /// Minimum interval between availability probes while the durable store is down
    #[arg(long, env = "TSUDOI_STORE_PROBE_INTERVAL_SECS", default_value_t = 10)]
    pub store_probe_interval_secs: u64,

    /// What happens to the earlier connection when a user authenticates again
    #[arg(long, env = "TSUDOI_ON_SUPERSEDED", value_enum, default_value_t = SupersedePolicy::Linger)]
    pub on_superseded: SupersedePolicy,

    /// Signing secret for call credentials; call tokens are disabled when absent
    #[arg(long, env = "CALL_CREDENTIAL_SECRET", hide_env_values = true)]
    pub call_secret: Option<String>,

    /// Application id embedded in call credentials
    #[arg(long, env = "CALL_APP_ID", default_value = "tsudoi")]
    pub call_app_id: String,

    /// Lifetime of call credentials
    #[arg(long, env = "CALL_TTL_SECS", default_value_t = 3600)]
    pub call_ttl_secs: u64,

    /// Default log level (overridden by RUST_LOG)
    #[arg(long, env = "TSUDOI_LOG_LEVEL", default_value = "debug")]
    pub log_level: String,
}

impl ServerConfig {
    pub fn chat_settings(&self) -> ChatSettings {
        ChatSettings {
            history_limit: self.history_limit.max(1),
            on_superseded: self.on_superseded,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.store_retry_attempts,
            Duration::from_millis(self.store_retry_base_ms),
        )
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.store_probe_interval_secs)
    }

    pub fn call_credential_issuer(&self) -> CallCredentialIssuer {
        CallCredentialIssuer::new(
            self.call_app_id.clone(),
            self.call_secret.clone(),
            Duration::from_secs(self.call_ttl_secs),
        )
    }
}
