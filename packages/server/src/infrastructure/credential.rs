//! 通話用クレデンシャルの発行
//!
//! チャンネル名とユーザー ID に紐付いた、有効期限つきの署名済みトークンを
//! 発行します。状態を持たず、Room や Presence とは関係しません。
//!
//! トークン形式: `base64url(payload) "." base64url(HMAC-SHA256(payload))`
//! payload: `appId:channelName:userId:expiresAt`（expiresAt は Unix 秒）

use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// 既定の有効期間（1 時間）
pub const DEFAULT_CALL_CREDENTIAL_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("call credentials are not configured")]
    NotConfigured,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid token")]
    InvalidToken,
    #[error("token expired")]
    Expired,
}

/// 発行したクレデンシャル
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallCredential {
    pub token: String,
    pub app_id: String,
    pub channel_name: String,
    pub user_id: String,
    /// Unix 秒
    pub expires_at: i64,
}

#[derive(Clone)]
pub struct CallCredentialIssuer {
    app_id: String,
    secret: Option<Vec<u8>>,
    ttl: Duration,
}

impl std::fmt::Debug for CallCredentialIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallCredentialIssuer")
            .field("app_id", &self.app_id)
            .field("configured", &self.secret.is_some())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl CallCredentialIssuer {
    pub fn new(app_id: impl Into<String>, secret: Option<String>, ttl: Duration) -> Self {
        Self {
            app_id: app_id.into(),
            secret: secret.filter(|s| !s.is_empty()).map(String::into_bytes),
            ttl,
        }
    }

    /// 署名用の鍵がなく、発行できない構成
    pub fn disabled() -> Self {
        Self::new("", None, DEFAULT_CALL_CREDENTIAL_TTL)
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    fn mac(&self) -> Result<HmacSha256, CredentialError> {
        let secret = self.secret.as_ref().ok_or(CredentialError::NotConfigured)?;
        HmacSha256::new_from_slice(secret).map_err(|_| CredentialError::NotConfigured)
    }

    fn payload(&self, channel_name: &str, user_id: &str, expires_at: i64) -> String {
        format!("{}:{}:{}:{}", self.app_id, channel_name, user_id, expires_at)
    }

    /// クレデンシャルを発行する
    ///
    /// # Errors
    ///
    /// - 鍵が未設定なら `CredentialError::NotConfigured`
    /// - チャンネル名・ユーザー ID が空なら `CredentialError::InvalidInput`
    pub fn issue(
        &self,
        channel_name: &str,
        user_id: &str,
        now_secs: i64,
    ) -> Result<CallCredential, CredentialError> {
        let mut mac = self.mac()?;
        let channel_name = channel_name.trim();
        let user_id = user_id.trim();
        if channel_name.is_empty() {
            return Err(CredentialError::InvalidInput(
                "channel name is required".to_string(),
            ));
        }
        if user_id.is_empty() {
            return Err(CredentialError::InvalidInput("user id is required".to_string()));
        }

        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let expires_at = now_secs.saturating_add(ttl);
        let payload = self.payload(channel_name, user_id, expires_at);
        mac.update(payload.as_bytes());
        let signature = mac.finalize().into_bytes();

        Ok(CallCredential {
            token: format!(
                "{}.{}",
                URL_SAFE_NO_PAD.encode(payload.as_bytes()),
                URL_SAFE_NO_PAD.encode(signature)
            ),
            app_id: self.app_id.clone(),
            channel_name: channel_name.to_string(),
            user_id: user_id.to_string(),
            expires_at,
        })
    }

    /// トークンが指定のチャンネル・ユーザー向けに発行され、期限内であることを確かめる
    pub fn verify(
        &self,
        token: &str,
        channel_name: &str,
        user_id: &str,
        now_secs: i64,
    ) -> Result<(), CredentialError> {
        let mut mac = self.mac()?;
        let (payload_b64, signature_b64) = token
            .split_once('.')
            .ok_or(CredentialError::InvalidToken)?;
        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64.as_bytes())
            .map_err(|_| CredentialError::InvalidToken)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64.as_bytes())
            .map_err(|_| CredentialError::InvalidToken)?;

        mac.update(&payload);
        mac.verify_slice(&signature)
            .map_err(|_| CredentialError::InvalidToken)?;

        let payload = String::from_utf8(payload).map_err(|_| CredentialError::InvalidToken)?;
        let expires_at: i64 = payload
            .rsplit_once(':')
            .and_then(|(_, expires_at)| expires_at.parse().ok())
            .ok_or(CredentialError::InvalidToken)?;
        if payload != self.payload(channel_name.trim(), user_id.trim(), expires_at) {
            return Err(CredentialError::InvalidToken);
        }
        if expires_at < now_secs {
            return Err(CredentialError::Expired);
        }
        Ok(())
    }
}
