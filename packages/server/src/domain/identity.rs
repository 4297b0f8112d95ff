//! Identity Resolver
//!
//! 外部 ID プロバイダで検証済みの ID 情報を、内部で使う安定したユーザー ID と
//! 表示名に変換します。副作用はありません。
//!
//! プロバイダ ID は URL エンコードされた形（`auth0%7C123`）で届くことがあるため、
//! ここでデコード済みの 1 つの正規形にそろえます。下流では正規形のみを比較します。

use super::{
    entity::{ProviderMeta, ResolvedIdentity},
    error::IdentityError,
    value_object::{DisplayName, UserId},
};

const MAX_DISPLAY_NAME_CHARS: usize = 64;

/// 外部 ID プロバイダから受け取った検証済みの ID 情報
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalIdentity {
    pub provider_id: String,
    pub display_name_hint: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub provider: Option<String>,
}

/// 外部 ID → 内部ユーザー ID の解決
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityResolver;

impl IdentityResolver {
    pub fn new() -> Self {
        Self
    }

    /// プロバイダ ID を正規形にそろえる
    pub fn canonicalize(&self, provider_id: &str) -> String {
        let decoded = urlencoding::decode_binary(provider_id.trim().as_bytes());
        String::from_utf8_lossy(&decoded).trim().to_string()
    }

    /// 外部 ID を解決する
    ///
    /// 表示名のヒントが空ならメールアドレスのローカル部、それも無ければ
    /// ユーザー ID を表示名に使います。
    ///
    /// # Errors
    ///
    /// プロバイダ ID が空の場合 `IdentityError::InvalidIdentity`
    pub fn resolve(&self, identity: &ExternalIdentity) -> Result<ResolvedIdentity, IdentityError> {
        let canonical = self.canonicalize(&identity.provider_id);
        let user_id = UserId::new(canonical)
            .map_err(|e| IdentityError::InvalidIdentity(format!("provider id: {e}")))?;

        let email = normalize_optional(identity.email.as_deref());
        let display_name =
            self.display_name_for(&identity.display_name_hint, email.as_deref(), &user_id)?;

        Ok(ResolvedIdentity {
            user_id,
            display_name,
            meta: ProviderMeta {
                email,
                avatar_url: normalize_optional(identity.avatar_url.as_deref()),
                provider: normalize_optional(identity.provider.as_deref()),
            },
        })
    }

    fn display_name_for(
        &self,
        hint: &str,
        email: Option<&str>,
        user_id: &UserId,
    ) -> Result<DisplayName, IdentityError> {
        let candidate = [
            Some(hint.trim()),
            email.and_then(|e| e.split('@').next()).map(str::trim),
            Some(user_id.as_str()),
        ]
        .into_iter()
        .flatten()
        .find(|c| !c.is_empty())
        .unwrap_or_default();

        let truncated: String = candidate.chars().take(MAX_DISPLAY_NAME_CHARS).collect();
        DisplayName::new(truncated)
            .map_err(|e| IdentityError::InvalidIdentity(format!("display name: {e}")))
    }
}

fn normalize_optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
