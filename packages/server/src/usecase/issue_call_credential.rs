//! UseCase: 通話用クレデンシャルの発行
//!
//! Room や Presence の状態には触れない。

use std::sync::Arc;

use tsudoi_shared::time::Clock;

use crate::infrastructure::credential::{CallCredential, CallCredentialIssuer, CredentialError};

pub struct IssueCallCredentialUseCase {
    issuer: CallCredentialIssuer,
    clock: Arc<dyn Clock>,
}

impl IssueCallCredentialUseCase {
    pub fn new(issuer: CallCredentialIssuer, clock: Arc<dyn Clock>) -> Self {
        Self { issuer, clock }
    }

    pub fn execute(
        &self,
        channel_name: &str,
        user_id: &str,
    ) -> Result<CallCredential, CredentialError> {
        let now_secs = self.clock.now_millis() / 1000;
        let credential = self.issuer.issue(channel_name, user_id, now_secs)?;
        tracing::debug!(
            "Issued call credential for '{}' in '{}'",
            credential.user_id,
            credential.channel_name
        );
        Ok(credential)
    }
}
