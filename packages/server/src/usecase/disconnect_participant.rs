//! UseCase: 参加者切断処理
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - DisconnectParticipantUseCase::execute() メソッド
//! - 切断時の後始末（Room・ボイスチャンネルからの退出、オフライン化、一覧の配信）
//!
//! ### なぜこのテストが必要か
//! - 後始末が漏れると Presence や Room の参加者が残り続ける
//! - 置き換えられた古い接続の切断で、新しい接続がオフラインにされてはならない
//! - ストアが失敗しても残りの後始末は必ず実行される
//!
//! ### どのような状況を想定しているか
//! - 正常系：Room 参加中のユーザーの切断
//! - エッジケース：未認証の接続の切断、2 回目の切断、置き換えられた接続の切断
//! - 異常系：ストアが利用できない状態での切断

use std::{future::Future, panic::AssertUnwindSafe};

use futures_util::FutureExt;

use crate::domain::{ConnectionId, RoomName, Session, SessionState, UserId};

use super::{context::ChatContext, voice_channel::VoiceChannelUseCase};

/// 切断処理の結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisconnectOutcome {
    /// 抜けたチャット Room
    pub left_room: Option<RoomName>,
    /// このセッションの切断でユーザーがオフラインになったか
    pub went_offline: bool,
}

/// 参加者切断のユースケース
pub struct DisconnectParticipantUseCase {
    context: ChatContext,
    voice: VoiceChannelUseCase,
}

impl DisconnectParticipantUseCase {
    pub fn new(context: ChatContext) -> Self {
        let voice = VoiceChannelUseCase::new(context.clone());
        Self { context, voice }
    }

    /// 参加者切断を実行
    ///
    /// 各ステップは個別に隔離され、どれかが失敗（panic を含む）しても
    /// 残りのステップは実行される。2 回目以降の呼び出しは何もしない。
    pub async fn execute(&self, session: &mut Session) -> DisconnectOutcome {
        let mut outcome = DisconnectOutcome::default();
        if session.state(false) == SessionState::Disconnected {
            return outcome;
        }
        let ctx = &self.context;
        let connection_id = session.connection_id;

        // 1. 送信キューを閉じる
        isolated("unregister", &connection_id, async {
            ctx.message_pusher.unregister_client(&connection_id).await;
        })
        .await;

        // 2. ボイスチャンネルから抜ける
        isolated("voice", &connection_id, self.voice.leave_all(session)).await;

        // 3. 接続を閉じてチャット Room から抜け、残りの参加者に知らせる
        if let Some(Some(departure)) = isolated("room", &connection_id, async {
            ctx.close_connection(&connection_id).await
        })
        .await
        {
            outcome.left_room = Some(departure.room);
        }

        // 4. オフライン化（この接続がまだ Presence 上の接続である場合のみ）
        if let Some(member) = session.member().cloned() {
            let went_offline = isolated("presence", &connection_id, async {
                ctx.presence.set_offline(&member.user_id, connection_id).await
            })
            .await
            .unwrap_or(false);

            if went_offline {
                outcome.went_offline = true;
                isolated("store", &connection_id, persist_offline(ctx, &member.user_id)).await;
                isolated("presence broadcast", &connection_id, ctx.broadcast_presence()).await;
            } else {
                tracing::debug!(
                    "'{}' is still online on another connection; keeping presence",
                    member.user_id
                );
            }
        }

        session.mark_disconnected();
        tracing::info!("Connection '{}' closed", connection_id);
        outcome
    }
}

/// オフライン状態をストアへ書く（書き込み前に再びオンラインになっていれば書かない）
async fn persist_offline(ctx: &ChatContext, user_id: &UserId) {
    if ctx.presence.is_online(user_id).await {
        tracing::debug!("'{}' came back online; skipping offline write", user_id);
        return;
    }
    if let Err(e) = ctx.store.set_user_online(user_id, false, ctx.now()).await {
        tracing::warn!("Failed to persist offline state of '{}': {}", user_id, e);
    }
}

/// 後始末の 1 ステップを実行する（panic は握りつぶしてログに残す）
async fn isolated<F, T>(step: &str, connection_id: &ConnectionId, fut: F) -> Option<T>
where
    F: Future<Output = T>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::error!(
                "Disconnect cleanup step '{}' panicked for connection '{}'",
                step,
                connection_id
            );
            None
        }
    }
}
