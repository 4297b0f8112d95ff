//! エンティティ
//!
//! - `User`: 永続化されるユーザー（削除はしない）
//! - `ChatMessage`: 永続化されるメッセージ（リアクションはその場で更新）
//! - `Session`: 1 接続ごとの一時的な状態（切断時に破棄）
//! - `Member`: Room / ボイスチャンネルに参加しているセッション

use std::collections::{BTreeMap, BTreeSet};

use super::{
    error::ValueObjectError,
    value_object::{
        ConnectionId, DisplayName, Emoji, MessageId, MessageText, RoomName, Timestamp, UserId,
    },
};

/// ID プロバイダ由来の付加情報
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderMeta {
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    /// 認証元プロバイダ（例: "auth0"）
    pub provider: Option<String>,
}

/// ユーザー
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub display_name: DisplayName,
    pub online: bool,
    pub last_seen_at: Timestamp,
    pub meta: ProviderMeta,
}

impl User {
    pub fn new(id: UserId, display_name: DisplayName, meta: ProviderMeta, at: Timestamp) -> Self {
        Self {
            id,
            display_name,
            online: false,
            last_seen_at: at,
            meta,
        }
    }

    /// オンライン状態を変更し、最終確認時刻を更新する
    pub fn mark(&mut self, online: bool, at: Timestamp) {
        self.online = online;
        self.last_seen_at = at;
    }
}

/// Identity Resolver の解決結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub user_id: UserId,
    pub display_name: DisplayName,
    pub meta: ProviderMeta,
}

/// メッセージごと・絵文字ごとのリアクションしたユーザー集合
///
/// 空になった絵文字のキーは残さない。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reactions(BTreeMap<Emoji, BTreeSet<UserId>>);

impl Reactions {
    pub fn new() -> Self {
        Self::default()
    }

    /// リアクションをトグルする
    ///
    /// # Returns
    ///
    /// 追加された場合 `true`、取り消された場合 `false`
    pub fn toggle(&mut self, emoji: Emoji, user_id: UserId) -> bool {
        let users = self.0.entry(emoji.clone()).or_default();
        if users.remove(&user_id) {
            if users.is_empty() {
                self.0.remove(&emoji);
            }
            false
        } else {
            users.insert(user_id);
            true
        }
    }

    pub fn users(&self, emoji: &Emoji) -> Option<&BTreeSet<UserId>> {
        self.0.get(emoji)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Emoji, &BTreeSet<UserId>)> {
        self.0.iter()
    }

    /// 文字列マップへ変換（永続化・DTO 用）
    pub fn to_map(&self) -> BTreeMap<String, Vec<String>> {
        self.0
            .iter()
            .map(|(emoji, users)| {
                (
                    emoji.as_str().to_string(),
                    users.iter().map(|u| u.as_str().to_string()).collect(),
                )
            })
            .collect()
    }

    /// 文字列マップから復元（空の集合は捨てる）
    pub fn from_map(map: BTreeMap<String, Vec<String>>) -> Result<Self, ValueObjectError> {
        let mut reactions = BTreeMap::new();
        for (emoji, users) in map {
            let users = users
                .into_iter()
                .map(UserId::new)
                .collect::<Result<BTreeSet<_>, _>>()?;
            if !users.is_empty() {
                reactions.insert(Emoji::new(emoji)?, users);
            }
        }
        Ok(Self(reactions))
    }
}

/// 永続化前のメッセージ（ID 未採番）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub room: RoomName,
    pub sender_id: UserId,
    /// 送信時点の表示名（後で改名されても表示はこのまま）
    pub sender_display_name: DisplayName,
    pub text: MessageText,
    pub timestamp: Timestamp,
    pub receiver_id: Option<UserId>,
}

impl NewMessage {
    pub fn with_id(self, id: MessageId) -> ChatMessage {
        ChatMessage {
            id,
            room: self.room,
            sender_id: self.sender_id,
            sender_display_name: self.sender_display_name,
            text: self.text,
            timestamp: self.timestamp,
            reactions: Reactions::new(),
            receiver_id: self.receiver_id,
        }
    }
}

/// チャットメッセージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub room: RoomName,
    pub sender_id: UserId,
    pub sender_display_name: DisplayName,
    pub text: MessageText,
    pub timestamp: Timestamp,
    pub reactions: Reactions,
    pub receiver_id: Option<UserId>,
}

/// Room / ボイスチャンネルの参加者（認証済みセッション）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub display_name: DisplayName,
}

impl Member {
    pub fn new(connection_id: ConnectionId, user_id: UserId, display_name: DisplayName) -> Self {
        Self {
            connection_id,
            user_id,
            display_name,
        }
    }
}

/// セッションの状態
///
/// `Connected → Authenticated → InRoom → Disconnected`。
/// ボイスチャンネルへの参加はこの状態とは独立している。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Authenticated,
    InRoom,
    Disconnected,
}

/// 1 接続分のセッション
#[derive(Debug, Clone)]
pub struct Session {
    pub connection_id: ConnectionId,
    pub connected_at: Timestamp,
    member: Option<Member>,
    disconnected: bool,
}

impl Session {
    pub fn new(connection_id: ConnectionId, connected_at: Timestamp) -> Self {
        Self {
            connection_id,
            connected_at,
            member: None,
            disconnected: false,
        }
    }

    /// 認証済みならその参加者情報
    pub fn member(&self) -> Option<&Member> {
        self.member.as_ref()
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.member.as_ref().map(|m| &m.user_id)
    }

    pub fn authenticate(&mut self, user_id: UserId, display_name: DisplayName) {
        self.member = Some(Member::new(self.connection_id, user_id, display_name));
    }

    pub fn mark_disconnected(&mut self) {
        self.disconnected = true;
    }

    /// 現在の状態（Room への参加有無は RoomRegistry が持つため引数で受け取る）
    pub fn state(&self, in_room: bool) -> SessionState {
        match (self.disconnected, &self.member, in_room) {
            (true, _, _) => SessionState::Disconnected,
            (false, None, _) => SessionState::Connected,
            (false, Some(_), false) => SessionState::Authenticated,
            (false, Some(_), true) => SessionState::InRoom,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> UserId {
        UserId::new(id.to_string()).unwrap()
    }

    fn emoji(value: &str) -> Emoji {
        Emoji::new(value.to_string()).unwrap()
    }

    #[test]
    fn test_toggle_adds_then_removes() {
        // テスト項目: 同じユーザー・絵文字で 2 回トグルすると元に戻る
        // given (前提条件):
        let mut reactions = Reactions::new();
        reactions.toggle(emoji("👍"), user("bob"));
        let original = reactions.clone();

        // when (操作):
        let added = reactions.toggle(emoji("👍"), user("alice"));
        let removed = reactions.toggle(emoji("👍"), user("alice"));

        // then (期待する結果):
        assert!(added);
        assert!(!removed);
        assert_eq!(reactions, original);
    }

    #[test]
    fn test_toggle_removes_empty_emoji_key() {
        // テスト項目: 最後のユーザーが取り消すと絵文字のキーごと削除される
        // given (前提条件):
        let mut reactions = Reactions::new();
        reactions.toggle(emoji("🎉"), user("alice"));

        // when (操作):
        reactions.toggle(emoji("🎉"), user("alice"));

        // then (期待する結果):
        assert!(reactions.is_empty());
        assert!(reactions.users(&emoji("🎉")).is_none());
        assert!(reactions.to_map().is_empty());
    }

    #[test]
    fn test_reactions_map_conversion_drops_empty_sets() {
        // テスト項目: 文字列マップからの復元時、空の集合は捨てられる
        // given (前提条件):
        let mut map = BTreeMap::new();
        map.insert("👍".to_string(), vec!["alice".to_string(), "bob".to_string()]);
        map.insert("😢".to_string(), vec![]);

        // when (操作):
        let reactions = Reactions::from_map(map).unwrap();

        // then (期待する結果):
        assert_eq!(reactions.users(&emoji("👍")).map(|u| u.len()), Some(2));
        assert!(reactions.users(&emoji("😢")).is_none());
    }

    #[test]
    fn test_session_state_transitions() {
        // テスト項目: セッション状態が Connected → Authenticated → InRoom → Disconnected と遷移する
        // given (前提条件):
        let mut session = Session::new(ConnectionId::generate(), Timestamp::new(0));

        // then (期待する結果):
        assert_eq!(session.state(false), SessionState::Connected);

        session.authenticate(user("alice"), DisplayName::new("Alice".to_string()).unwrap());
        assert_eq!(session.state(false), SessionState::Authenticated);
        assert_eq!(session.state(true), SessionState::InRoom);
        assert_eq!(
            session.member().map(|m| m.connection_id),
            Some(session.connection_id)
        );

        session.mark_disconnected();
        assert_eq!(session.state(true), SessionState::Disconnected);
    }
}
