//! 値オブジェクト
//!
//! 文字列や数値をそのまま引き回さず、生成時にバリデーションを済ませた
//! 型として扱います。

use std::fmt;

use uuid::Uuid;

use super::error::ValueObjectError;

/// プライベートチャット用 Room 名の接頭辞
pub const PRIVATE_ROOM_PREFIX: &str = "private:";
/// プライベートチャット用 Room 名で 2 人の ID をつなぐ区切り文字
pub const PRIVATE_ROOM_SEPARATOR: &str = ":";
/// ボイスチャンネル用 Room 名の接頭辞
pub const VOICE_ROOM_PREFIX: &str = "voice:";

const MAX_USER_ID_LEN: usize = 256;
const MAX_DISPLAY_NAME_LEN: usize = 64;
const MAX_ROOM_NAME_LEN: usize = 600;
const MAX_MESSAGE_TEXT_LEN: usize = 4000;
const MAX_EMOJI_LEN: usize = 32;
const MAX_CHANNEL_ID_LEN: usize = 128;

/// 文字列ベースの値オブジェクトに共通する実装
macro_rules! string_value_object {
    ($name:ident) => {
        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValueObjectError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }
    };
}

fn require(field: &'static str, value: &str, max: usize) -> Result<(), ValueObjectError> {
    if value.trim().is_empty() {
        return Err(ValueObjectError::Empty(field));
    }
    if value.chars().count() > max {
        return Err(ValueObjectError::TooLong { field, max });
    }
    Ok(())
}

/// ユーザー ID（プロバイダ非依存の安定した ID）
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserId(String);

impl UserId {
    pub fn new(value: String) -> Result<Self, ValueObjectError> {
        require("user id", &value, MAX_USER_ID_LEN)?;
        Ok(Self(value))
    }
}

string_value_object!(UserId);

/// 表示名（前後の空白は除去して保持）
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DisplayName(String);

impl DisplayName {
    pub fn new(value: String) -> Result<Self, ValueObjectError> {
        let trimmed = value.trim();
        require("display name", trimmed, MAX_DISPLAY_NAME_LEN)?;
        Ok(Self(trimmed.to_string()))
    }
}

string_value_object!(DisplayName);

/// Room の種別
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomKind {
    Public,
    Private,
    Voice,
}

/// Room 名
///
/// 公開 Room は利用者が決めた名前、プライベート Room は 2 人の ID から
/// 決定的に導出した名前、ボイスチャンネルは予約済み接頭辞付きの名前です。
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RoomName(String);

impl RoomName {
    /// 任意の Room 名（ストアから読み出した値など）
    pub fn new(value: String) -> Result<Self, ValueObjectError> {
        require("room name", &value, MAX_ROOM_NAME_LEN)?;
        Ok(Self(value))
    }

    /// 公開 Room 名。予約済み接頭辞は受け付けない。
    pub fn public(value: String) -> Result<Self, ValueObjectError> {
        let trimmed = value.trim().to_string();
        if trimmed.starts_with(PRIVATE_ROOM_PREFIX) || trimmed.starts_with(VOICE_ROOM_PREFIX) {
            return Err(ValueObjectError::ReservedPrefix(trimmed));
        }
        Self::new(trimmed)
    }

    /// 2 人のユーザー ID から決定的にプライベート Room 名を導出する
    ///
    /// ID を辞書順に並べてから連結するため、どちらの参加者が計算しても
    /// 同じ名前になります。ID は区切り文字を含み得るので、それぞれ
    /// パーセントエンコードしてから連結します。
    pub fn private_between(a: &UserId, b: &UserId) -> Self {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        Self(format!(
            "{PRIVATE_ROOM_PREFIX}{}{PRIVATE_ROOM_SEPARATOR}{}",
            urlencoding::encode(first.as_str()),
            urlencoding::encode(second.as_str())
        ))
    }

    /// `me` が参加者であるプライベート Room なら、相手のユーザー ID を返す
    pub fn private_peer(&self, me: &UserId) -> Option<UserId> {
        let pair = self.0.strip_prefix(PRIVATE_ROOM_PREFIX)?;
        let (first, second) = pair.split_once(PRIVATE_ROOM_SEPARATOR)?;
        let first = urlencoding::decode(first).ok()?;
        let second = urlencoding::decode(second).ok()?;
        let peer = if first == me.as_str() {
            second
        } else if second == me.as_str() {
            first
        } else {
            return None;
        };
        UserId::new(peer.into_owned())
            .ok()
            .filter(|peer| peer != me && Self::private_between(me, peer) == *self)
    }

    /// ボイスチャンネルの Room 名
    pub fn voice(channel_id: &ChannelId) -> Self {
        Self(format!("{VOICE_ROOM_PREFIX}{}", channel_id.as_str()))
    }

    pub fn kind(&self) -> RoomKind {
        if self.0.starts_with(PRIVATE_ROOM_PREFIX) {
            RoomKind::Private
        } else if self.0.starts_with(VOICE_ROOM_PREFIX) {
            RoomKind::Voice
        } else {
            RoomKind::Public
        }
    }
}

string_value_object!(RoomName);

/// メッセージ ID（永続層、またはフォールバック時はプロセス内で採番）
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(value: String) -> Result<Self, ValueObjectError> {
        require("message id", &value, MAX_USER_ID_LEN)?;
        Ok(Self(value))
    }
}

string_value_object!(MessageId);

/// メッセージ本文（空白のみは不可、本文自体は加工しない）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageText(String);

impl MessageText {
    pub fn new(value: String) -> Result<Self, ValueObjectError> {
        require("message text", &value, MAX_MESSAGE_TEXT_LEN)?;
        Ok(Self(value))
    }
}

string_value_object!(MessageText);

/// リアクションの絵文字
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Emoji(String);

impl Emoji {
    pub fn new(value: String) -> Result<Self, ValueObjectError> {
        let trimmed = value.trim();
        require("emoji", trimmed, MAX_EMOJI_LEN)?;
        Ok(Self(trimmed.to_string()))
    }
}

string_value_object!(Emoji);

/// ボイスチャンネル ID
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new(value: String) -> Result<Self, ValueObjectError> {
        let trimmed = value.trim();
        require("channel id", trimmed, MAX_CHANNEL_ID_LEN)?;
        Ok(Self(trimmed.to_string()))
    }
}

string_value_object!(ChannelId);

/// 接続ハンドル（1 接続 = 1 セッション）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Unix タイムスタンプ（ミリ秒）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> UserId {
        UserId::new(id.to_string()).unwrap()
    }

    #[test]
    fn test_user_id_rejects_blank() {
        // テスト項目: 空白のみのユーザー ID は生成できない
        // given (前提条件):
        let value = "   ".to_string();

        // when (操作):
        let result = UserId::new(value);

        // then (期待する結果):
        assert_eq!(result, Err(ValueObjectError::Empty("user id")));
    }

    #[test]
    fn test_display_name_is_trimmed_and_bounded() {
        // テスト項目: 表示名は前後の空白が除去され、長すぎる値は拒否される
        // given (前提条件):
        let padded = "  Alice  ".to_string();
        let too_long = "x".repeat(65);

        // when (操作):
        let name = DisplayName::new(padded).unwrap();
        let result = DisplayName::new(too_long);

        // then (期待する結果):
        assert_eq!(name.as_str(), "Alice");
        assert!(matches!(result, Err(ValueObjectError::TooLong { .. })));
    }

    #[test]
    fn test_private_room_name_is_symmetric() {
        // テスト項目: プライベート Room 名は引数の順序に依存しない
        // given (前提条件):
        let pairs = [
            ("alice", "bob"),
            ("auth0|123", "google-oauth2|456"),
            ("Zed", "adam"),
            ("u1", "u10"),
        ];

        for (a, b) in pairs {
            // when (操作):
            let ab = RoomName::private_between(&user(a), &user(b));
            let ba = RoomName::private_between(&user(b), &user(a));

            // then (期待する結果):
            assert_eq!(ab, ba);
            assert_eq!(ab.kind(), RoomKind::Private);
        }
    }

    #[test]
    fn test_private_room_name_format() {
        // テスト項目: プライベート Room 名は接頭辞 + ソート済み ID で構成される
        // given (前提条件):
        let a = user("bob");
        let b = user("alice");

        // when (操作):
        let room = RoomName::private_between(&a, &b);

        // then (期待する結果):
        assert_eq!(room.as_str(), "private:alice:bob");
    }

    #[test]
    fn test_private_peer_only_for_participants() {
        // テスト項目: プライベート Room 名から相手の ID を取り出せるのは参加者本人だけ
        // given (前提条件):
        let alice = user("auth0|alice");
        let bob = user("google:bob");
        let room = RoomName::private_between(&alice, &bob);

        // when (操作):
        let from_alice = room.private_peer(&alice);
        let from_bob = room.private_peer(&bob);
        let from_carol = room.private_peer(&user("carol"));

        // then (期待する結果):
        assert_eq!(from_alice, Some(bob.clone()));
        assert_eq!(from_bob, Some(alice));
        assert_eq!(from_carol, None);
        assert_eq!(RoomName::public("general".to_string()).unwrap().private_peer(&bob), None);
    }

    #[test]
    fn test_private_room_names_do_not_collide_on_separator() {
        // テスト項目: 区切り文字を含む ID でも別の組み合わせと同じ Room 名にならない
        // given (前提条件):
        let a = user("a");
        let b_c = user("b:c");
        let a_b = user("a:b");
        let c = user("c");

        // when (操作):
        let room = RoomName::private_between(&a, &b_c);
        let other = RoomName::private_between(&a_b, &c);

        // then (期待する結果):
        assert_ne!(room, other);
        assert_eq!(room.private_peer(&a), Some(b_c.clone()));
        assert_eq!(room.private_peer(&b_c), Some(a.clone()));
        assert_eq!(room.private_peer(&a_b), None);
        assert_eq!(room.private_peer(&c), None);
        assert_eq!(other.private_peer(&a), None);
    }

    #[test]
    fn test_public_room_rejects_reserved_prefix() {
        // テスト項目: 公開 Room 名に予約済み接頭辞は使えない
        // given (前提条件):
        let private_like = "private:alice:bob".to_string();
        let voice_like = "voice:lobby".to_string();

        // when (操作):
        let private_result = RoomName::public(private_like);
        let voice_result = RoomName::public(voice_like);

        // then (期待する結果):
        assert!(matches!(
            private_result,
            Err(ValueObjectError::ReservedPrefix(_))
        ));
        assert!(matches!(voice_result, Err(ValueObjectError::ReservedPrefix(_))));
    }

    #[test]
    fn test_room_kind_detection() {
        // テスト項目: Room 名から種別が判定できる
        // given (前提条件):
        let public = RoomName::public(" general ".to_string()).unwrap();
        let voice = RoomName::voice(&ChannelId::new("lobby".to_string()).unwrap());

        // then (期待する結果):
        assert_eq!(public.as_str(), "general");
        assert_eq!(public.kind(), RoomKind::Public);
        assert_eq!(voice.as_str(), "voice:lobby");
        assert_eq!(voice.kind(), RoomKind::Voice);
    }

    #[test]
    fn test_message_text_keeps_original_content() {
        // テスト項目: メッセージ本文は空白チェックのみ行い、内容は加工しない
        // given (前提条件):
        let text = "  hello  ".to_string();

        // when (操作):
        let result = MessageText::new(text.clone()).unwrap();

        // then (期待する結果):
        assert_eq!(result.as_str(), text);
        assert!(MessageText::new("\n\t ".to_string()).is_err());
    }
}
