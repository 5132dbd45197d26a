use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A chat room as persisted under `chats/{chatId}`.
///
/// The message log lives under the same node (`messages/{messageId}`) but is
/// not part of this record; decoding ignores it. `participants` maps a user
/// id to a presence flag — membership means the key is present with `true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    #[serde(default)]
    pub participants: BTreeMap<Uuid, bool>,
    #[serde(default)]
    pub status: ChatStatus,
    pub created_at: i64,
    pub created_by: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<LastMessage>,
}

impl Chat {
    /// Whether `user_id` is currently a member (key present and `true`).
    pub fn has_participant(&self, user_id: Uuid) -> bool {
        self.participants.get(&user_id).copied().unwrap_or(false)
    }
}

/// Room status, mutable by participants and moderators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatStatus {
    #[default]
    Open,
    Closed,
    Important,
}

impl ChatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Important => "important",
        }
    }
}

impl fmt::Display for ChatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message as persisted under `chats/{chatId}/messages/{messageId}`.
///
/// Timestamps are sender-clock epoch millis; the store-assigned message id
/// (not part of the record) is the ordering key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub sender_id: Uuid,
    pub text: String,
    pub timestamp: i64,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    /// Free-form payload carried opaquely (e.g. image dimensions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
}

/// Denormalized preview of the most recent message, stored on the chat node
/// so list views never scan the log. Eventually consistent: under racing
/// senders it matches one of the racing messages, not necessarily the one
/// the store ordered last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub text: String,
    pub sender_id: Uuid,
    pub timestamp: i64,
}
