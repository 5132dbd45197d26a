//! Typed chat operations over a tree store.

use chrono::Utc;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};
use uuid::Uuid;

use parlor_store::{Subscription, TreePath, TreeQuery, TreeStore};
use parlor_types::{Chat, ChatMessage, ChatStatus, LastMessage, MessageKind};

use crate::config::ChatConfig;
use crate::error::{ChatError, ChatResult};

const CHATS_ROOT: &str = "chats";
const MESSAGES: &str = "messages";
const PARTICIPANTS: &str = "participants";
const FIELD_STATUS: &str = "status";
const FIELD_LAST_MESSAGE: &str = "lastMessage";

/// Chat rooms, their participant sets and their message logs, backed by any
/// [`TreeStore`].
///
/// Every path under `chats/...` is spelled out here and nowhere else.
/// Mutations against a named chat are guarded by an existence check; reads
/// and subscriptions are not, so a feed can be opened before its chat is
/// created and will follow it into existence.
#[derive(Clone)]
pub struct ChatRepository<S> {
    store: S,
    config: ChatConfig,
}

impl<S: TreeStore> ChatRepository<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, ChatConfig::default())
    }

    pub fn with_config(store: S, config: ChatConfig) -> Self {
        Self { store, config }
    }

    /// Create a chat room and return its id. The creator is always a
    /// member, whether or not the caller listed them. Identical participant
    /// sets are not deduplicated; every call makes a new room.
    pub async fn create_chat(
        &self,
        participants: &[Uuid],
        created_by: Uuid,
    ) -> ChatResult<String> {
        if participants.is_empty() {
            return Err(ChatError::EmptyParticipants);
        }
        let mut members = Map::new();
        for user in participants {
            members.insert(user.to_string(), Value::Bool(true));
        }
        members.insert(created_by.to_string(), Value::Bool(true));
        let member_count = members.len();
        let record = json!({
            "participants": members,
            "status": ChatStatus::Open.as_str(),
            "createdAt": Utc::now().timestamp_millis(),
            "createdBy": created_by,
        });
        let chat_id = self.store.push(&self.chats_root()?, record).await?;
        info!(chat = %chat_id, members = member_count, "chat created");
        Ok(chat_id)
    }

    /// Append a message to the log, then refresh the chat's `lastMessage`
    /// summary.
    ///
    /// The two writes are separate commits: under racing senders the
    /// summary matches whichever racer wrote it last, which may not be the
    /// message the store ordered last. If the summary write fails, the
    /// appended message stands and the error surfaces to the caller.
    pub async fn send_message(
        &self,
        chat_id: &str,
        sender_id: Uuid,
        text: &str,
        kind: MessageKind,
        meta: Option<Map<String, Value>>,
    ) -> ChatResult<String> {
        self.ensure_chat(chat_id).await?;
        let message = ChatMessage {
            sender_id,
            text: text.to_string(),
            timestamp: Utc::now().timestamp_millis(),
            kind,
            meta,
        };
        let chat = self.chat_path(chat_id)?;
        let message_id = self
            .store
            .push(
                &chat.child(MESSAGES)?,
                serde_json::to_value(&message).expect("message record serializes"),
            )
            .await?;
        debug!(chat = chat_id, message = %message_id, "message appended");

        let summary = LastMessage {
            text: message.text,
            sender_id,
            timestamp: message.timestamp,
        };
        let mut fields = Map::new();
        fields.insert(
            FIELD_LAST_MESSAGE.to_string(),
            serde_json::to_value(&summary).expect("summary record serializes"),
        );
        self.store.update(&chat, fields).await?;
        Ok(message_id)
    }

    /// Live window over the most recent messages, ascending by key; the
    /// window slides as the log grows. `None` takes the configured default
    /// size. Raw windows decode with [`decode_messages`].
    pub async fn listen_to_messages(
        &self,
        chat_id: &str,
        limit: Option<usize>,
    ) -> ChatResult<Subscription> {
        let limit = limit.unwrap_or(self.config.message_window);
        let query =
            TreeQuery::at(self.chat_path(chat_id)?.child(MESSAGES)?).limit_to_last(limit);
        debug!(chat = chat_id, limit, "opening message feed");
        Ok(self.store.subscribe(query).await?)
    }

    /// Live set of every chat whose participant map carries
    /// `user_id == true`, re-delivered in full on each relevant change. Raw
    /// windows decode with [`decode_chats`].
    pub async fn listen_to_user_chats(&self, user_id: Uuid) -> ChatResult<Subscription> {
        let query = TreeQuery::at(self.chats_root()?)
            .order_by_child(&format!("{PARTICIPANTS}/{user_id}"))
            .equal_to(true);
        debug!(user = %user_id, "opening user chat feed");
        Ok(self.store.subscribe(query).await?)
    }

    /// Flip the room status.
    pub async fn update_status(&self, chat_id: &str, status: ChatStatus) -> ChatResult<()> {
        self.ensure_chat(chat_id).await?;
        let mut fields = Map::new();
        fields.insert(
            FIELD_STATUS.to_string(),
            Value::String(status.as_str().to_string()),
        );
        self.store.update(&self.chat_path(chat_id)?, fields).await?;
        info!(chat = chat_id, %status, "status updated");
        Ok(())
    }

    /// Mark `user_id` as a participant. Adding a present member is a no-op.
    pub async fn add_participant(&self, chat_id: &str, user_id: Uuid) -> ChatResult<()> {
        self.ensure_chat(chat_id).await?;
        let member = self.participant_path(chat_id, user_id)?;
        self.store.set(&member, Value::Bool(true)).await?;
        info!(chat = chat_id, user = %user_id, "participant added");
        Ok(())
    }

    /// Drop `user_id` from the participant set. Their messages stay in the
    /// log; removing an absent member is a no-op.
    pub async fn remove_participant(&self, chat_id: &str, user_id: Uuid) -> ChatResult<()> {
        self.ensure_chat(chat_id).await?;
        let member = self.participant_path(chat_id, user_id)?;
        self.store.remove(&member).await?;
        info!(chat = chat_id, user = %user_id, "participant removed");
        Ok(())
    }

    /// One-shot full message log in key order. An absent chat reads as an
    /// empty log.
    pub async fn get_chat_messages_once(
        &self,
        chat_id: &str,
    ) -> ChatResult<Vec<(String, ChatMessage)>> {
        let query = TreeQuery::at(self.chat_path(chat_id)?.child(MESSAGES)?);
        let window = self.store.query_once(query).await?;
        Ok(decode_messages(&window))
    }

    /// One-shot chat record read; `None` when absent.
    pub async fn get_chat(&self, chat_id: &str) -> ChatResult<Option<Chat>> {
        let Some(node) = self.store.get(&self.chat_path(chat_id)?).await? else {
            return Ok(None);
        };
        let chat = serde_json::from_value(node).map_err(|source| ChatError::Malformed {
            what: "chat",
            key: chat_id.to_string(),
            source,
        })?;
        Ok(Some(chat))
    }

    pub async fn chat_exists(&self, chat_id: &str) -> ChatResult<bool> {
        Ok(self.store.get(&self.chat_path(chat_id)?).await?.is_some())
    }

    /// One-shot ids of every chat that lists `user_id`. The scrub sweep
    /// runs on this; list screens want [`Self::listen_to_user_chats`].
    pub async fn chats_with_participant(&self, user_id: Uuid) -> ChatResult<Vec<String>> {
        let query = TreeQuery::at(self.chats_root()?)
            .order_by_child(&format!("{PARTICIPANTS}/{user_id}"))
            .equal_to(true);
        let window = self.store.query_once(query).await?;
        Ok(window.into_iter().map(|(key, _)| key).collect())
    }

    async fn ensure_chat(&self, chat_id: &str) -> ChatResult<()> {
        if self.chat_exists(chat_id).await? {
            Ok(())
        } else {
            Err(ChatError::ChatNotFound(chat_id.to_string()))
        }
    }

    fn chats_root(&self) -> ChatResult<TreePath> {
        Ok(TreePath::parse(CHATS_ROOT)?)
    }

    fn chat_path(&self, chat_id: &str) -> ChatResult<TreePath> {
        Ok(self.chats_root()?.child(chat_id)?)
    }

    fn participant_path(&self, chat_id: &str, user_id: Uuid) -> ChatResult<TreePath> {
        Ok(self
            .chat_path(chat_id)?
            .child(PARTICIPANTS)?
            .child(&user_id.to_string())?)
    }
}

/// Decode a raw message window, in order. Nodes that do not parse are
/// logged at warn and skipped; one bad record never takes a feed down.
pub fn decode_messages(window: &[(String, Value)]) -> Vec<(String, ChatMessage)> {
    decode_window(window, "message")
}

/// Decode a raw chat-list window the same way.
pub fn decode_chats(window: &[(String, Value)]) -> Vec<(String, Chat)> {
    decode_window(window, "chat")
}

fn decode_window<T: serde::de::DeserializeOwned>(
    window: &[(String, Value)],
    what: &'static str,
) -> Vec<(String, T)> {
    window
        .iter()
        .filter_map(|(key, node)| match serde_json::from_value(node.clone()) {
            Ok(decoded) => Some((key.clone(), decoded)),
            Err(error) => {
                warn!(%key, what, %error, "skipping undecodable node");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_skips_malformed_nodes() {
        let sender = Uuid::new_v4();
        let window = vec![
            (
                "m1".to_string(),
                json!({ "senderId": sender, "text": "ok", "timestamp": 1i64 }),
            ),
            ("m2".to_string(), json!({ "text": "no sender" })),
            (
                "m3".to_string(),
                json!({ "senderId": sender, "text": "also ok", "timestamp": 2i64 }),
            ),
        ];

        let decoded = decode_messages(&window);
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].0, "m1");
        assert_eq!(decoded[1].0, "m3");
        assert_eq!(decoded[1].1.text, "also ok");
    }

    #[test]
    fn test_decode_chats_reads_camel_case() {
        let uid = Uuid::new_v4();
        let window = vec![(
            "c1".to_string(),
            json!({
                "participants": { uid.to_string(): true },
                "status": "important",
                "createdAt": 9i64,
                "createdBy": uid,
            }),
        )];

        let decoded = decode_chats(&window);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].1.status, ChatStatus::Important);
        assert!(decoded[0].1.has_participant(uid));
    }
}
