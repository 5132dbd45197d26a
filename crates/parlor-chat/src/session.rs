//! Consumer-side lifecycles: a message feed bound to one chat at a time,
//! and a per-user inbox.

use tracing::{debug, info};
use uuid::Uuid;

use parlor_store::{Subscription, TreeStore};
use parlor_types::{Chat, ChatMessage, ChatStatus, MessageKind};

use crate::error::{ChatError, ChatResult};
use crate::repository::{ChatRepository, decode_chats, decode_messages};

/// One consumer's view of one chat at a time.
///
/// Mirrors a chat screen: opening a room subscribes to its recent messages,
/// switching rooms tears the old feed down before the new one opens, and
/// leaving drops the feed. At most one feed is ever live.
pub struct ChatSession<S: TreeStore> {
    repo: ChatRepository<S>,
    active: Option<ActiveFeed>,
}

struct ActiveFeed {
    chat_id: String,
    feed: Subscription,
}

impl<S: TreeStore> ChatSession<S> {
    pub fn new(repo: ChatRepository<S>) -> Self {
        Self { repo, active: None }
    }

    /// Open the message feed for `chat_id`. Re-activating the chat that is
    /// already active keeps the existing feed untouched; activating a
    /// different chat cancels the old feed first, so two feeds never
    /// overlap.
    pub async fn activate(&mut self, chat_id: &str) -> ChatResult<()> {
        if let Some(active) = &self.active
            && active.chat_id == chat_id
        {
            debug!(chat = chat_id, "chat already active");
            return Ok(());
        }
        self.deactivate();
        let feed = self.repo.listen_to_messages(chat_id, None).await?;
        info!(chat = chat_id, "chat activated");
        self.active = Some(ActiveFeed {
            chat_id: chat_id.to_string(),
            feed,
        });
        Ok(())
    }

    /// Cancel the active feed, if any. Idempotent.
    pub fn deactivate(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.feed.cancel();
            info!(chat = %active.chat_id, "chat deactivated");
        }
    }

    pub fn active_chat(&self) -> Option<&str> {
        self.active.as_ref().map(|active| active.chat_id.as_str())
    }

    /// Next decoded message window from the active feed. `None` when no
    /// chat is active or once the feed terminates.
    pub async fn recv(&mut self) -> Option<Vec<(String, ChatMessage)>> {
        let active = self.active.as_mut()?;
        let window = active.feed.recv().await?;
        Some(decode_messages(&window))
    }

    /// Send a text into the active chat. Repository failures pass through
    /// untouched; there is no retry.
    pub async fn send(
        &self,
        sender_id: Uuid,
        text: &str,
        kind: MessageKind,
    ) -> ChatResult<String> {
        let Some(active) = &self.active else {
            return Err(ChatError::NoActiveChat);
        };
        self.repo
            .send_message(&active.chat_id, sender_id, text, kind, None)
            .await
    }
}

/// A user's live chat list, plus the verbs a list screen needs.
pub struct Inbox<S: TreeStore> {
    repo: ChatRepository<S>,
    user_id: Uuid,
    feed: Subscription,
}

impl<S: TreeStore> Inbox<S> {
    /// Open the live chat list for `user_id`.
    pub async fn open(repo: ChatRepository<S>, user_id: Uuid) -> ChatResult<Self> {
        let feed = repo.listen_to_user_chats(user_id).await?;
        info!(user = %user_id, "inbox opened");
        Ok(Self { repo, user_id, feed })
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    /// Next decoded chat list. `None` once the feed terminates.
    pub async fn recv(&mut self) -> Option<Vec<(String, Chat)>> {
        let window = self.feed.recv().await?;
        Some(decode_chats(&window))
    }

    /// Start a chat with `others`. The inbox owner is the creator and is
    /// always included, so an empty `others` makes a room of one.
    pub async fn start_chat(&self, others: &[Uuid]) -> ChatResult<String> {
        let mut participants = Vec::with_capacity(others.len() + 1);
        participants.push(self.user_id);
        participants.extend_from_slice(others);
        self.repo.create_chat(&participants, self.user_id).await
    }

    /// Status passthrough for list-screen actions.
    pub async fn set_status(&self, chat_id: &str, status: ChatStatus) -> ChatResult<()> {
        self.repo.update_status(chat_id, status).await
    }

    /// Stop the feed. Dropping the inbox stops it too.
    pub fn close(&mut self) {
        self.feed.cancel();
    }
}
