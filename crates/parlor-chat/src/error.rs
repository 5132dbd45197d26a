use parlor_store::StoreError;
use thiserror::Error;

pub type ChatResult<T> = Result<T, ChatError>;

/// Failures surfaced by the chat layer. Store failures pass through
/// unwrapped so callers can tell a missing chat from a broken backend.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat {0} does not exist")]
    ChatNotFound(String),

    #[error("a chat needs at least one participant")]
    EmptyParticipants,

    #[error("no active chat")]
    NoActiveChat,

    #[error("malformed {what} record at {key}: {source}")]
    Malformed {
        what: &'static str,
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}
