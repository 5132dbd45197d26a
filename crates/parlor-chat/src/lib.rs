//! Multi-party chat over a realtime tree store.
//!
//! [`ChatRepository`] owns the persisted layout under `chats/...` and the
//! typed operations against it. [`ChatSession`] and [`Inbox`] are the
//! consumer-side lifecycles over its live feeds, and [`scrub_participant`]
//! is the account-deletion hook. Any [`parlor_store::TreeStore`] backend
//! plugs in underneath; tests run against the bundled in-memory one.

pub mod config;
pub mod error;
pub mod repository;
pub mod scrub;
pub mod session;

pub use config::ChatConfig;
pub use error::{ChatError, ChatResult};
pub use repository::ChatRepository;
pub use scrub::{ScrubReport, scrub_participant};
pub use session::{ChatSession, Inbox};
