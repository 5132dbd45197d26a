//! Account-deletion hook: withdraw a user from every chat that lists them.

use tracing::{info, warn};
use uuid::Uuid;

use parlor_store::TreeStore;

use crate::error::{ChatError, ChatResult};
use crate::repository::ChatRepository;

/// Outcome of one scrub sweep.
///
/// A partially failed sweep is a normal report, not an error: completed
/// removals stay done, failed chats are listed so a retry has only the
/// leftovers to cover.
#[derive(Debug, Default)]
pub struct ScrubReport {
    pub scrubbed: Vec<String>,
    pub failed: Vec<(String, ChatError)>,
}

impl ScrubReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Remove `user_id` from the participant set of every chat that lists
/// them. Message history is untouched.
///
/// Chats are handled independently: a failed removal is logged, recorded
/// in the report and the sweep moves on. Only failing to enumerate the
/// chats at all is an error. A user with no chats yields an empty report.
pub async fn scrub_participant<S: TreeStore>(
    repo: &ChatRepository<S>,
    user_id: Uuid,
) -> ChatResult<ScrubReport> {
    let chats = repo.chats_with_participant(user_id).await?;
    let mut report = ScrubReport::default();
    for chat_id in chats {
        match repo.remove_participant(&chat_id, user_id).await {
            Ok(()) => report.scrubbed.push(chat_id),
            Err(error) => {
                warn!(user = %user_id, chat = %chat_id, %error, "scrub removal failed");
                report.failed.push((chat_id, error));
            }
        }
    }
    info!(
        user = %user_id,
        removed = report.scrubbed.len(),
        failed = report.failed.len(),
        "participant scrub finished"
    );
    Ok(report)
}
