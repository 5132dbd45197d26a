//! Shared setup for the chat integration tests.

use parlor_chat::ChatRepository;
use parlor_store::MemoryStore;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parlor_chat=debug,parlor_store=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

/// A repository over a fresh in-memory store, with logging wired up.
pub fn repo() -> ChatRepository<MemoryStore> {
    init_tracing();
    ChatRepository::new(MemoryStore::new())
}
