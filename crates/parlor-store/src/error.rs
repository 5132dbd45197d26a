use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failures a tree store operation can surface to its caller.
///
/// The in-process `MemoryStore` only ever produces `InvalidPath`,
/// `InvalidQuery` and `Closed`; `Unauthorized` and `Unavailable` exist for
/// implementations backed by an access-controlled or remote store behind
/// the same trait.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("store is shut down")]
    Closed,

    #[error("rejected by store access rules: {0}")]
    Unauthorized(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}
