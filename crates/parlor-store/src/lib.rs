//! An in-process realtime tree store.
//!
//! The store holds one JSON tree addressed by slash-separated paths and
//! exposes the primitives a synced tree database offers: `set`/`remove`
//! writes, multi-path `update`, `push` with store-minted time-ordered keys,
//! one-shot reads, and live window subscriptions that re-deliver a query's
//! result after every commit that can affect it.
//!
//! [`MemoryStore`] is the bundled backend: a cheaply clonable handle over
//! shared state with an explicit lifecycle. [`TreeStore`] is the seam for
//! swapping in a remote backend with the same semantics.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, info, trace};

pub mod error;
pub mod path;
pub mod query;
pub mod watch;

mod push_id;
mod tree;

pub use error::{StoreError, StoreResult};
pub use path::TreePath;
pub use query::{TreeQuery, Window};
pub use watch::{CancelHandle, Subscription};

use push_id::PushIdGenerator;
use watch::WatchRegistry;

/// Operations every tree store backend provides.
///
/// Writes are atomic per call and fan out to live subscriptions before the
/// call returns, so a caller that awaits a write can immediately observe its
/// effect through any subscription it holds.
#[allow(async_fn_in_trait)]
pub trait TreeStore: Send + Sync {
    /// Append a child under `path` with a store-minted key. Keys sort
    /// lexicographically in mint order, so child key order is append order.
    async fn push(&self, path: &TreePath, value: Value) -> StoreResult<String>;

    /// Replace the subtree at `path`. `Null` (or a value that is entirely
    /// nulls and empty objects) deletes it.
    async fn set(&self, path: &TreePath, value: Value) -> StoreResult<()>;

    /// Merge children under `path` in one atomic commit. Keys may be
    /// slash-separated relative paths; `Null` values delete their target.
    async fn update(&self, path: &TreePath, fields: Map<String, Value>) -> StoreResult<()>;

    /// Delete the subtree at `path`. Deleting something absent succeeds.
    async fn remove(&self, path: &TreePath) -> StoreResult<()>;

    /// One-shot read of the subtree at `path`; `None` when absent.
    async fn get(&self, path: &TreePath) -> StoreResult<Option<Value>>;

    /// One-shot evaluation of a child-window query.
    async fn query_once(&self, query: TreeQuery) -> StoreResult<Window>;

    /// Open a live feed over a query. The current window is delivered
    /// immediately, then again after every commit that changes it.
    async fn subscribe(&self, query: TreeQuery) -> StoreResult<Subscription>;
}

/// The in-memory backend. Clones share one tree and one watcher registry.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    /// The whole tree. `Null` at the root means empty.
    tree: RwLock<Value>,
    watchers: WatchRegistry,
    push_ids: Mutex<PushIdGenerator>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        debug!("memory store created");
        Self {
            inner: Arc::new(StoreInner {
                tree: RwLock::new(Value::Null),
                watchers: WatchRegistry::new(),
                push_ids: Mutex::new(PushIdGenerator::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Close the store: every live subscription terminates and every later
    /// operation fails with [`StoreError::Closed`]. Idempotent.
    pub fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let dropped = self.inner.watchers.clear();
        info!(watchers = dropped, "memory store shut down");
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    /// Apply one mutation, then fan out. The tree write lock is released
    /// before delivery; the registry lock is always taken before the tree
    /// lock, matching `subscribe`, so the two paths cannot deadlock.
    fn commit(&self, path: &TreePath, mutate: impl FnOnce(&mut Value)) {
        {
            let mut tree = self.inner.tree.write().expect("tree lock poisoned");
            mutate(&mut tree);
        }
        self.inner
            .watchers
            .notify(path, || self.inner.tree.read().expect("tree lock poisoned"));
    }
}

impl TreeStore for MemoryStore {
    async fn push(&self, path: &TreePath, value: Value) -> StoreResult<String> {
        self.ensure_open()?;
        let key = {
            let mut ids = self
                .inner
                .push_ids
                .lock()
                .expect("push id generator poisoned");
            ids.next(Utc::now().timestamp_millis())
        };
        let target = path.child(&key)?;
        trace!(path = %target, "push");
        self.commit(&target, |root| tree::set_at(root, &target, value));
        Ok(key)
    }

    async fn set(&self, path: &TreePath, value: Value) -> StoreResult<()> {
        self.ensure_open()?;
        trace!(%path, "set");
        self.commit(path, |root| tree::set_at(root, path, value));
        Ok(())
    }

    async fn update(&self, path: &TreePath, fields: Map<String, Value>) -> StoreResult<()> {
        self.ensure_open()?;
        // Resolve every key up front so one bad key rejects the whole batch
        // and a partial merge never lands.
        let mut writes = Vec::with_capacity(fields.len());
        for (relative, value) in fields {
            writes.push((path.join(&relative)?, value));
        }
        trace!(%path, writes = writes.len(), "update");
        self.commit(path, |root| {
            for (target, value) in writes {
                tree::set_at(root, &target, value);
            }
        });
        Ok(())
    }

    async fn remove(&self, path: &TreePath) -> StoreResult<()> {
        self.ensure_open()?;
        trace!(%path, "remove");
        self.commit(path, |root| tree::remove_at(root, path));
        Ok(())
    }

    async fn get(&self, path: &TreePath) -> StoreResult<Option<Value>> {
        self.ensure_open()?;
        let tree = self.inner.tree.read().expect("tree lock poisoned");
        Ok(tree::get_at(&tree, path).cloned())
    }

    async fn query_once(&self, query: TreeQuery) -> StoreResult<Window> {
        self.ensure_open()?;
        let compiled = query.compile()?;
        let tree = self.inner.tree.read().expect("tree lock poisoned");
        Ok(compiled.evaluate(&tree))
    }

    async fn subscribe(&self, query: TreeQuery) -> StoreResult<Subscription> {
        self.ensure_open()?;
        let compiled = query.compile()?;
        let (id, rx) = self.inner.watchers.register(compiled, || {
            self.inner.tree.read().expect("tree lock poisoned")
        });
        // A shutdown racing this call may have cleared the registry before
        // the insert; don't hand out a feed that can never terminate.
        if self.inner.closed.load(Ordering::SeqCst) {
            self.inner.watchers.remove(id);
            return Err(StoreError::Closed);
        }
        debug!(watcher = id, "subscribed");
        let inner = self.inner.clone();
        let cancel = CancelHandle::new(move || inner.watchers.remove(id));
        Ok(Subscription::new(rx, cancel))
    }
}
