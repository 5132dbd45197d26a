//! Live query fan-out: the watcher registry and subscription handles.
//!
//! Every live query is a `Watcher` in the registry. A commit notifies the
//! registry, which recomputes the window of each watcher whose query root
//! overlaps the mutated path and pushes changed windows down an unbounded
//! channel. Delivery happens under the registry read lock, so removing a
//! watcher (which takes the write lock) cannot race an in-flight delivery:
//! once `cancel` returns, nothing more is sent.

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::trace;

use crate::path::TreePath;
use crate::query::{CompiledQuery, Window};

/// One registered live query and its delivery channel.
pub(crate) struct Watcher {
    id: u64,
    query: CompiledQuery,
    tx: mpsc::UnboundedSender<Window>,
    /// Last window sent, so recomputes that change nothing stay silent.
    last: Mutex<Option<Window>>,
}

impl Watcher {
    /// Recompute against `root` and deliver if the window changed.
    fn deliver(&self, root: &Value) {
        let window = self.query.evaluate(root);
        let mut last = self.last.lock().expect("watcher window cache poisoned");
        if last.as_ref() == Some(&window) {
            return;
        }
        trace!(watcher = self.id, entries = window.len(), "delivering window");
        *last = Some(window.clone());
        let _ = self.tx.send(window);
    }

    /// True when a mutation at `path` can affect this watcher's window.
    /// Disjoint paths cannot; ancestors and descendants of the query root
    /// can.
    fn covers(&self, path: &TreePath) -> bool {
        path.starts_with(self.query.path()) || self.query.path().starts_with(path)
    }
}

/// The set of live watchers on one store.
pub(crate) struct WatchRegistry {
    watchers: RwLock<HashMap<u64, Arc<Watcher>>>,
    next_id: AtomicU64,
}

impl WatchRegistry {
    pub(crate) fn new() -> Self {
        Self {
            watchers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a query and deliver its first window.
    ///
    /// `snapshot` borrows the tree under the registration lock, so no commit
    /// can slip between the initial window and the watcher becoming visible
    /// to `notify`.
    pub(crate) fn register<G: Deref<Target = Value>>(
        &self,
        query: CompiledQuery,
        snapshot: impl FnOnce() -> G,
    ) -> (u64, mpsc::UnboundedReceiver<Window>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watchers = self.watchers.write().expect("watcher registry poisoned");
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let watcher = Arc::new(Watcher {
            id,
            query,
            tx,
            last: Mutex::new(None),
        });
        watcher.deliver(&snapshot());
        watchers.insert(id, watcher);
        (id, rx)
    }

    /// Drop a watcher. Blocks until any in-flight delivery pass completes,
    /// which is what makes subscription cancel final.
    pub(crate) fn remove(&self, id: u64) {
        self.watchers
            .write()
            .expect("watcher registry poisoned")
            .remove(&id);
    }

    /// Recompute and deliver to every watcher overlapping `path`. The tree
    /// snapshot is only taken when at least one watcher is affected.
    pub(crate) fn notify<G: Deref<Target = Value>>(
        &self,
        path: &TreePath,
        snapshot: impl FnOnce() -> G,
    ) {
        let watchers = self.watchers.read().expect("watcher registry poisoned");
        let affected: Vec<&Arc<Watcher>> =
            watchers.values().filter(|w| w.covers(path)).collect();
        if affected.is_empty() {
            return;
        }
        let root = snapshot();
        for watcher in affected {
            watcher.deliver(&root);
        }
    }

    /// Drop every watcher, closing all delivery channels. Returns how many
    /// were live.
    pub(crate) fn clear(&self) -> usize {
        let mut watchers = self.watchers.write().expect("watcher registry poisoned");
        let count = watchers.len();
        watchers.clear();
        count
    }
}

/// Clonable handle that stops a subscription's feed from anywhere.
#[derive(Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
    unregister: Arc<dyn Fn() + Send + Sync>,
}

impl CancelHandle {
    pub(crate) fn new(unregister: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            unregister: Arc::new(unregister),
        }
    }

    /// Idempotent. The first call unregisters the watcher and blocks until
    /// any delivery pass touching it has finished; later calls return
    /// immediately.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            (self.unregister)();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// The receiving end of a live query.
///
/// Windows arrive in commit order; consecutive identical windows are
/// coalesced at the source. Dropping the subscription cancels it.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Window>,
    cancel: CancelHandle,
}

impl Subscription {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<Window>, cancel: CancelHandle) -> Self {
        Self { rx, cancel }
    }

    /// Wait for the next window. Returns `None` once the subscription is
    /// cancelled or its store has shut down; windows queued before a cancel
    /// are discarded, not replayed.
    pub async fn recv(&mut self) -> Option<Window> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let window = self.rx.recv().await;
        if self.cancel.is_cancelled() {
            return None;
        }
        window
    }

    /// Stop the feed. Idempotent; once this returns, no further window is
    /// delivered.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.rx.close();
    }

    /// A handle for cancelling from another task.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::TreeQuery;
    use serde_json::json;
    use tokio::sync::mpsc::error::TryRecvError;

    fn watch(registry: &WatchRegistry, path: &str, root: &Value) -> (u64, mpsc::UnboundedReceiver<Window>) {
        let query = TreeQuery::at(TreePath::parse(path).unwrap())
            .compile()
            .unwrap();
        registry.register(query, || root)
    }

    #[test]
    fn test_register_delivers_initial_window() {
        let registry = WatchRegistry::new();
        let root = json!({ "a": { "x": 1 } });
        let (_, mut rx) = watch(&registry, "a", &root);
        assert_eq!(rx.try_recv().unwrap(), vec![("x".to_string(), json!(1))]);
    }

    #[test]
    fn test_notify_skips_disjoint_paths_and_unchanged_windows() {
        let registry = WatchRegistry::new();
        let root = json!({ "a": { "x": 1 }, "b": { "y": 2 } });
        let (_, mut rx) = watch(&registry, "a", &root);
        rx.try_recv().unwrap();

        // Disjoint mutation path: watcher not even recomputed.
        registry.notify(&TreePath::parse("b/y").unwrap(), || &root);
        assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Empty);

        // Overlapping path but identical window: coalesced.
        registry.notify(&TreePath::parse("a/x").unwrap(), || &root);
        assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Empty);

        // Overlapping path with a real change.
        let changed = json!({ "a": { "x": 9 }, "b": { "y": 2 } });
        registry.notify(&TreePath::parse("a/x").unwrap(), || &changed);
        assert_eq!(rx.try_recv().unwrap(), vec![("x".to_string(), json!(9))]);
    }

    #[test]
    fn test_ancestor_mutation_reaches_watcher() {
        let registry = WatchRegistry::new();
        let root = json!({ "a": { "x": 1 } });
        let (_, mut rx) = watch(&registry, "a", &root);
        rx.try_recv().unwrap();

        // Deleting above the query root empties the window.
        let cleared = Value::Null;
        registry.notify(&TreePath::root(), || &cleared);
        assert_eq!(rx.try_recv().unwrap(), Vec::<(String, Value)>::new());
    }

    #[test]
    fn test_remove_then_clear_close_channels() {
        let registry = WatchRegistry::new();
        let root = json!({ "a": { "x": 1 } });
        let (id, mut rx) = watch(&registry, "a", &root);
        rx.try_recv().unwrap();

        registry.remove(id);
        assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Disconnected);

        let (_, mut rx2) = watch(&registry, "a", &root);
        rx2.try_recv().unwrap();
        assert_eq!(registry.clear(), 1);
        assert_eq!(rx2.try_recv().unwrap_err(), TryRecvError::Disconnected);
    }

    #[tokio::test]
    async fn test_subscription_cancel_is_idempotent_and_discards_queued() {
        let unregistered = Arc::new(AtomicU64::new(0));
        let counter = unregistered.clone();
        let (tx, rx) = mpsc::unbounded_channel();
        let mut sub = Subscription::new(
            rx,
            CancelHandle::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        tx.send(vec![("k".to_string(), json!(1))]).unwrap();
        sub.cancel();
        sub.cancel();
        assert_eq!(unregistered.load(Ordering::SeqCst), 1);
        // The queued window is dropped rather than replayed.
        assert_eq!(sub.recv().await, None);

        drop(sub);
        assert_eq!(unregistered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_handle_wakes_parked_receiver() {
        let registry = Arc::new(WatchRegistry::new());
        let root = json!({ "a": { "x": 1 } });
        let (id, rx) = watch(&registry, "a", &root);
        let unregister = {
            let registry = registry.clone();
            move || registry.remove(id)
        };
        let mut sub = Subscription::new(rx, CancelHandle::new(unregister));
        assert!(sub.recv().await.is_some());

        let handle = sub.cancel_handle();
        let waiter = tokio::spawn(async move { sub.recv().await });
        // Removing the watcher drops its sender, which wakes the receiver.
        handle.cancel();
        assert_eq!(waiter.await.unwrap(), None);
    }
}
