use std::sync::Arc;

use tokio::sync::watch;

/// Shared, cloneable handle to the application state.
///
/// Every clone refers to the same state. Mutations are serialised: a
/// mutation runs while the store's write lock is held, so it must not call
/// back into the store.
pub struct Store<S> {
    tx: Arc<watch::Sender<Arc<S>>>,
}

impl<S> Clone for Store<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<S: Clone> Store<S> {
    /// Creates a store holding `initial`.
    pub fn new(initial: S) -> Self {
        let (tx, _) = watch::channel(Arc::new(initial));
        Self { tx: Arc::new(tx) }
    }

    /// Returns the current snapshot.
    pub fn snapshot(&self) -> Arc<S> {
        self.tx.borrow().clone()
    }

    /// Reads a value out of the current snapshot.
    pub fn select<T>(&self, selector: impl FnOnce(&S) -> T) -> T {
        selector(&self.tx.borrow())
    }

    /// Applies `mutate` to a draft of the current state and publishes the
    /// result as the new snapshot. Subscribers are notified.
    pub fn update(&self, mutate: impl FnOnce(&mut S)) {
        self.tx.send_modify(|current| {
            let mut draft = S::clone(current);
            mutate(&mut draft);
            *current = Arc::new(draft);
        });
    }

    /// Subscribes to snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<Arc<S>> {
        self.tx.subscribe()
    }
}
