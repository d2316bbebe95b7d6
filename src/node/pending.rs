use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

/// Correlation-id keyed resolvers. An entry is removed exactly once: by `resolve`, or by
/// dropping its `Pending` handle (timeout, abort, or the waiter giving up).
pub(crate) struct PendingTable<K, V> {
    inner: Arc<Mutex<TableInner<K, V>>>,
}

struct TableInner<K, V> {
    next_generation: u64,
    entries: HashMap<K, (u64, oneshot::Sender<V>)>,
}

/// Waiter side of one entry.
pub(crate) struct Pending<K: Eq + Hash, V> {
    key: K,
    generation: u64,
    receiver: oneshot::Receiver<V>,
    table: Arc<Mutex<TableInner<K, V>>>,
}

impl<K: Eq + Hash + Clone, V> PendingTable<K, V> {
    pub fn new() -> Self {
        PendingTable {
            inner: Arc::new(Mutex::new(TableInner {
                next_generation: 0,
                entries: HashMap::new(),
            })),
        }
    }

    /// Registers `key`, replacing any stale entry under the same key.
    pub fn register(&self, key: K) -> Pending<K, V> {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock().expect("PendingTable mutex guard poison");
        let generation = inner.next_generation;
        inner.next_generation += 1;
        inner.entries.insert(key.clone(), (generation, tx));

        Pending {
            key,
            generation,
            receiver: rx,
            table: self.inner.clone(),
        }
    }

    /// Returns false if nobody is waiting on `key`.
    pub fn resolve(&self, key: &K, value: V) -> bool {
        let entry = self
            .inner
            .lock()
            .expect("PendingTable mutex guard poison")
            .entries
            .remove(key);

        match entry {
            Some((_, tx)) => tx.send(value).is_ok(),
            None => false,
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("PendingTable mutex guard poison").entries.len()
    }
}

impl<K: Eq + Hash, V> Pending<K, V> {
    /// `None` if the entry was replaced by a newer registration under the same key.
    pub async fn wait(&mut self) -> Option<V> {
        (&mut self.receiver).await.ok()
    }
}

impl<K: Eq + Hash, V> Drop for Pending<K, V> {
    fn drop(&mut self) {
        let mut inner = self.table.lock().expect("PendingTable mutex guard poison");
        let current = matches!(
            inner.entries.get(&self.key),
            Some((generation, _)) if *generation == self.generation
        );
        if current {
            inner.entries.remove(&self.key);
        }
    }
}
