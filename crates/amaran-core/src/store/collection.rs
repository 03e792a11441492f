// ── Generic entity collection ──
//
// Concurrent keyed storage with an ordered snapshot held in a `watch`
// channel. Snapshots keep insertion order, which for directory lists is
// the order the desktop app reported them in.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;

/// A reactive collection for a single entity type.
///
/// Every mutation rebuilds the ordered snapshot that subscribers receive.
pub(crate) struct EntityCollection<T: Clone + Send + Sync + 'static> {
    /// key -> (insertion sequence, entity)
    by_key: DashMap<String, (u64, Arc<T>)>,

    next_seq: AtomicU64,

    /// Full ordered snapshot, rebuilt on mutation.
    snapshot: watch::Sender<Arc<Vec<Arc<T>>>>,
}

impl<T: Clone + Send + Sync + 'static> EntityCollection<T> {
    pub(crate) fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            by_key: DashMap::new(),
            next_seq: AtomicU64::new(0),
            snapshot,
        }
    }

    /// Replace the whole collection, keeping the given order.
    ///
    /// Later duplicates of a key overwrite earlier ones in place.
    pub(crate) fn replace_all(&self, entries: impl IntoIterator<Item = (String, T)>) {
        self.by_key.clear();
        for (key, entity) in entries {
            match self.by_key.entry(key) {
                Entry::Occupied(mut occupied) => occupied.get_mut().1 = Arc::new(entity),
                Entry::Vacant(vacant) => {
                    let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                    vacant.insert((seq, Arc::new(entity)));
                }
            }
        }
        self.rebuild_snapshot();
    }

    /// Read-modify-write one entry under its shard lock.
    ///
    /// `f` sees `None` for a missing key. Leaving the slot `None` removes
    /// the entry. Returns the stored value afterwards.
    pub(crate) fn update(&self, key: String, f: impl FnOnce(&mut Option<T>)) -> Option<Arc<T>> {
        let result = match self.by_key.entry(key) {
            Entry::Occupied(mut occupied) => {
                let mut slot = Some(T::clone(&occupied.get().1));
                f(&mut slot);
                match slot {
                    Some(entity) => {
                        let entity = Arc::new(entity);
                        occupied.get_mut().1 = Arc::clone(&entity);
                        Some(entity)
                    }
                    None => {
                        occupied.remove();
                        None
                    }
                }
            }
            Entry::Vacant(vacant) => {
                let mut slot = None;
                f(&mut slot);
                let entity = Arc::new(slot?);
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                vacant.insert((seq, Arc::clone(&entity)));
                Some(entity)
            }
        };
        self.rebuild_snapshot();
        result
    }

    pub(crate) fn get(&self, key: &str) -> Option<Arc<T>> {
        self.by_key.get(key).map(|r| Arc::clone(&r.value().1))
    }

    /// Get the current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn clear(&self) {
        self.by_key.clear();
        self.rebuild_snapshot();
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn rebuild_snapshot(&self) {
        let mut values: Vec<(u64, Arc<T>)> = self
            .by_key
            .iter()
            .map(|r| (r.value().0, Arc::clone(&r.value().1)))
            .collect();
        values.sort_by_key(|(seq, _)| *seq);
        let values: Vec<Arc<T>> = values.into_iter().map(|(_, v)| v).collect();
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}
