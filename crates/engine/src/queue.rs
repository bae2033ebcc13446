//! In-memory, insertion-ordered batch queue.

use std::sync::Mutex;

use batchline_core::{BatchItem, ItemId};

use crate::sync::lock;

/// Pending items awaiting a flush.
///
/// `push` and `drain` are serialized by one short critical section, so a push
/// racing a drain lands either in the drained snapshot or in the fresh buffer,
/// never both and never neither.
#[derive(Debug)]
pub struct BatchQueue<T> {
    items: Mutex<Vec<BatchItem<T>>>,
}

impl<T> Default for BatchQueue<T> {
    fn default() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }
}

impl<T> BatchQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item, returning the queue length afterwards.
    pub fn push(&self, item: BatchItem<T>) -> usize {
        let mut items = lock(&self.items);
        items.push(item);
        items.len()
    }

    /// Take everything currently queued, leaving an empty buffer behind.
    pub fn drain(&self) -> Vec<BatchItem<T>> {
        std::mem::take(&mut *lock(&self.items))
    }

    /// Drop everything queued, returning how many items were discarded.
    pub fn clear(&self) -> usize {
        let dropped = self.drain();
        dropped.len()
    }

    pub fn len(&self) -> usize {
        lock(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.items).is_empty()
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        lock(&self.items).iter().any(|item| &item.id == id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn push_reports_length() {
        let queue = BatchQueue::new();
        assert_eq!(queue.push(BatchItem::new("a")), 1);
        assert_eq!(queue.push(BatchItem::new("b")), 2);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn drain_resets_the_queue() {
        let queue = BatchQueue::new();
        queue.push(BatchItem::new(1));
        queue.push(BatchItem::new(2));

        let drained = queue.drain();

        assert_eq!(drained.len(), 2);
        assert!(queue.is_empty());
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn contains_tracks_membership() {
        let queue = BatchQueue::new();
        let item = BatchItem::new("x");
        let id = item.id;

        queue.push(item);
        assert!(queue.contains(&id));

        assert_eq!(queue.clear(), 1);
        assert!(!queue.contains(&id));
    }

    #[test]
    fn concurrent_pushes_and_drains_lose_nothing() {
        let queue = Arc::new(BatchQueue::new());
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let queue = queue.clone();
                thread::spawn(move || {
                    for i in 0..500 {
                        queue.push(BatchItem::new(w * 1000 + i));
                    }
                })
            })
            .collect();

        let mut seen = Vec::new();
        while writers.iter().any(|h| !h.is_finished()) {
            seen.extend(queue.drain());
        }
        for w in writers {
            w.join().unwrap();
        }
        seen.extend(queue.drain());

        let mut payloads: Vec<i32> = seen.iter().map(|item| item.payload).collect();
        payloads.sort_unstable();
        payloads.dedup();
        assert_eq!(payloads.len(), 2000);
        assert_eq!(seen.len(), 2000);
    }

    proptest! {
        /// Property: drained snapshots, concatenated, reproduce push order.
        #[test]
        fn drains_preserve_fifo(
            values in prop::collection::vec(any::<u16>(), 0..100),
            cuts in prop::collection::vec(any::<bool>(), 100),
        ) {
            let queue = BatchQueue::new();
            let mut out = Vec::new();

            for (i, v) in values.iter().enumerate() {
                queue.push(BatchItem::new(*v));
                if cuts[i] {
                    out.extend(queue.drain().into_iter().map(|item| item.payload));
                }
            }
            out.extend(queue.drain().into_iter().map(|item| item.payload));

            prop_assert_eq!(out, values);
        }
    }
}
