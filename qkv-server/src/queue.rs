//! # Connection Queue
//!
//! Unbounded FIFO between the acceptor and the worker pool.
//!
//! ## Design Principles
//!
//! 1. **Single Lock**: Push and pop serialize on one `parking_lot::Mutex`; the
//!    lock is never held across an `.await`.
//! 2. **Hand-Off, Not Polling**: Each `push` calls `Notify::notify_one`, so an
//!    idle worker sleeps in `pop` until there is work and exactly one sleeper
//!    wakes per item.
//! 3. **Move Semantics**: An item leaves the queue by value, so at most one
//!    consumer can ever own it.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// FIFO queue of accepted-but-unserved connections.
#[derive(Debug)]
pub struct ConnectionQueue<T> {
    items: Mutex<VecDeque<T>>,
    available: Notify,
}

impl<T> Default for ConnectionQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ConnectionQueue<T> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        ConnectionQueue {
            items: Mutex::new(VecDeque::new()),
            available: Notify::new(),
        }
    }

    /// Appends an item at the tail and wakes one waiting consumer.
    ///
    /// Never blocks and never fails.
    pub fn push(&self, item: T) {
        self.items.lock().push_back(item);
        self.available.notify_one();
    }

    /// Removes the head item if there is one.
    pub fn try_pop(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Waits until an item is available and removes it.
    ///
    /// Cancel safe: an item is only removed in the same poll that returns it.
    pub async fn pop(&self) -> T {
        loop {
            // Register interest before checking, so a push landing between the
            // check and the await still leaves a permit behind.
            let notified = self.available.notified();
            if let Some(item) = self.try_pop() {
                return item;
            }
            notified.await;
        }
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Returns true when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Removes every queued item, oldest first.
    pub fn drain(&self) -> Vec<T> {
        self.items.lock().drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn pops_in_arrival_order() {
        let queue = ConnectionQueue::new();
        queue.push(1);
        queue.push(2);
        queue.push(3);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.try_pop(), Some(1));
        assert_eq!(queue.try_pop(), Some(2));
        assert_eq!(queue.try_pop(), Some(3));
        assert_eq!(queue.try_pop(), None);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn pop_waits_for_push() {
        let queue = Arc::new(ConnectionQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!consumer.is_finished());

        queue.push("conn");
        let item = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item, "conn");
    }

    #[tokio::test]
    async fn pop_returns_items_pushed_before_waiting() {
        let queue = ConnectionQueue::new();
        queue.push(7);
        queue.push(8);
        assert_eq!(queue.pop().await, 7);
        assert_eq!(queue.pop().await, 8);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_consumers_never_share_an_item() {
        const ITEMS: usize = 2_000;
        const CONSUMERS: usize = 6;

        let queue = Arc::new(ConnectionQueue::new());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let consumers: Vec<_> = (0..CONSUMERS)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let tx = tx.clone();
                tokio::spawn(async move {
                    loop {
                        let item: usize = queue.pop().await;
                        if item == usize::MAX {
                            break;
                        }
                        tx.send(item).unwrap();
                    }
                })
            })
            .collect();
        drop(tx);

        for i in 0..ITEMS {
            queue.push(i);
        }
        for _ in 0..CONSUMERS {
            queue.push(usize::MAX);
        }
        for consumer in consumers {
            consumer.await.unwrap();
        }

        let mut seen = HashSet::new();
        while let Some(item) = rx.recv().await {
            assert!(seen.insert(item), "item {item} delivered twice");
        }
        assert_eq!(seen.len(), ITEMS);
    }

    #[test]
    fn drain_empties_the_queue() {
        let queue = ConnectionQueue::new();
        queue.push('a');
        queue.push('b');
        assert_eq!(queue.drain(), vec!['a', 'b']);
        assert!(queue.is_empty());
    }
}
