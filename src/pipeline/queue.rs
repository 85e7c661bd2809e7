//! Bounded queue with a drop-oldest overflow policy.
//!
//! Producers never block: pushing into a full queue discards the oldest
//! entry and then enqueues the new one, so occupancy never exceeds the
//! capacity and the newest data always survives. The single consumer
//! parks in [`DropOldestQueue::recv`] until a producer pushes.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

/// Bounded multi-producer, single-consumer FIFO.
#[derive(Debug)]
pub struct DropOldestQueue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    ready: Notify,
}

impl<T> DropOldestQueue<T> {
    /// Create a queue holding at most `capacity` items (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            ready: Notify::new(),
        }
    }

    fn items(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue `item`, wake the consumer, and return the entry displaced
    /// to make room for it, if any.
    pub fn push(&self, item: T) -> Option<T> {
        let mut items = self.items();
        let displaced = if items.len() >= self.capacity {
            items.pop_front()
        } else {
            None
        };
        items.push_back(item);
        drop(items);

        self.ready.notify_one();
        displaced
    }

    /// Dequeue the oldest item without waiting.
    pub fn pop(&self) -> Option<T> {
        self.items().pop_front()
    }

    /// Dequeue the oldest item, parking until one is available.
    ///
    /// Cancel safe: dropping the future never loses an item.
    pub async fn recv(&self) -> T {
        loop {
            if let Some(item) = self.pop() {
                return item;
            }
            self.ready.notified().await;
        }
    }

    /// Park until the queue holds at least one item, without taking it.
    pub async fn wait_non_empty(&self) {
        while self.is_empty() {
            self.ready.notified().await;
        }
    }

    /// Make room ahead of time: drop the oldest entry if the queue is full.
    pub fn discard_oldest_if_full(&self) -> Option<T> {
        let mut items = self.items();
        if items.len() >= self.capacity {
            items.pop_front()
        } else {
            None
        }
    }

    /// Wake the consumer without enqueueing. A no-op if it is already runnable.
    pub fn wake_consumer(&self) {
        self.ready.notify_one();
    }

    /// Remove and return everything, oldest first.
    pub fn drain(&self) -> Vec<T> {
        self.items().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
