//! Growable blocking work queue for directory tasks.
//!
//! Multiple producers (workers discovering subdirectories) and multiple
//! consumers (idle workers) share one queue. Producers never block: the
//! backing buffer grows by doubling instead of rejecting inserts. Consumers
//! block only when the queue is empty and not yet closed. Closing is
//! idempotent, wakes every blocked consumer, and lets remaining items drain
//! before `pop` starts returning `None`.
//!
//! Insertion order from a single producer is preserved (directory-scan
//! locality); no cross-producer ordering is guaranteed.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Blocking, closeable MPMC queue with one coarse lock/condvar pair.
pub struct TaskQueue<T> {
    state: Mutex<QueueState<T>>,
    available: Condvar,
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TaskQueue<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Append one item and wake one waiting consumer. Items pushed after
    /// close are dropped.
    pub fn push(&self, item: T) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.items.push_back(item);
        drop(state);
        self.available.notify_one();
    }

    /// Append a batch and wake all waiting consumers.
    pub fn push_many(&self, items: impl IntoIterator<Item = T>) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.items.extend(items);
        drop(state);
        self.available.notify_all();
    }

    /// Block until an item is available or the queue is closed with no
    /// remaining items, in which case `None` signals "no more work".
    pub fn pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            if state.closed {
                return None;
            }
            self.available.wait(&mut state);
        }
    }

    /// Close the queue: idempotent, wakes all blocked consumers. Items
    /// still queued remain poppable.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        drop(state);
        self.available.notify_all();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn push_pop_preserves_producer_order() {
        let queue = TaskQueue::new();
        queue.push(1);
        queue.push(2);
        queue.push_many([3, 4]);
        assert_eq!(queue.len(), 4);
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
        assert_eq!(queue.pop(), Some(4));
    }

    #[test]
    fn close_is_idempotent_and_drains() {
        let queue = TaskQueue::new();
        queue.push(7);
        queue.close();
        queue.close();
        assert!(queue.is_closed());
        // Remaining item drains before the end-of-work signal.
        assert_eq!(queue.pop(), Some(7));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn push_after_close_is_dropped() {
        let queue = TaskQueue::new();
        queue.close();
        queue.push(1);
        queue.push_many([2, 3]);
        assert!(queue.is_empty());
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn pop_blocks_until_item_arrives() {
        let queue = Arc::new(TaskQueue::new());
        let producer = Arc::clone(&queue);
        let handle = thread::spawn(move || queue.pop());
        thread::sleep(Duration::from_millis(50));
        producer.push(42);
        assert_eq!(handle.join().unwrap(), Some(42));
    }

    #[test]
    fn close_unblocks_all_waiting_consumers() {
        let queue: Arc<TaskQueue<u32>> = Arc::new(TaskQueue::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || queue.pop())
            })
            .collect();
        thread::sleep(Duration::from_millis(50));
        queue.close();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), None);
        }
    }

    #[test]
    fn many_producers_many_consumers_deliver_everything() {
        let queue = Arc::new(TaskQueue::new());
        let per_producer = 500u32;

        let producers: Vec<_> = (0u32..4)
            .map(|p| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..per_producer {
                        queue.push(p * per_producer + i);
                    }
                })
            })
            .collect();

        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    let mut seen = Vec::new();
                    while let Some(item) = queue.pop() {
                        seen.push(item);
                    }
                    seen
                })
            })
            .collect();

        for producer in producers {
            producer.join().unwrap();
        }
        queue.close();

        let mut all: Vec<u32> = consumers
            .into_iter()
            .flat_map(|c| c.join().unwrap())
            .collect();
        all.sort_unstable();
        let expected: Vec<u32> = (0..4 * per_producer).collect();
        assert_eq!(all, expected);
    }
}
