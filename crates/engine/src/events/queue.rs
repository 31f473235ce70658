//! Thread-safe FIFO with blocking pop and cooperative shutdown.
//!
//! This is the only primitive in the engine that supports a blocking wait:
//! consumers can park on `pop` or `pop_timeout`, and `shutdown` wakes every
//! waiter with `None` so a draining thread can exit cleanly.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug)]
struct Inner<T> {
    items: VecDeque<T>,
    shutdown: bool,
}

/// Many-producer many-consumer queue.
#[derive(Debug)]
pub struct EventQueue<T> {
    inner: Mutex<Inner<T>>,
    available: Condvar,
}

impl<T> Default for EventQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventQueue<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                shutdown: false,
            }),
            available: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an item and wake one waiting consumer.
    pub fn push(&self, item: T) {
        self.lock().items.push_back(item);
        self.available.notify_one();
    }

    /// Pop without blocking. `None` when the queue is empty.
    pub fn try_pop(&self) -> Option<T> {
        self.lock().items.pop_front()
    }

    /// Block until an item is available or the queue is shut down.
    ///
    /// Returns `None` only after `shutdown` with the queue drained.
    pub fn pop(&self) -> Option<T> {
        let mut inner = self.lock();
        loop {
            if let Some(item) = inner.items.pop_front() {
                return Some(item);
            }
            if inner.shutdown {
                return None;
            }
            inner = self
                .available
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block up to `timeout` for an item.
    ///
    /// Returns `None` on timeout, or after `shutdown` with the queue
    /// drained.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = std::time::Instant::now() + timeout;
        let mut inner = self.lock();
        loop {
            if let Some(item) = inner.items.pop_front() {
                return Some(item);
            }
            if inner.shutdown {
                return None;
            }
            let remaining = deadline.checked_duration_since(std::time::Instant::now())?;
            let (guard, result) = self
                .available
                .wait_timeout(inner, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            inner = guard;
            if result.timed_out() && inner.items.is_empty() {
                return None;
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Wake every waiter; subsequent blocking pops on an empty queue return
    /// `None`. Items already queued can still be drained.
    pub fn shutdown(&self) {
        self.lock().shutdown = true;
        self.available.notify_all();
    }

    /// Clear the shutdown flag so the queue can be reused.
    pub fn reset(&self) {
        self.lock().shutdown = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn push_pop_is_fifo() {
        let queue = EventQueue::new();
        queue.push(1);
        queue.push(2);
        queue.push(3);
        assert_eq!(queue.try_pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop_timeout(Duration::from_millis(10)), Some(3));
        assert!(queue.is_empty());
    }

    #[test]
    fn try_pop_on_empty_is_none() {
        let queue: EventQueue<i32> = EventQueue::new();
        assert_eq!(queue.try_pop(), None);
    }

    #[test]
    fn pop_timeout_expires() {
        let queue: EventQueue<i32> = EventQueue::new();
        let start = std::time::Instant::now();
        assert_eq!(queue.pop_timeout(Duration::from_millis(30)), None);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn blocking_pop_sees_item_from_another_thread() {
        let queue = Arc::new(EventQueue::new());
        let producer = Arc::clone(&queue);

        let consumer = std::thread::spawn(move || queue.pop());
        std::thread::sleep(Duration::from_millis(20));
        producer.push(42);

        assert_eq!(consumer.join().unwrap(), Some(42));
    }

    #[test]
    fn shutdown_wakes_all_waiters() {
        let queue: Arc<EventQueue<i32>> = Arc::new(EventQueue::new());

        let mut waiters = Vec::new();
        for _ in 0..3 {
            let queue = Arc::clone(&queue);
            waiters.push(std::thread::spawn(move || queue.pop()));
        }
        std::thread::sleep(Duration::from_millis(20));
        queue.shutdown();

        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), None);
        }
    }

    #[test]
    fn queued_items_survive_shutdown() {
        let queue = EventQueue::new();
        queue.push("left over");
        queue.shutdown();
        assert_eq!(queue.pop(), Some("left over"));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn reset_allows_reuse() {
        let queue: EventQueue<i32> = EventQueue::new();
        queue.shutdown();
        assert_eq!(queue.pop(), None);
        queue.reset();
        queue.push(1);
        assert_eq!(queue.pop(), Some(1));
    }
}
