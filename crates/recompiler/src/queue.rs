//! Work queues between the execution thread and the compiler thread.
//!
//! Two FIFO queues connect the threads:
//!
//! - the input queue ([`InputQueue`]) carries jobs to the compiler thread
//!   and pairs the items with a counting [`WakeSignal`], so a consumer can
//!   block until there is work (or until someone wakes it for shutdown);
//! - the output queue ([`WorkQueue`]) carries compiled jobs back. Its
//!   consumer peeks at the front and only dequeues once it has decided the
//!   front job is safe to install.
//!
//! Every operation takes the queue mutex, so an enqueued item is fully
//! visible to whichever thread dequeues it.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

/// Thread-safe FIFO queue with non-blocking peek and dequeue.
#[derive(Debug)]
pub struct WorkQueue<T> {
    items: Mutex<VecDeque<T>>,
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
        }
    }

    /// Append an item at the back.
    pub fn enqueue(&self, item: T) {
        #[expect(clippy::unwrap_used, reason = "Mutex poisoning is unrecoverable")]
        let mut items = self.items.lock().unwrap();
        items.push_back(item);
    }

    /// Remove and return the front item, if any.
    pub fn dequeue(&self) -> Option<T> {
        #[expect(clippy::unwrap_used, reason = "Mutex poisoning is unrecoverable")]
        let mut items = self.items.lock().unwrap();
        items.pop_front()
    }

    /// Inspect the front item without removing it.
    ///
    /// `inspect` runs with the queue locked; keep it short and do not touch
    /// the same queue from inside it.
    pub fn peek<R>(&self, inspect: impl FnOnce(&T) -> R) -> Option<R> {
        #[expect(clippy::unwrap_used, reason = "Mutex poisoning is unrecoverable")]
        let items = self.items.lock().unwrap();
        items.front().map(inspect)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        #[expect(clippy::unwrap_used, reason = "Mutex poisoning is unrecoverable")]
        let items = self.items.lock().unwrap();
        items.len()
    }
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Counting wake-up signal.
///
/// Each `signal()` adds one permit and each `wait()` consumes one, blocking
/// while none are available. A signal sent while nobody waits is remembered,
/// so the next `wait()` returns immediately.
#[derive(Debug, Default)]
pub struct WakeSignal {
    permits: Mutex<usize>,
    available: Condvar,
}

impl WakeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) {
        #[expect(clippy::unwrap_used, reason = "Mutex poisoning is unrecoverable")]
        let mut permits = self.permits.lock().unwrap();
        *permits = permits.saturating_add(1);
        self.available.notify_one();
    }

    /// Block until a permit is available, then consume it.
    pub fn wait(&self) {
        #[expect(clippy::unwrap_used, reason = "Mutex poisoning is unrecoverable")]
        let permits = self.permits.lock().unwrap();
        #[expect(clippy::unwrap_used, reason = "Mutex poisoning is unrecoverable")]
        let mut permits = self
            .available
            .wait_while(permits, |permits| *permits == 0)
            .unwrap();
        *permits = permits.saturating_sub(1);
    }

    /// Number of signals not yet consumed.
    #[cfg(test)]
    pub(crate) fn pending_permits(&self) -> usize {
        #[expect(clippy::unwrap_used, reason = "Mutex poisoning is unrecoverable")]
        let permits = self.permits.lock().unwrap();
        *permits
    }
}

/// Input side: a [`WorkQueue`] whose enqueues wake a blocked consumer.
#[derive(Debug)]
pub struct InputQueue<T> {
    queue: WorkQueue<T>,
    signal: WakeSignal,
}

impl<T> InputQueue<T> {
    pub fn new() -> Self {
        Self {
            queue: WorkQueue::new(),
            signal: WakeSignal::new(),
        }
    }

    /// Append an item and signal the consumer once.
    pub fn enqueue(&self, item: T) {
        self.queue.enqueue(item);
        self.signal.signal();
    }

    /// Signal the consumer without adding an item (used to wake it for stop).
    pub fn wake(&self) {
        self.signal.signal();
    }

    /// Block until a signal arrives. Does not remove an item.
    pub fn wait(&self) {
        self.signal.wait();
    }

    /// Remove the front item without waiting.
    pub fn try_dequeue(&self) -> Option<T> {
        self.queue.dequeue()
    }

    /// Block until an item is available, then remove it.
    ///
    /// Bare wake-ups (from [`InputQueue::wake`]) are consumed and waited past.
    #[cfg(test)]
    pub(crate) fn dequeue(&self) -> T {
        loop {
            self.signal.wait();
            if let Some(item) = self.queue.dequeue() {
                return item;
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }
}

impl<T> Default for InputQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_work_queue_is_fifo() {
        let queue = WorkQueue::new();
        queue.enqueue("a");
        queue.enqueue("b");
        queue.enqueue("c");

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dequeue(), Some("a"));
        assert_eq!(queue.dequeue(), Some("b"));
        assert_eq!(queue.dequeue(), Some("c"));
        assert_eq!(queue.dequeue(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_peek_does_not_remove() {
        let queue = WorkQueue::new();
        assert_eq!(queue.peek(|item: &u32| *item), None);

        queue.enqueue(7u32);
        queue.enqueue(8u32);
        assert_eq!(queue.peek(|item| *item), Some(7));
        assert_eq!(queue.peek(|item| *item), Some(7));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dequeue(), Some(7));
        assert_eq!(queue.peek(|item| *item), Some(8));
    }

    #[test]
    fn test_signal_before_wait_is_remembered() {
        let signal = WakeSignal::new();
        signal.signal();
        signal.signal();
        assert_eq!(signal.pending_permits(), 2);

        // Neither wait blocks: both permits were banked.
        signal.wait();
        signal.wait();
        assert_eq!(signal.pending_permits(), 0);
    }

    #[test]
    fn test_blocking_dequeue_wakes_on_enqueue() {
        let queue = Arc::new(InputQueue::new());
        let (tx, rx) = mpsc::channel();

        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let item: u32 = queue.dequeue();
                tx.send(item).ok();
            })
        };

        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        queue.enqueue(42);
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).ok(), Some(42));
        consumer.join().ok();
    }

    #[test]
    fn test_bare_wake_does_not_yield_an_item() {
        let queue = InputQueue::<u32>::new();
        queue.wake();
        queue.wait();
        assert_eq!(queue.try_dequeue(), None);

        queue.wake();
        queue.enqueue(5);
        // The bare wake-up is consumed first, then the real item is returned.
        assert_eq!(queue.dequeue(), 5);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_concurrent_producer_consumer_preserves_order() {
        const ITEMS: u32 = 1_000;
        let queue = Arc::new(InputQueue::new());

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..ITEMS {
                    queue.enqueue(i);
                }
            })
        };

        let received: Vec<u32> = (0..ITEMS).map(|_| queue.dequeue()).collect();
        producer.join().ok();

        assert_eq!(received, (0..ITEMS).collect::<Vec<_>>());
        assert!(queue.is_empty());
    }
}
