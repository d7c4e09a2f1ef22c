use std::{
    collections::VecDeque,
    sync::{Arc, Condvar, Mutex},
};

use crate::error::DispatchError;

struct Inner<T> {
    items: Mutex<VecDeque<T>>,
    ready: Condvar,
    closed: std::sync::atomic::AtomicBool,
}

/// A blocking multi-producer, multi-consumer FIFO.
///
/// Each attached object designates one of these at `register_command` time;
/// the application thread that owns the object drains it with [`pop`].
/// `flush()` simply wakes any blocked consumer without pushing an item, so a
/// consumer that returned "not ready" on a previous pop (waiting on a later
/// mapping event) gets a chance to re-examine its held-back work.
#[derive(Clone)]
pub struct CommandQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Default for CommandQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CommandQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                items: Mutex::new(VecDeque::new()),
                ready: Condvar::new(),
                closed: std::sync::atomic::AtomicBool::new(false),
            }),
        }
    }

    pub fn push(&self, item: T) {
        self.inner.items.lock().unwrap().push_back(item);
        self.inner.ready.notify_one();
    }

    pub fn try_pop(&self) -> Option<T> {
        self.inner.items.lock().unwrap().pop_front()
    }

    /// Blocks until an item is available or the queue is closed.
    pub fn pop(&self) -> Result<T, DispatchError> {
        let mut items = self.inner.items.lock().unwrap();
        loop {
            if let Some(item) = items.pop_front() {
                return Ok(item);
            }
            if self.inner.closed.load(std::sync::atomic::Ordering::Acquire) {
                return Err(DispatchError::Closed);
            }
            items = self.inner.ready.wait(items).unwrap();
        }
    }

    /// Wakes every consumer blocked in [`pop`] without enqueuing anything,
    /// so a previously deferred command can be re-examined.
    pub fn flush(&self) {
        self.inner.ready.notify_all();
    }

    /// Unblocks every consumer permanently; subsequent `pop` calls drain
    /// remaining items then return `Err(DispatchError::Closed)`.
    pub fn close(&self) {
        self.inner.closed.store(true, std::sync::atomic::Ordering::Release);
        self.inner.ready.notify_all();
    }

    pub fn len(&self) -> usize {
        self.inner.items.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use super::*;

    #[test]
    fn pop_blocks_until_pushed() {
        let q: CommandQueue<u32> = CommandQueue::new();
        let q2 = q.clone();
        let handle = thread::spawn(move || q2.pop().unwrap());
        thread::sleep(Duration::from_millis(20));
        q.push(7);
        assert_eq!(handle.join().unwrap(), 7);
    }

    #[test]
    fn close_unblocks_waiting_consumers() {
        let q: CommandQueue<u32> = CommandQueue::new();
        let q2 = q.clone();
        let handle = thread::spawn(move || q2.pop());
        thread::sleep(Duration::from_millis(20));
        q.close();
        assert!(matches!(handle.join().unwrap(), Err(DispatchError::Closed)));
    }

    #[test]
    fn fifo_order_is_preserved() {
        let q: CommandQueue<u32> = CommandQueue::new();
        for i in 0..5 {
            q.push(i);
        }
        for i in 0..5 {
            assert_eq!(q.pop().unwrap(), i);
        }
    }
}
