//! Fixed-capacity circular FIFO used for command queues and request queues.
//!
//! A [`BoundedQueue`] never grows. Pushing onto a full queue fails with
//! [`QueueError::CapacityExceeded`] and leaves the queue untouched, which turns a
//! runaway producer into an observable error instead of unbounded memory use.
//!
//! # Example
//!
//! ```
//! use jxn_core::queue::BoundedQueue;
//!
//! let mut queue = BoundedQueue::new(2);
//! queue.push("a")?;
//! queue.push("b")?;
//! assert!(queue.is_full());
//! assert!(queue.push("c").is_err());
//!
//! assert_eq!(queue.pop(), Some("a"));
//! queue.push_front("z")?;
//! assert_eq!(queue.pop(), Some("z"));
//! assert_eq!(queue.pop(), Some("b"));
//! assert_eq!(queue.pop(), None);
//! # Ok::<(), jxn_core::queue::QueueError>(())
//! ```

use thiserror::Error;

/// Errors raised by [`BoundedQueue`] operations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// A push was attempted on a full queue.
    #[error("Queue capacity exceeded (capacity {capacity})")]
    CapacityExceeded {
        /// The fixed capacity of the queue that rejected the push
        capacity: usize,
    },
}

/// Fixed-capacity circular FIFO buffer.
///
/// `start` points at the head slot, `end` at the slot the next `push` writes.
/// Both wrap around the backing store. `count` is always the number of live
/// entries.
#[derive(Debug, Clone)]
pub struct BoundedQueue<T> {
    slots: Vec<Option<T>>,
    start: usize,
    end: usize,
    count: usize,
    paused: bool,
}

impl<T> BoundedQueue<T> {
    /// Create an empty queue holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            start: 0,
            end: 0,
            count: 0,
            paused: false,
        }
    }

    /// Maximum number of entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of live entries.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    /// `true` when the queue holds no entries.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// `true` when a further push would fail.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.count == self.slots.len()
    }

    /// Append an entry at the tail.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::CapacityExceeded`] if the queue is full. The
    /// queue is not modified in that case.
    pub fn push(&mut self, item: T) -> Result<(), QueueError> {
        if self.is_full() {
            return Err(QueueError::CapacityExceeded {
                capacity: self.capacity(),
            });
        }
        self.slots[self.end] = Some(item);
        self.end = self.wrap_forward(self.end);
        self.count += 1;
        Ok(())
    }

    /// Insert an entry at the head so it is the next one popped.
    ///
    /// On an empty queue this behaves exactly like [`push`](Self::push).
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::CapacityExceeded`] if the queue is full.
    pub fn push_front(&mut self, item: T) -> Result<(), QueueError> {
        if self.is_empty() {
            return self.push(item);
        }
        if self.is_full() {
            return Err(QueueError::CapacityExceeded {
                capacity: self.capacity(),
            });
        }
        self.start = self.wrap_backward(self.start);
        self.slots[self.start] = Some(item);
        self.count += 1;
        Ok(())
    }

    /// Remove and return the head entry.
    pub fn pop(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let item = self.slots[self.start].take();
        self.start = self.wrap_forward(self.start);
        self.count -= 1;
        item
    }

    /// Look at the head entry without removing it.
    #[must_use]
    pub fn peek(&self) -> Option<&T> {
        if self.is_empty() {
            return None;
        }
        self.slots[self.start].as_ref()
    }

    /// Mark the queue as paused. Only command queues use this flag.
    pub const fn pause(&mut self) {
        self.paused = true;
    }

    /// Clear the paused flag.
    pub const fn unpause(&mut self) {
        self.paused = false;
    }

    /// Whether a handler has paused the queue.
    #[must_use]
    pub const fn is_paused(&self) -> bool {
        self.paused
    }

    /// Iterate over live entries from head to tail.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let capacity = self.capacity();
        (0..self.count).filter_map(move |offset| self.slots[(self.start + offset) % capacity].as_ref())
    }

    fn wrap_forward(&self, index: usize) -> usize {
        if index + 1 == self.slots.len() {
            0
        } else {
            index + 1
        }
    }

    fn wrap_backward(&self, index: usize) -> usize {
        if index == 0 {
            self.slots.len() - 1
        } else {
            index - 1
        }
    }
}
