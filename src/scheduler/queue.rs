//! # Priority Wait Queue
//!
//! Holds requests that could not be admitted immediately. Higher priority
//! is served first; equal priorities are served in arrival order.
//!
//! ```text
//!     enqueue order:  a(1) b(2) c(1) d(3)
//!
//!     queue:  ┌────┬────┬────┬────┐
//!     head ─► │ d3 │ b2 │ a1 │ c1 │
//!             └────┴────┴────┴────┘
//!                            ▲    ▲
//!                            └────┴── FIFO among equal priority
//! ```
//!
//! A new entry is inserted in front of the first entry with a strictly
//! lower priority, which keeps insertion stable. Entries never move after
//! insertion.

use std::collections::VecDeque;

/// Stable priority queue: descending priority, FIFO among ties.
///
/// # Example
///
/// ```rust
/// use ratecache::PriorityWaitQueue;
///
/// let mut queue = PriorityWaitQueue::new();
/// queue.enqueue(1, "first low");
/// queue.enqueue(5, "urgent");
/// queue.enqueue(1, "second low");
///
/// assert_eq!(queue.dequeue(), Some("urgent"));
/// assert_eq!(queue.dequeue(), Some("first low"));
/// assert_eq!(queue.dequeue(), Some("second low"));
/// assert_eq!(queue.dequeue(), None);
/// ```
#[derive(Debug)]
pub struct PriorityWaitQueue<T> {
    entries: VecDeque<(i32, T)>,
}

impl<T> PriorityWaitQueue<T> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Inserts `item` before the first entry whose priority is strictly
    /// lower than `priority`.
    pub fn enqueue(&mut self, priority: i32, item: T) {
        let position = self
            .entries
            .iter()
            .position(|(existing, _)| *existing < priority)
            .unwrap_or(self.entries.len());
        self.entries.insert(position, (priority, item));
    }

    /// Removes and returns the head.
    pub fn dequeue(&mut self) -> Option<T> {
        self.entries.pop_front().map(|(_, item)| item)
    }

    /// Returns the head without removing it.
    pub fn peek(&self) -> Option<&T> {
        self.entries.front().map(|(_, item)| item)
    }

    /// Priority of the head entry.
    pub fn peek_priority(&self) -> Option<i32> {
        self.entries.front().map(|(priority, _)| *priority)
    }

    /// Number of waiting entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every entry, returning them in service order.
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.entries.drain(..).map(|(_, item)| item)
    }
}

impl<T> Default for PriorityWaitQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
