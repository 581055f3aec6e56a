//! FIFO of jobs waiting for a worker.

use std::collections::VecDeque;

/// Jobs submitted while every worker was busy, oldest first.
///
/// Unbounded unless a maximum depth is given, in which case `push`
/// hands the entry back once the queue is full.
#[derive(Debug)]
pub struct PendingQueue<J> {
    entries: VecDeque<J>,
    max_depth: Option<usize>,
}

impl<J> PendingQueue<J> {
    pub fn new(max_depth: Option<usize>) -> Self {
        Self {
            entries: VecDeque::new(),
            max_depth,
        }
    }

    /// Append to the tail. Returns the new depth, or the entry itself when
    /// the queue is at its bound.
    pub fn push(&mut self, entry: J) -> Result<usize, J> {
        if self.is_full() {
            return Err(entry);
        }
        self.entries.push_back(entry);
        Ok(self.entries.len())
    }

    /// Remove the oldest entry.
    pub fn pop(&mut self) -> Option<J> {
        self.entries.pop_front()
    }

    pub fn is_full(&self) -> bool {
        self.max_depth
            .is_some_and(|max| self.entries.len() >= max)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_submission_order() {
        let mut queue = PendingQueue::new(None);
        for job in ["a", "b", "c"] {
            queue.push(job).unwrap();
        }
        assert_eq!(queue.pop(), Some("a"));
        queue.push("d").unwrap();
        assert_eq!(queue.pop(), Some("b"));
        assert_eq!(queue.pop(), Some("c"));
        assert_eq!(queue.pop(), Some("d"));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn unbounded_queue_never_fills() {
        let mut queue = PendingQueue::new(None);
        for i in 0..10_000 {
            assert_eq!(queue.push(i), Ok(i + 1));
        }
        assert!(!queue.is_full());
    }

    #[test]
    fn bounded_queue_returns_rejected_entry() {
        let mut queue = PendingQueue::new(Some(2));
        assert_eq!(queue.push(1), Ok(1));
        assert_eq!(queue.push(2), Ok(2));
        assert!(queue.is_full());
        assert_eq!(queue.push(3), Err(3));

        queue.pop();
        assert_eq!(queue.push(3), Ok(2));
    }

    #[test]
    fn zero_bound_rejects_everything() {
        let mut queue = PendingQueue::new(Some(0));
        assert_eq!(queue.push("x"), Err("x"));
        assert!(queue.is_empty());
    }
}
