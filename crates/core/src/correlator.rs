//! Content-keyed request correlation.
//!
//! Replies from the tutor carry no request id, only an echo of the content
//! that defined the request (typically the `text` that was translated). When
//! several callers ask for the same content, each waits in a FIFO queue under
//! that content and the Nth reply goes to the Nth caller.
//!
//! This relies on the service answering identical requests in the order they
//! were sent. Nothing here can detect a violation of that assumption.

use std::collections::{HashMap, VecDeque};

/// A FIFO-per-key registry of callers waiting for a reply.
#[derive(Debug, Clone)]
pub struct RequestCorrelator<C> {
    pending: HashMap<String, VecDeque<C>>,
}

impl<C> Default for RequestCorrelator<C> {
    fn default() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }
}

impl<C> RequestCorrelator<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `context` as waiting for the reply to `key`.
    pub fn enqueue(&mut self, key: impl Into<String>, context: C) {
        self.pending.entry(key.into()).or_default().push_back(context);
    }

    /// Takes the oldest context waiting on `key`.
    ///
    /// Returns `None` when nobody is waiting, which is the normal outcome for
    /// broadcasts or replies to requests issued before a reconnect. The key is
    /// forgotten as soon as its queue drains.
    pub fn dequeue(&mut self, key: &str) -> Option<C> {
        let queue = self.pending.get_mut(key)?;
        let context = queue.pop_front();
        if queue.is_empty() {
            self.pending.remove(key);
        }
        context
    }

    /// Number of callers waiting on `key`.
    pub fn pending(&self, key: &str) -> usize {
        self.pending.get(key).map_or(0, VecDeque::len)
    }

    /// Number of distinct keys with at least one waiting caller.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
