//! Streaming Support
//!
//! Progressive modules hand work to a background producer and consume its
//! results one item per invocation. Producer and consumer share nothing but
//! a [`StreamingQueue`].
//!
//! The consumer side never blocks indefinitely: it polls with a fixed
//! interval and gives up after a fixed number of attempts, leaving the
//! decision of what to do next to the module.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

/// Result of polling a [`StreamingQueue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Item(T),
    /// The producer closed the queue and everything has been consumed.
    Closed,
    /// Nothing arrived within the retry budget.
    Exhausted { attempts: usize },
}

impl<T> PollOutcome<T> {
    pub fn into_item(self) -> Option<T> {
        match self {
            Self::Item(item) => Some(item),
            _ => None,
        }
    }
}

struct QueueInner<T> {
    items: Mutex<VecDeque<T>>,
    closed: AtomicBool,
}

/// Mutex-guarded FIFO shared between a producer thread and a module.
///
/// Cloning yields another handle to the same queue.
pub struct StreamingQueue<T> {
    inner: Arc<QueueInner<T>>,
}

impl<T> Clone for StreamingQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for StreamingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> StreamingQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(QueueInner {
                items: Mutex::new(VecDeque::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn push(&self, item: T) {
        self.inner.items.lock().push_back(item);
    }

    /// Signal that no more items will be pushed.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn try_pop(&self) -> Option<T> {
        self.inner.items.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once the queue is closed and drained.
    pub fn is_finished(&self) -> bool {
        self.is_closed() && self.is_empty()
    }

    /// Wait for the next item, checking every `interval` up to `max_retries`
    /// times (at least once).
    pub fn poll(&self, interval: Duration, max_retries: usize) -> PollOutcome<T> {
        let attempts = max_retries.max(1);
        for attempt in 1..=attempts {
            if let Some(item) = self.try_pop() {
                return PollOutcome::Item(item);
            }
            if self.is_closed() {
                // Items pushed just before close
                return match self.try_pop() {
                    Some(item) => PollOutcome::Item(item),
                    None => PollOutcome::Closed,
                };
            }
            if attempt < attempts {
                thread::sleep(interval);
            }
        }
        PollOutcome::Exhausted { attempts }
    }
}

impl<T> std::fmt::Debug for StreamingQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingQueue")
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Call `probe` until it yields a value, sleeping `interval` between
/// attempts, for at most `max_retries` attempts.
///
/// Used by modules that wait on an external interpreter.
pub fn wait_for<T>(
    interval: Duration,
    max_retries: usize,
    mut probe: impl FnMut() -> Option<T>,
) -> Option<T> {
    let attempts = max_retries.max(1);
    for attempt in 1..=attempts {
        if let Some(value) = probe() {
            return Some(value);
        }
        if attempt < attempts {
            thread::sleep(interval);
        }
    }
    None
}
