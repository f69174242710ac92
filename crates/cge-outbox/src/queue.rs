//! Bounded in-process decision queue between the request path and the
//! stream dispatcher.
//!
//! The request thread must never block and never see an error here. When
//! the queue is full the oldest pending record is dropped (and counted);
//! losing the oldest not-yet-durable decision beats stalling authorizations.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::Notify;

use cge_schemas::DecisionEvent;

pub struct OutboxQueue {
    inner: Mutex<VecDeque<DecisionEvent>>,
    capacity: usize,
    notify: Notify,
    dropped: AtomicU64,
}

impl OutboxQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Non-blocking enqueue. Drop-oldest on overflow.
    pub fn enqueue(&self, event: DecisionEvent) {
        {
            let mut q = self.inner.lock().expect("outbox queue poisoned");
            q.push_back(event);
            if q.len() > self.capacity {
                q.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.notify.notify_one();
    }

    /// Await the next record. Single consumer (the dispatcher).
    pub async fn pop(&self) -> DecisionEvent {
        loop {
            let notified = self.notify.notified();
            if let Some(ev) = self.try_pop() {
                return ev;
            }
            notified.await;
        }
    }

    fn try_pop(&self) -> Option<DecisionEvent> {
        self.inner.lock().expect("outbox queue poisoned").pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("outbox queue poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total records dropped to backpressure since boot.
    pub fn dropped_total(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
