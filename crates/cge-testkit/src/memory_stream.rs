//! In-memory decision stream with consumer-group semantics: delivered
//! entries become pending until acked, and idle pending entries can be
//! reclaimed. `age_pending` back-dates deliveries so reclaim tests do not
//! sleep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;

use cge_outbox::{DecisionStream, PendingSummary, StreamEntry, StreamError};
use cge_schemas::DecisionEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    Available,
    Pending,
    Acked,
}

struct StoredEntry {
    id: String,
    event: DecisionEvent,
    state: EntryState,
    delivered_at: Option<Instant>,
}

#[derive(Default)]
struct StreamState {
    entries: Vec<StoredEntry>,
    next_seq: u64,
}

#[derive(Default)]
pub struct MemoryDecisionStream {
    state: Mutex<StreamState>,
    fail_appends: AtomicBool,
}

impl MemoryDecisionStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `append` fail (drives the OUTBOX_UNAVAILABLE path).
    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::Relaxed);
    }

    /// Back-date every pending delivery by `age`, making entries reclaimable
    /// without waiting out the idle threshold.
    pub fn age_pending(&self, age: Duration) {
        let mut state = self.state.lock().unwrap();
        for entry in &mut state.entries {
            if let Some(at) = entry.delivered_at.as_mut() {
                *at -= age;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn acked_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .entries
            .iter()
            .filter(|e| e.state == EntryState::Acked)
            .count()
    }
}

#[async_trait]
impl DecisionStream for MemoryDecisionStream {
    async fn append(&self, event: &DecisionEvent) -> Result<String, StreamError> {
        if self.fail_appends.load(Ordering::Relaxed) {
            return Err(StreamError::Unavailable(
                "memory stream marked failing".to_string(),
            ));
        }
        let mut state = self.state.lock().unwrap();
        let id = format!("{}-{}", Utc::now().timestamp_millis(), state.next_seq);
        state.next_seq += 1;
        state.entries.push(StoredEntry {
            id: id.clone(),
            event: event.clone(),
            state: EntryState::Available,
            delivered_at: None,
        });
        Ok(id)
    }

    async fn read_batch(&self, count: usize) -> Result<Vec<StreamEntry>, StreamError> {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();
        let mut out = Vec::new();
        for entry in &mut state.entries {
            if out.len() >= count {
                break;
            }
            if entry.state == EntryState::Available {
                entry.state = EntryState::Pending;
                entry.delivered_at = Some(now);
                out.push(StreamEntry {
                    id: entry.id.clone(),
                    event: entry.event.clone(),
                });
            }
        }
        Ok(out)
    }

    async fn claim_idle(
        &self,
        min_idle_ms: u64,
        count: usize,
    ) -> Result<Vec<StreamEntry>, StreamError> {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();
        let min_idle = Duration::from_millis(min_idle_ms);
        let mut out = Vec::new();
        for entry in &mut state.entries {
            if out.len() >= count {
                break;
            }
            let idle_enough = entry.state == EntryState::Pending
                && entry
                    .delivered_at
                    .is_some_and(|at| now.duration_since(at) >= min_idle);
            if idle_enough {
                entry.delivered_at = Some(now);
                out.push(StreamEntry {
                    id: entry.id.clone(),
                    event: entry.event.clone(),
                });
            }
        }
        Ok(out)
    }

    async fn ack(&self, entry_id: &str) -> Result<(), StreamError> {
        let mut state = self.state.lock().unwrap();
        if let Some(entry) = state.entries.iter_mut().find(|e| e.id == entry_id) {
            entry.state = EntryState::Acked;
            entry.delivered_at = None;
        }
        Ok(())
    }

    async fn pending_summary(&self) -> Result<PendingSummary, StreamError> {
        let state = self.state.lock().unwrap();
        let now = Instant::now();
        let mut total_pending = 0u64;
        let mut oldest_idle_ms = 0u64;
        for entry in &state.entries {
            if entry.state == EntryState::Pending {
                total_pending += 1;
                if let Some(at) = entry.delivered_at {
                    let idle = now.duration_since(at).as_millis() as u64;
                    oldest_idle_ms = oldest_idle_ms.max(idle);
                }
            }
        }
        Ok(PendingSummary {
            total_pending,
            oldest_idle_ms,
        })
    }
}
