//! cge-outbox
//!
//! The durability pipeline for AUTH decisions: a bounded in-process queue
//! feeds a dispatcher that appends to a durable stream, and a publisher
//! worker drains the stream onto the event bus with ack + pending-reclaim.
//! The request path touches only `OutboxQueue::enqueue` and `OutboxHealth`.

mod bus;
mod dispatcher;
mod metrics;
mod publisher;
mod queue;
mod stream;

pub use bus::{BusError, DecisionBus, RedisStreamBus};
pub use dispatcher::{DispatcherConfig, OutboxDispatcher, OutboxHealth};
pub use metrics::{OutboxMetrics, OutboxMetricsSnapshot};
pub use publisher::{PublisherConfig, PublisherWorker};
pub use queue::OutboxQueue;
pub use stream::{
    entry_id_millis, DecisionStream, PendingSummary, RedisDecisionStream, StreamEntry, StreamError,
};
