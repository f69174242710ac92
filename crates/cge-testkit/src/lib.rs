//! cge-testkit
//!
//! In-memory backends for every external dependency (counter store, ruleset
//! source, decision stream, event bus) plus fixture builders, so scenario
//! tests across the workspace run without Redis or the network. Each memory
//! backend carries a failure toggle to drive the degrade/fail-open paths.

mod fixtures;
mod memory_bus;
mod memory_source;
mod memory_store;
mod memory_stream;

pub use fixtures::{card_auth_ruleset, card_monitoring_ruleset, decision_event, rule, tx};
pub use memory_bus::MemoryBus;
pub use memory_source::MemoryRulesetSource;
pub use memory_store::MemoryVelocityStore;
pub use memory_stream::MemoryDecisionStream;
