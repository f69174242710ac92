//! cge-engine
//!
//! The rule evaluation engine: condition operator algebra over a typed field
//! extractor, the AUTH first-match and MONITORING all-match algorithms,
//! velocity integration, and debug capture under sampling.
//!
//! Faults are decision state, not errors: the evaluator records engine mode
//! and error code on the envelope and keeps going (or fails open). Nothing
//! in this crate reaches an HTTP boundary.

pub mod condition;
pub mod debug;

mod evaluator;

pub use condition::ConditionOutcome;
pub use debug::{sampled_in, DebugBuilder, DebugConfig};
pub use evaluator::{EngineFault, Evaluator};
