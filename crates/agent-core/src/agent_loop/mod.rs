//! Iterative action loop (observe → decide → act).
//!
//! ```text
//! while status == running && iteration < max:
//!     observation = perceiver.capture()
//!     decision    = provider.decide(observation + feedback + context)
//!     outcome     = executor.execute(action)
//!     if last N signatures identical: stuck
//! ```

pub mod config;
pub mod controller;
pub mod stagnation;
pub mod types;

pub use config::AgentLoopConfig;
pub use controller::{AgentLoopController, AgentLoopResult, AgentLoopStatus};
pub use stagnation::{StagnationDetector, StagnationKey};
pub use types::{
    Action, ActionKind, Decision, ExecutionOutcome, IterationRecord, Observation,
    ObservationPayload, ScrollDirection,
};
