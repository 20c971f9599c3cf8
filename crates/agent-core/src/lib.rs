//! Iterative action agent.
//!
//! Drives natural-language tasks against an observable environment through a
//! bounded observe-decide-act loop, with a direct-resolution shortcut for
//! tasks that name their target outright.

pub mod agent_loop;
pub mod decision;
pub mod errors;
pub mod model;
pub mod ports;
pub mod shortcut;

pub use agent_loop::{
    Action, ActionKind, AgentLoopConfig, AgentLoopController, AgentLoopResult, AgentLoopStatus,
    Decision, ExecutionOutcome, IterationRecord, Observation, ObservationPayload,
    ScrollDirection, StagnationDetector, StagnationKey,
};
pub use decision::{
    extract_json_object, parse_decision, parse_verification_answer, ModelDecisionProvider,
    ModelVerifier,
};
pub use errors::{AgentError, DecisionError, ExecutionError, LookupError, PerceptionError};
pub use model::{DirectTarget, Task};
pub use ports::{
    ActionExecutor, DecisionProvider, DirectResolver, Perceiver, Verifier, VisionModel, WebLookup,
};
pub use shortcut::{
    first_url, ChainResolver, DirectShortcut, LookupResolver, ShortcutOutcome,
    UrlPatternResolver,
};
