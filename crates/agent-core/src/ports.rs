//! Collaborator seams consumed by the agent loop.
//!
//! All collaborators are external: a live environment behind
//! [`Perceiver`] and [`ActionExecutor`], a model behind
//! [`DecisionProvider`], and optional lookups used by the
//! direct-resolution shortcut.

use async_trait::async_trait;
use taskrelay_core_types::SessionId;

use crate::agent_loop::types::{Action, Decision, ExecutionOutcome, Observation};
use crate::errors::{DecisionError, LookupError, PerceptionError};
use crate::model::{DirectTarget, Task};

/// Captures the current environment state.
#[async_trait]
pub trait Perceiver: Send + Sync {
    async fn capture(&self, session: &SessionId) -> Result<Observation, PerceptionError>;
}

/// Picks the next action for a task given an observation.
#[async_trait]
pub trait DecisionProvider: Send + Sync {
    async fn decide(&self, observation: &Observation, task: &Task)
        -> Result<Decision, DecisionError>;
}

/// Applies an action against the live environment.
///
/// Only receives actions whose kind is an environment action; `search_web`
/// and `verify` are handled by the loop. Failures are reported through [`ExecutionOutcome::Failure`] rather than
/// an error so the loop can feed them back to the decision provider.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, session: &SessionId, action: &Action) -> ExecutionOutcome;
}

/// Extracts a direct resource locator from a task description.
#[async_trait]
pub trait DirectResolver: Send + Sync {
    async fn resolve(&self, task_description: &str) -> Option<DirectTarget>;
}

/// Free-text web lookup returning result text that may contain locators.
///
/// Backs both the lookup resolver and the `search_web` action.
#[async_trait]
pub trait WebLookup: Send + Sync {
    async fn search(&self, query: &str) -> Result<String, LookupError>;
}

/// Vision/language model that answers a prompt about an observation.
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn complete(&self, prompt: &str, observation: &Observation)
        -> Result<String, DecisionError>;
}

/// Answers a yes/no question about a fresh observation.
///
/// Returns the lowercased answer (`"yes"`, `"no"`, ...); the loop compares
/// it with the expected answer.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn answer(
        &self,
        question: &str,
        expected: &str,
        observation: &Observation,
    ) -> Result<String, DecisionError>;
}
