use thiserror::Error;

/// Errors emitted by the agent-core crate.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Raised when a task is malformed or missing required fields.
    #[error("invalid agent request: {0}")]
    InvalidRequest(String),

    /// Raised when the environment could not be observed.
    #[error(transparent)]
    Perception(#[from] PerceptionError),

    /// Raised when the decision provider could not produce an action.
    #[error(transparent)]
    Decision(#[from] DecisionError),
}

impl AgentError {
    /// Helper for wrapping static string errors.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }
}

/// The environment could not be captured.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PerceptionError {
    #[error("environment unreachable: {0}")]
    Unreachable(String),

    #[error("environment state unreadable: {0}")]
    Unreadable(String),

    #[error("perception timed out after {0}ms")]
    Timeout(u64),
}

/// The decision provider failed to return a usable decision.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecisionError {
    #[error("decision provider unavailable: {0}")]
    Unavailable(String),

    #[error("unparsable decision: {0}")]
    Unparsable(String),

    #[error("decision timed out after {0}ms")]
    Timeout(u64),
}

impl DecisionError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn unparsable(message: impl Into<String>) -> Self {
        Self::Unparsable(message.into())
    }

    /// Unparsable replies can be re-planned; an unavailable or stalled
    /// provider cannot.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Unparsable(_))
    }
}

/// The executor could not apply an action. Never escalated: it is folded
/// into an [`ExecutionOutcome::Failure`](crate::ExecutionOutcome) and fed
/// back into the next decision round.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("action failed: {0}")]
    Failed(String),

    #[error("action not supported by executor: {0}")]
    Unsupported(String),

    #[error("action timed out after {0}ms")]
    Timeout(u64),
}

/// The web lookup behind the direct-resolution shortcut failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("lookup failed: {0}")]
pub struct LookupError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unparsable_decisions_are_recoverable() {
        assert!(DecisionError::unparsable("no json").is_recoverable());
        assert!(!DecisionError::unavailable("503").is_recoverable());
        assert!(!DecisionError::Timeout(10).is_recoverable());
    }

    #[test]
    fn perception_error_wraps_into_agent_error() {
        let err: AgentError = PerceptionError::Unreachable("socket closed".into()).into();
        assert_eq!(err.to_string(), "environment unreachable: socket closed");
    }
}
