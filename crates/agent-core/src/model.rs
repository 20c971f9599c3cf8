use serde::{Deserialize, Serialize};
use taskrelay_core_types::TaskId;

use crate::errors::AgentError;

/// A natural-language goal handed to the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub description: String,
    /// Filled in by the direct-resolution shortcut when it finds a target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direct_target: Option<DirectTarget>,
}

impl Task {
    pub fn new(description: impl Into<String>) -> Result<Self, AgentError> {
        Self::with_id(TaskId::new(), description)
    }

    pub fn with_id(id: TaskId, description: impl Into<String>) -> Result<Self, AgentError> {
        let description = description.into();
        let trimmed = description.trim();
        if trimmed.is_empty() {
            return Err(AgentError::invalid_request("task description cannot be empty"));
        }
        Ok(Self {
            id,
            description: trimmed.to_string(),
            direct_target: None,
        })
    }
}

/// A resource locator that lets the agent skip the iterative loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectTarget {
    pub url: String,
    /// Which resolver produced the target (`pattern`, `lookup`, ...).
    pub source: String,
}

impl DirectTarget {
    pub fn new(url: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            source: source.into(),
        }
    }
}
