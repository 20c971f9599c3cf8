//! Configuration for the iterative action loop.

use serde::{Deserialize, Serialize};

use super::stagnation::StagnationKey;

/// Configuration for the observe-decide-act loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentLoopConfig {
    /// Maximum iterations before the loop is aborted.
    /// Default: 20
    pub max_iterations: u32,

    /// Number of trailing decisions compared for stagnation.
    /// Default: 3
    pub stagnation_window: usize,

    /// What "identical decision" means.
    /// Default: normalized action signature
    pub stagnation_key: StagnationKey,

    /// Unparsable decisions tolerated in a row before failing.
    /// Default: 2
    pub max_consecutive_decision_failures: u32,

    /// `verify` actions allowed in a row; one more completes the task.
    /// Default: 2
    pub max_consecutive_verifies: u32,

    /// Timeout for a single capture in milliseconds.
    /// Default: 30000
    pub perception_timeout_ms: u64,

    /// Timeout for a single decision call in milliseconds.
    /// Default: 60000
    pub decision_timeout_ms: u64,

    /// Timeout for a single action in milliseconds.
    /// Default: 30000
    pub action_timeout_ms: u64,

    /// Recent iteration summaries attached to each observation.
    /// Default: 5
    pub context_lines: usize,

    /// Whether to try the direct-resolution shortcut before iterating.
    /// Default: true
    pub enable_shortcut: bool,
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            stagnation_window: 3,
            stagnation_key: StagnationKey::Normalized,
            max_consecutive_decision_failures: 2,
            max_consecutive_verifies: 2,
            perception_timeout_ms: 30_000,
            decision_timeout_ms: 60_000,
            action_timeout_ms: 30_000,
            context_lines: 5,
            enable_shortcut: true,
        }
    }
}

impl AgentLoopConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config with short timeouts for tests.
    pub fn minimal() -> Self {
        Self {
            perception_timeout_ms: 1_000,
            decision_timeout_ms: 1_000,
            action_timeout_ms: 1_000,
            ..Self::default()
        }
    }

    /// Builder: set max iterations.
    pub fn max_iterations(mut self, iterations: u32) -> Self {
        self.max_iterations = iterations;
        self
    }

    /// Builder: set the stagnation window size.
    pub fn stagnation_window(mut self, size: usize) -> Self {
        self.stagnation_window = size;
        self
    }

    /// Builder: set the stagnation comparison key.
    pub fn stagnation_key(mut self, key: StagnationKey) -> Self {
        self.stagnation_key = key;
        self
    }

    /// Builder: set how many `verify` actions may follow each other.
    pub fn max_consecutive_verifies(mut self, count: u32) -> Self {
        self.max_consecutive_verifies = count;
        self
    }

    /// Builder: toggle the direct-resolution shortcut.
    pub fn shortcut(mut self, enabled: bool) -> Self {
        self.enable_shortcut = enabled;
        self
    }

    /// Builder: set decision timeout.
    pub fn decision_timeout(mut self, ms: u64) -> Self {
        self.decision_timeout_ms = ms;
        self
    }

    /// Builder: set perception timeout.
    pub fn perception_timeout(mut self, ms: u64) -> Self {
        self.perception_timeout_ms = ms;
        self
    }

    /// Builder: set action timeout.
    pub fn action_timeout(mut self, ms: u64) -> Self {
        self.action_timeout_ms = ms;
        self
    }

    /// Check values that would make the loop meaningless.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_iterations == 0 {
            return Err("max_iterations must be at least 1".to_string());
        }
        if self.stagnation_window == 0 {
            return Err("stagnation_window must be at least 1".to_string());
        }
        if self.max_consecutive_decision_failures == 0 {
            return Err("max_consecutive_decision_failures must be at least 1".to_string());
        }
        if self.max_consecutive_verifies == 0 {
            return Err("max_consecutive_verifies must be at least 1".to_string());
        }
        Ok(())
    }
}
