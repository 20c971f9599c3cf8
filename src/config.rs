//! Runtime configuration for the TaskRelay CLI.

use std::env;

use agent_core::AgentLoopConfig;
use serde::{Deserialize, Serialize};
use taskrelay_dedup_gate::DedupConfig;
use thiserror::Error;

pub const ENV_MAX_ITERATIONS: &str = "TASKRELAY_MAX_ITERATIONS";
pub const ENV_STAGNATION_WINDOW: &str = "TASKRELAY_STAGNATION_WINDOW";
pub const ENV_DEDUP_CAPACITY: &str = "TASKRELAY_DEDUP_CAPACITY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} must be a positive integer, got `{value}`")]
    InvalidOverride { key: String, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub agent: AgentLoopConfig,
    pub dedup: DedupConfig,
}

impl Config {
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// Apply `TASKRELAY_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|key| env::var(key).ok())
    }

    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = parse_override(&lookup, ENV_MAX_ITERATIONS)? {
            self.agent.max_iterations = u32::try_from(value).map_err(|_| {
                ConfigError::InvalidOverride {
                    key: ENV_MAX_ITERATIONS.to_string(),
                    value: value.to_string(),
                }
            })?;
        }
        if let Some(value) = parse_override(&lookup, ENV_STAGNATION_WINDOW)? {
            self.agent.stagnation_window = value;
        }
        if let Some(value) = parse_override(&lookup, ENV_DEDUP_CAPACITY)? {
            self.dedup.capacity = value;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.agent.validate().map_err(ConfigError::Invalid)?;
        if self.dedup.capacity == 0 {
            return Err(ConfigError::Invalid(
                "dedup.capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_override<F>(lookup: &F, key: &str) -> Result<Option<usize>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    match raw.trim().parse::<usize>() {
        Ok(value) if value > 0 => Ok(Some(value)),
        _ => Err(ConfigError::InvalidOverride {
            key: key.to_string(),
            value: raw,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::StagnationKey;
    use std::collections::HashMap;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = Config::from_yaml(
            "agent:\n  max_iterations: 8\n  stagnation_key: raw\ndedup:\n  capacity: 5\n",
        )
        .unwrap();
        assert_eq!(config.agent.max_iterations, 8);
        assert_eq!(config.agent.stagnation_key, StagnationKey::Raw);
        assert_eq!(config.agent.stagnation_window, 3);
        assert_eq!(config.dedup.capacity, 5);
    }

    #[test]
    fn empty_document_is_default() {
        let config = Config::from_yaml("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.agent.max_iterations, 20);
        assert_eq!(config.dedup.capacity, 100);
    }

    #[test]
    fn overrides_apply() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_MAX_ITERATIONS, "12"),
            (ENV_DEDUP_CAPACITY, " 7 "),
        ]);
        let mut config = Config::default();
        config
            .apply_overrides_from(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.agent.max_iterations, 12);
        assert_eq!(config.agent.stagnation_window, 3);
        assert_eq!(config.dedup.capacity, 7);
    }

    #[test]
    fn bad_override_is_rejected() {
        let mut config = Config::default();
        let err = config
            .apply_overrides_from(|key| (key == ENV_STAGNATION_WINDOW).then(|| "0".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOverride { .. }));
        assert_eq!(config.agent.stagnation_window, 3);
    }

    #[test]
    fn validate_rejects_zero_capacity() {
        let mut config = Config::default();
        config.dedup.capacity = 0;
        assert!(config.validate().is_err());
    }
}
