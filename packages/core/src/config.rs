//! Startup configuration for a coordinator.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{QueueConfig, SwarmConfig};

/// Settings for the event emitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// Number of recent events kept for late subscribers.
    pub history_capacity: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            history_capacity: 256,
        }
    }
}

/// Everything a coordinator reads at startup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub queue: QueueConfig,
    pub swarm: SwarmConfig,
    pub events: EventConfig,
}

/// Reasons a configuration is rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("{name} must be within 0.0..=1.0, got {value}")]
    OutOfRange { name: &'static str, value: f64 },

    #[error("critical_below ({critical}) must not exceed strained_below ({strained})")]
    ThresholdOrder { critical: f64, strained: f64 },

    #[error("agent catalog is empty")]
    EmptyCatalog,

    #[error("agent '{0}' is defined more than once")]
    DuplicateAgent(String),

    #[error("agent '{0}' has an empty capability")]
    EmptyCapability(String),
}

impl CoordinatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let queue = &self.queue;
        if queue.concurrency == 0 {
            return Err(ConfigError::Zero("queue.concurrency"));
        }
        if queue.schedule_interval_ms == 0 {
            return Err(ConfigError::Zero("queue.schedule_interval_ms"));
        }
        if queue.poll_interval_ms == 0 {
            return Err(ConfigError::Zero("queue.poll_interval_ms"));
        }
        if queue.default_timeout_secs == 0 {
            return Err(ConfigError::Zero("queue.default_timeout_secs"));
        }
        if self.events.history_capacity == 0 {
            return Err(ConfigError::Zero("events.history_capacity"));
        }

        let swarm = &self.swarm;
        if swarm.failure_threshold == 0 {
            return Err(ConfigError::Zero("swarm.failure_threshold"));
        }
        for (name, value) in [
            ("swarm.strained_below", swarm.strained_below),
            ("swarm.critical_below", swarm.critical_below),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfRange { name, value });
            }
        }
        if swarm.critical_below > swarm.strained_below {
            return Err(ConfigError::ThresholdOrder {
                critical: swarm.critical_below,
                strained: swarm.strained_below,
            });
        }

        if swarm.agents.is_empty() {
            return Err(ConfigError::EmptyCatalog);
        }
        let mut names = HashSet::new();
        for definition in &swarm.agents {
            if !names.insert(definition.name.as_str()) {
                return Err(ConfigError::DuplicateAgent(definition.name.clone()));
            }
            if definition.capability.trim().is_empty() {
                return Err(ConfigError::EmptyCapability(definition.name.clone()));
            }
            if definition.replicas == 0 {
                return Err(ConfigError::Zero("agent replicas"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AgentDefinition, Tier};

    #[test]
    fn default_config_is_valid() {
        assert_eq!(CoordinatorConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_zero_concurrency() {
        let mut config = CoordinatorConfig::default();
        config.queue.concurrency = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::Zero("queue.concurrency"))
        );
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let mut config = CoordinatorConfig::default();
        config.swarm.critical_below = 0.9;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ThresholdOrder { .. })
        ));

        config.swarm.critical_below = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { .. })
        ));
    }

    #[test]
    fn rejects_bad_catalogs() {
        let mut config = CoordinatorConfig::default();
        config.swarm.agents = vec![];
        assert_eq!(config.validate(), Err(ConfigError::EmptyCatalog));

        config.swarm.agents = vec![
            AgentDefinition::new("zstd", Tier::Balanced, "compress"),
            AgentDefinition::new("zstd", Tier::Deep, "compress"),
        ];
        assert_eq!(
            config.validate(),
            Err(ConfigError::DuplicateAgent("zstd".into()))
        );

        config.swarm.agents = vec![AgentDefinition::new("zstd", Tier::Balanced, " ")];
        assert_eq!(
            config.validate(),
            Err(ConfigError::EmptyCapability("zstd".into()))
        );
    }
}
