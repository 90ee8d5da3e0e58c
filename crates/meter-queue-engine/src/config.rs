use crate::error::ConfigError;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub queues: QueueConfig,
    pub executor: ExecutorConfig,
}

/// Queue capacities. Both queues are always bounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub normal_capacity: usize,
    pub priority_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Age after which a waiting normal task is moved to the priority queue
    pub priority_boost_threshold_secs: u64,
    pub max_attempts: u32,
    /// Sleep between polls when both queues are empty
    pub idle_interval_ms: u64,
    /// Per-execution time limit (none = unlimited)
    pub task_timeout_secs: Option<u64>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            normal_capacity: 1000,
            priority_capacity: 1000,
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig {
            priority_boost_threshold_secs: 60,
            max_attempts: 3,
            idle_interval_ms: 1000,
            task_timeout_secs: None,
        }
    }
}

impl ExecutorConfig {
    pub fn boost_threshold(&self) -> chrono::Duration {
        i64::try_from(self.priority_boost_threshold_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_secs.map(Duration::from_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts)
    }
}

impl EngineConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queues.normal_capacity == 0 {
            return Err(ConfigError::Invalid(
                "queues.normal_capacity must be greater than 0".to_string(),
            ));
        }
        if self.queues.priority_capacity == 0 {
            return Err(ConfigError::Invalid(
                "queues.priority_capacity must be greater than 0".to_string(),
            ));
        }
        if self.executor.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "executor.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.executor.task_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "executor.task_timeout_secs must be greater than 0 when set".to_string(),
            ));
        }
        Ok(())
    }
}
