//! Engine configuration.
//!
//! Explicit configuration object passed into the machine/executor
//! constructors; there is no process-wide configuration state.

use serde::{Deserialize, Serialize};

/// Configuration for activation execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Retry bound for goals with `retry: true`; attempt 1 is the initial
    /// run, so `max_attempts: 3` allows two retries.
    pub max_attempts: u32,
    /// Capacity of the worker-result channel inside each activation loop.
    pub result_channel_capacity: usize,
    /// Capacity of the approval channel handed to activation controls.
    pub approval_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            result_channel_capacity: 64,
            approval_channel_capacity: 16,
        }
    }
}

impl EngineConfig {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_result_channel_capacity(mut self, capacity: usize) -> Self {
        self.result_channel_capacity = capacity;
        self
    }

    pub fn with_approval_channel_capacity(mut self, capacity: usize) -> Self {
        self.approval_channel_capacity = capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_allow_two_retries() {
        let config = EngineConfig::default();
        assert_eq!(config.max_attempts, 3);
    }

    #[test]
    fn builders_override_fields() {
        let config = EngineConfig::default()
            .with_max_attempts(5)
            .with_result_channel_capacity(8)
            .with_approval_channel_capacity(2);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.result_channel_capacity, 8);
        assert_eq!(config.approval_channel_capacity, 2);
    }
}
