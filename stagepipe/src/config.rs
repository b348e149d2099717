//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Default number of workers of a parallel section.
pub const DEFAULT_PARALLEL_POOL_SIZE: usize = 10;

/// Configuration shared by the compiler and hand-assembled containers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Worker pool size of every parallel section.
    #[serde(default = "default_parallel_pool_size")]
    pub parallel_pool_size: usize,
    /// Fail-fast default for containers built from this config.
    #[serde(default = "default_fail_fast")]
    pub fail_fast: bool,
}

fn default_parallel_pool_size() -> usize {
    DEFAULT_PARALLEL_POOL_SIZE
}

fn default_fail_fast() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel_pool_size: default_parallel_pool_size(),
            fail_fast: default_fail_fast(),
        }
    }
}

impl EngineConfig {
    /// Creates a new config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the parallel pool size (at least one worker).
    #[must_use]
    pub fn with_parallel_pool_size(mut self, size: usize) -> Self {
        self.parallel_pool_size = size.max(1);
        self
    }

    /// Sets the fail-fast default.
    #[must_use]
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.parallel_pool_size, 10);
        assert!(config.fail_fast);
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"fail_fast": false}"#).unwrap();
        assert_eq!(config.parallel_pool_size, DEFAULT_PARALLEL_POOL_SIZE);
        assert!(!config.fail_fast);
    }

    #[test]
    fn test_builders() {
        let config = EngineConfig::new().with_parallel_pool_size(0).with_fail_fast(false);
        assert_eq!(config.parallel_pool_size, 1);
        assert!(!config.fail_fast);
    }
}
