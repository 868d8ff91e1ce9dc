//! Loopback loop configuration
//!
//! Environment variables (all optional):
//! - `UVB_LOOPBACK_POOL_SIZE` - Worker threads for queued work
//! - `UVB_LOOPBACK_QUEUE_DEPTH` - Capacity of the event and work queues
//! - `UVB_LOOPBACK_SUGGESTED_ALLOC` - Size suggested to allocate callbacks

use uvbridge_core::env::env_get;

const DEFAULT_POOL_SIZE: usize = 4;
const DEFAULT_QUEUE_DEPTH: usize = 1024;
const DEFAULT_SUGGESTED_ALLOC: usize = 65_536;

/// Pool size is clamped to this many workers.
pub const MAX_POOL_SIZE: usize = 32;

#[derive(Debug, Clone)]
pub struct LoopbackConfig {
    pub pool_size: usize,
    pub queue_depth: usize,
    pub suggested_alloc: usize,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl LoopbackConfig {
    pub fn from_env() -> Self {
        Self {
            pool_size: env_get("UVB_LOOPBACK_POOL_SIZE", DEFAULT_POOL_SIZE),
            queue_depth: env_get("UVB_LOOPBACK_QUEUE_DEPTH", DEFAULT_QUEUE_DEPTH),
            suggested_alloc: env_get("UVB_LOOPBACK_SUGGESTED_ALLOC", DEFAULT_SUGGESTED_ALLOC),
        }
    }

    pub fn pool_size(mut self, n: usize) -> Self {
        self.pool_size = n;
        self
    }

    pub fn queue_depth(mut self, n: usize) -> Self {
        self.queue_depth = n;
        self
    }

    pub fn suggested_alloc(mut self, bytes: usize) -> Self {
        self.suggested_alloc = bytes;
        self
    }

    /// Clamp values into the ranges the loop supports.
    pub(crate) fn normalized(&self) -> Self {
        Self {
            pool_size: self.pool_size.clamp(1, MAX_POOL_SIZE),
            queue_depth: self.queue_depth.max(16),
            suggested_alloc: self.suggested_alloc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_clamps() {
        let config = LoopbackConfig::from_env().pool_size(0).queue_depth(1).normalized();
        assert_eq!(config.pool_size, 1);
        assert_eq!(config.queue_depth, 16);
        let config = LoopbackConfig::from_env().pool_size(1000).normalized();
        assert_eq!(config.pool_size, MAX_POOL_SIZE);
    }
}
