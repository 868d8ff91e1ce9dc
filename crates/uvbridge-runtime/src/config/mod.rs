//! Bridge configuration
//!
//! Compile-time defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Environment variables (runtime)
//! 2. File named by `UVB_CONFIG_RS` (compile-time, see build.rs)
//! 3. Library defaults
//!
//! # Example
//!
//! ```rust,ignore
//! use uvbridge_runtime::config::BridgeConfig;
//!
//! let config = BridgeConfig::from_env()
//!     .max_anchors(4096)
//!     .strict_shapes(true);
//! config.validate()?;
//! ```

pub mod defaults;

use std::time::Duration;
use uvbridge_core::env::{env_get, env_get_bool};
use uvbridge_core::id::MAX_ANCHOR_INDEX;

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Cap on live anchors in the registry
    pub max_anchors: usize,
    /// Size handed to allocate callbacks when the foreign runtime suggests 0
    pub suggested_alloc: usize,
    /// How long a contender sleeps on the runtime lock before re-checking
    pub lock_park_timeout: Duration,
    /// Acquire attempts before a contender parks
    pub lock_spins: u32,
    /// Abort on a callback whose shape does not match its trampoline
    pub strict_shapes: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl BridgeConfig {
    /// Compile-time defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `UVB_MAX_ANCHORS` - Registry capacity
    /// - `UVB_SUGGESTED_ALLOC` - Fallback allocation size in bytes
    /// - `UVB_LOCK_PARK_TIMEOUT_US` - Runtime lock park timeout in microseconds
    /// - `UVB_LOCK_SPINS` - Acquire attempts before parking
    /// - `UVB_STRICT_SHAPES` - Abort on callback shape mismatch (0/1)
    pub fn from_env() -> Self {
        Self {
            max_anchors: env_get("UVB_MAX_ANCHORS", defaults::MAX_ANCHORS),
            suggested_alloc: env_get("UVB_SUGGESTED_ALLOC", defaults::SUGGESTED_ALLOC),
            lock_park_timeout: Duration::from_micros(env_get(
                "UVB_LOCK_PARK_TIMEOUT_US",
                defaults::LOCK_PARK_TIMEOUT_US,
            )),
            lock_spins: env_get("UVB_LOCK_SPINS", defaults::LOCK_SPINS),
            strict_shapes: env_get_bool("UVB_STRICT_SHAPES", defaults::STRICT_SHAPES),
        }
    }

    /// Defaults only, no environment.
    pub fn new() -> Self {
        Self {
            max_anchors: defaults::MAX_ANCHORS,
            suggested_alloc: defaults::SUGGESTED_ALLOC,
            lock_park_timeout: Duration::from_micros(defaults::LOCK_PARK_TIMEOUT_US),
            lock_spins: defaults::LOCK_SPINS,
            strict_shapes: defaults::STRICT_SHAPES,
        }
    }

    // Builder methods

    pub fn max_anchors(mut self, n: usize) -> Self {
        self.max_anchors = n;
        self
    }

    pub fn suggested_alloc(mut self, bytes: usize) -> Self {
        self.suggested_alloc = bytes;
        self
    }

    pub fn lock_park_timeout(mut self, d: Duration) -> Self {
        self.lock_park_timeout = d;
        self
    }

    pub fn lock_spins(mut self, spins: u32) -> Self {
        self.lock_spins = spins;
        self
    }

    pub fn strict_shapes(mut self, strict: bool) -> Self {
        self.strict_shapes = strict;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_anchors == 0 {
            return Err(ConfigError::InvalidValue("max_anchors must be > 0"));
        }
        if self.max_anchors > MAX_ANCHOR_INDEX + 1 {
            return Err(ConfigError::InvalidValue("max_anchors exceeds the key index range"));
        }
        if self.suggested_alloc == 0 {
            return Err(ConfigError::InvalidValue("suggested_alloc must be > 0"));
        }
        if self.lock_park_timeout.is_zero() {
            return Err(ConfigError::InvalidValue("lock_park_timeout must be > 0"));
        }
        Ok(())
    }

    /// Dump configuration through the debug log.
    pub fn log(&self) {
        uvbridge_core::kdebug!("uvbridge configuration:");
        uvbridge_core::kdebug!("  max_anchors:        {}", self.max_anchors);
        uvbridge_core::kdebug!("  suggested_alloc:    {}", self.suggested_alloc);
        uvbridge_core::kdebug!("  lock_park_timeout:  {:?}", self.lock_park_timeout);
        uvbridge_core::kdebug!("  lock_spins:         {}", self.lock_spins);
        uvbridge_core::kdebug!("  strict_shapes:      {}", self.strict_shapes);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = BridgeConfig::new();
        assert!(config.validate().is_ok());
        assert!(config.max_anchors >= 1);
    }

    #[test]
    fn test_builder() {
        let config = BridgeConfig::new()
            .max_anchors(16)
            .lock_spins(0)
            .strict_shapes(true);
        assert_eq!(config.max_anchors, 16);
        assert_eq!(config.lock_spins, 0);
        assert!(config.strict_shapes);
    }

    #[test]
    fn test_validation() {
        assert!(BridgeConfig::new().max_anchors(0).validate().is_err());
        assert!(BridgeConfig::new().suggested_alloc(0).validate().is_err());
        assert!(BridgeConfig::new()
            .lock_park_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("UVB_SUGGESTED_ALLOC", "4096");
        let config = BridgeConfig::from_env();
        assert_eq!(config.suggested_alloc, 4096);
        std::env::remove_var("UVB_SUGGESTED_ALLOC");
    }
}
