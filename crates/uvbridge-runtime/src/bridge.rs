//! Process-wide bridge state
//!
//! Trampolines receive nothing but the foreign object, so the registry and
//! the managed runtime they dispatch through live in one process-wide
//! [`Bridge`]. It is either installed explicitly before the first foreign
//! callback or created from the environment on first use.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use uvbridge_core::{kdebug, BridgeError, BridgeResult, ManagedRuntime, Registry};

use crate::config::BridgeConfig;
use crate::master_lock::MasterLock;
use crate::trampoline::once::OnceSlot;

/// Counters for dispatch outcomes.
#[derive(Debug, Default)]
pub struct DispatchStats {
    pub(crate) delivered: AtomicU64,
    pub(crate) dropped_closing: AtomicU64,
    pub(crate) dropped_empty: AtomicU64,
    pub(crate) shape_mismatches: AtomicU64,
    pub(crate) panics: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSnapshot {
    pub delivered: u64,
    pub dropped_closing: u64,
    pub dropped_empty: u64,
    pub shape_mismatches: u64,
    pub panics: u64,
}

impl DispatchStats {
    pub fn snapshot(&self) -> DispatchSnapshot {
        DispatchSnapshot {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped_closing: self.dropped_closing.load(Ordering::Relaxed),
            dropped_empty: self.dropped_empty.load(Ordering::Relaxed),
            shape_mismatches: self.shape_mismatches.load(Ordering::Relaxed),
            panics: self.panics.load(Ordering::Relaxed),
        }
    }
}

pub struct Bridge {
    config: BridgeConfig,
    registry: Registry,
    runtime: Arc<dyn ManagedRuntime>,
    once: OnceSlot,
    stats: DispatchStats,
}

impl Bridge {
    pub fn new(config: BridgeConfig, runtime: Arc<dyn ManagedRuntime>) -> Self {
        config.log();
        Self {
            registry: Registry::new(config.max_anchors),
            config,
            runtime,
            once: OnceSlot::new(),
            stats: DispatchStats::default(),
        }
    }

    #[inline]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    #[inline]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    #[inline]
    pub fn runtime(&self) -> &dyn ManagedRuntime {
        &*self.runtime
    }

    #[inline]
    pub fn once_slot(&self) -> &OnceSlot {
        &self.once
    }

    #[inline]
    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }
}

static BRIDGE: OnceLock<Bridge> = OnceLock::new();

/// Install the process-wide bridge.
///
/// Fails with `AlreadyInstalled` once any bridge exists, including one
/// created implicitly by [`global`].
pub fn install(config: BridgeConfig, runtime: Arc<dyn ManagedRuntime>) -> BridgeResult<&'static Bridge> {
    let mut fresh = Some(Bridge::new(config, runtime));
    let bridge = BRIDGE.get_or_init(|| {
        kdebug!("bridge installed");
        // Only reached by the caller whose bridge wins.
        match fresh.take() {
            Some(bridge) => bridge,
            None => default_bridge(),
        }
    });
    if fresh.is_some() {
        return Err(BridgeError::AlreadyInstalled);
    }
    Ok(bridge)
}

/// The process-wide bridge, created from the environment if none was installed.
#[inline]
pub fn global() -> &'static Bridge {
    BRIDGE.get_or_init(default_bridge)
}

fn default_bridge() -> Bridge {
    let config = BridgeConfig::from_env();
    let runtime: Arc<dyn ManagedRuntime> = Arc::new(MasterLock::from_config(&config));
    kdebug!("bridge created with defaults");
    Bridge::new(config, runtime)
}
