//! # uvbridge-runtime
//!
//! Native side of the uvbridge callback bridge.
//!
//! This crate provides:
//! - The `#[repr(C)]` shapes and callback signatures of the foreign loop
//! - Trampolines the foreign runtime calls, one per callback shape
//! - The reentrant runtime lock and per-thread lock discipline
//! - Thread-pool helpers (worker registration, native pool jobs)
//! - The foreign entry-point table and capability probe

pub mod abi;
pub mod config;
pub mod tls;
pub mod parking;
pub mod master_lock;
pub mod lock;
pub mod bridge;
pub mod dispatch;
pub mod trampoline;
pub mod shim;

// Re-exports
pub use bridge::{global, install, Bridge, DispatchSnapshot};
pub use config::BridgeConfig;
pub use lock::{without_runtime, BlockingSection, RuntimeGuard, ThreadRegistration};
pub use master_lock::MasterLock;
pub use parking::{new_parking, LockParking};
pub use shim::ForeignApi;
pub use tls::LockState;
pub use trampoline::{address_of, null_variant, Trampoline, TrampolinePtr};
