//! # uvbridge-core
//!
//! Core types for bridging a managed runtime to a callback-driven foreign
//! event loop.
//!
//! This crate is platform-agnostic and contains no foreign ABI. The
//! `#[repr(C)]` shapes, trampolines and the runtime lock live in
//! `uvbridge-runtime`.
//!
//! ## Modules
//!
//! - `id` - Anchor key stored in native user-data words
//! - `slot` - Slot-role ABI constants and object categories
//! - `table` - Callback slot table and callback shapes
//! - `buffer` - Managed buffers lent to the foreign runtime
//! - `anchor` - Lifetime Anchor
//! - `registry` - Handle/Request Registry (anchor arena)
//! - `traits` - `ManagedRuntime` and `ForeignObject` seams
//! - `capability` - Capability set of the bound foreign library
//! - `error` - Error types
//! - `spinlock` - Internal spinlock primitive
//! - `fault` - Allocation fault injection (tests, `fault-injection` feature)
//! - `kprint` - Kernel-style debug printing macros
//! - `env` - Environment variable utilities

pub mod id;
pub mod slot;
pub mod table;
pub mod buffer;
pub mod anchor;
pub mod registry;
pub mod traits;
pub mod capability;
pub mod error;
pub mod spinlock;
pub mod fault;
pub mod kprint;
pub mod env;

pub use id::AnchorKey;
pub use slot::{ObjectKind, SlotRole};
pub use table::{Callback, Slot, SlotTable};
pub use buffer::ManagedBuffer;
pub use anchor::Anchor;
pub use registry::{Registry, RegistryStats};
pub use traits::{ForeignObject, ManagedRuntime};
pub use capability::{Capability, CapabilityProbe, CapabilitySet};
pub use error::{BridgeError, BridgeResult};
pub use spinlock::SpinLock;
pub use env::{env_get, env_get_bool, env_get_opt, env_is_set};
