//! # uvbridge - managed callbacks for a foreign event loop
//!
//! Lets a garbage-collected runtime drive a libuv-style event loop whose
//! objects are owned by native code and whose callbacks arrive as plain C
//! function pointers.
//!
//! ## Features
//!
//! - **Arena anchors**: a foreign object's user-data word holds an index
//!   into the bridge's registry, never a pointer to managed memory
//! - **One trampoline per callback shape**: resolves the anchor, runs the
//!   managed closure under the runtime lock, swallows panics
//! - **Close is final**: after a close only the close callback arrives,
//!   and the anchor is released after it returns
//! - **Pool work**: managed work registers its pool thread; native work
//!   never touches the runtime
//! - **Capability gating**: optional foreign entry points are probed, not
//!   version-checked
//!
//! ## Quick Start
//!
//! ```ignore
//! use uvbridge::{Binding, ManagedBuffer, Slots};
//! use uvbridge::trampoline::stream::{alloc_cb, read_cb};
//!
//! let binding = Binding::new(foreign_api);
//! unsafe {
//!     binding.register(tcp, Slots::stream()
//!         .on_alloc(|suggested| ManagedBuffer::new(suggested).ok())
//!         .on_read(|nread, buf| println!("read {} bytes", nread))
//!         .on_close(|| println!("closed")))?;
//!     uv_read_start(tcp, alloc_cb, read_cb);
//!     // ...
//!     binding.close(tcp.cast())?;
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Managed code                           │
//! │            closures in slot tables, Binding calls           │
//! └─────────────────────────────────────────────────────────────┘
//!               │ register / close / queue_work  ▲ callbacks
//!               ▼                                │
//! ┌──────────────────────┐    ┌─────────────────────────────────┐
//! │  Registry (arena)    │◄───│  Trampolines + runtime lock     │
//! │  key in user-data    │    │  one extern "C" fn per shape    │
//! └──────────────────────┘    └─────────────────────────────────┘
//!               │                                ▲
//!               ▼                                │
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Foreign loop (via ForeignApi table)            │
//! │        loop thread, pool threads, native threads            │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod binding;
mod slots;

#[cfg(test)]
mod scenarios;

pub use binding::{Binding, NativeThread};
pub use slots::Slots;

// Re-export core types
pub use uvbridge_core::{
    Anchor,
    AnchorKey,
    BridgeError,
    BridgeResult,
    Callback,
    Capability,
    CapabilitySet,
    ForeignObject,
    ManagedBuffer,
    ManagedRuntime,
    ObjectKind,
    Registry,
    RegistryStats,
    SlotRole,
};

// Re-export kprint macros for debug logging
pub use uvbridge_core::{kprint, kprintln, kerror, kwarn, kinfo, kdebug, ktrace};
pub use uvbridge_core::kprint::{LogLevel, init as init_logging, set_log_level, set_flush_enabled, set_thread_tag};

// Re-export env utilities
pub use uvbridge_core::{env_get, env_get_bool, env_get_opt, env_is_set};

// Re-export runtime types
pub use uvbridge_runtime::{
    abi,
    trampoline,
    global,
    install,
    address_of,
    null_variant,
    without_runtime,
    BlockingSection,
    Bridge,
    BridgeConfig,
    DispatchSnapshot,
    ForeignApi,
    MasterLock,
    RuntimeGuard,
    ThreadRegistration,
    Trampoline,
    TrampolinePtr,
};
