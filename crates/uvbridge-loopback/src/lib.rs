//! # uvbridge-loopback
//!
//! An in-process foreign event loop with the same callback contract as the
//! real one, used to drive the bridge's trampolines in tests, benches and
//! the smoke binary.
//!
//! - [`Loop`] is owned by the thread that runs it; callbacks happen there.
//! - [`LoopRemote`] injects reads, expiries and completions, and posts
//!   closes, from any thread.
//! - Queued work runs on a fixed worker pool; after-work callbacks come
//!   back through the loop.
//! - [`api`] returns the entry-point table for binding the bridge to it.

pub mod config;
mod event;
pub mod event_loop;
mod pool;

pub use config::LoopbackConfig;
pub use event::Completion;
pub use event_loop::{api, Loop, LoopRemote, LoopStats};
pub use pool::PoolStats;
