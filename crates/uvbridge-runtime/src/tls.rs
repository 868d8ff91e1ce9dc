//! Thread-local state for the runtime lock discipline
//!
//! Each OS thread is in one of three states with respect to the managed
//! runtime:
//!
//! ```text
//!   NotRuntimeThread ──register──> Released ──acquire──> HoldsLock
//!          ▲                        │   ▲                   │
//!          └──────unregister────────┘   └──release (depth 0)┘
//! ```
//!
//! The lock guards in `lock` are the only writers.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    NotRuntimeThread,
    HoldsLock,
    Released,
}

/// Per-thread counters of lock-discipline transitions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThreadLockStats {
    pub acquires: u64,
    pub releases: u64,
    pub registrations: u64,
    pub deregistrations: u64,
}

impl ThreadLockStats {
    /// Counter-wise difference `self - earlier`.
    pub fn since(&self, earlier: &ThreadLockStats) -> ThreadLockStats {
        ThreadLockStats {
            acquires: self.acquires.wrapping_sub(earlier.acquires),
            releases: self.releases.wrapping_sub(earlier.releases),
            registrations: self.registrations.wrapping_sub(earlier.registrations),
            deregistrations: self.deregistrations.wrapping_sub(earlier.deregistrations),
        }
    }
}

/// Token 0 is never handed out; it marks an unowned lock.
static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static STATE: Cell<LockState> = const { Cell::new(LockState::NotRuntimeThread) };

    /// Acquire depth as seen by the bridge guards
    static DEPTH: Cell<u32> = const { Cell::new(0) };

    static TOKEN: Cell<u64> = const { Cell::new(0) };

    static STATS: Cell<ThreadLockStats> = const {
        Cell::new(ThreadLockStats {
            acquires: 0,
            releases: 0,
            registrations: 0,
            deregistrations: 0,
        })
    };
}

#[inline]
pub fn lock_state() -> LockState {
    STATE.with(Cell::get)
}

#[inline]
pub(crate) fn set_lock_state(state: LockState) {
    STATE.with(|cell| cell.set(state));
}

#[inline]
pub fn depth() -> u32 {
    DEPTH.with(Cell::get)
}

#[inline]
pub(crate) fn set_depth(depth: u32) {
    DEPTH.with(|cell| cell.set(depth));
}

/// Process-unique, non-zero identifier of the current thread.
#[inline]
pub fn thread_token() -> u64 {
    TOKEN.with(|cell| {
        let token = cell.get();
        if token != 0 {
            return token;
        }
        let token = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
        cell.set(token);
        token
    })
}

pub fn thread_stats() -> ThreadLockStats {
    STATS.with(Cell::get)
}

#[inline]
fn bump(f: impl FnOnce(&mut ThreadLockStats)) {
    STATS.with(|cell| {
        let mut stats = cell.get();
        f(&mut stats);
        cell.set(stats);
    });
}

pub(crate) fn record_acquire() {
    bump(|s| s.acquires += 1);
}

pub(crate) fn record_release() {
    bump(|s| s.releases += 1);
}

pub(crate) fn record_registration() {
    bump(|s| s.registrations += 1);
}

pub(crate) fn record_deregistration() {
    bump(|s| s.deregistrations += 1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_thread_state() {
        std::thread::spawn(|| {
            assert_eq!(lock_state(), LockState::NotRuntimeThread);
            assert_eq!(depth(), 0);
            assert_eq!(thread_stats(), ThreadLockStats::default());
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_tokens_unique_and_stable() {
        let mine = thread_token();
        assert_ne!(mine, 0);
        assert_eq!(mine, thread_token());
        let other = std::thread::spawn(thread_token).join().unwrap();
        assert_ne!(mine, other);
    }

    #[test]
    fn test_stats_since() {
        let before = thread_stats();
        record_acquire();
        record_release();
        let delta = thread_stats().since(&before);
        assert_eq!(delta.acquires, 1);
        assert_eq!(delta.releases, 1);
        assert_eq!(delta.registrations, 0);
    }
}
