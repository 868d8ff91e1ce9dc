//! Run-once slot
//!
//! The foreign run-once primitive calls a bare `fn()`, so the managed
//! callback it should run has nowhere to live but here: one process-wide
//! slot. A caller arms it, makes the foreign once call, and drops the
//! ticket. Only one caller can hold the slot at a time.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use uvbridge_core::{kerror, ktrace, BridgeError, BridgeResult, Callback, SpinLock};

use crate::bridge;
use crate::lock::RuntimeGuard;

pub struct OnceSlot {
    callback: SpinLock<Option<Callback>>,
    armed: AtomicBool,
    fired: AtomicU64,
}

impl OnceSlot {
    pub const fn new() -> Self {
        Self {
            callback: SpinLock::new(None),
            armed: AtomicBool::new(false),
            fired: AtomicU64::new(0),
        }
    }

    /// Claim the slot and store `callback` for the next once trampoline.
    ///
    /// Fails with `OnceSlotBusy` while another ticket is alive.
    pub fn arm(&self, callback: Callback) -> BridgeResult<OnceTicket<'_>> {
        if self
            .armed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(BridgeError::OnceSlotBusy);
        }
        self.callback.with(|slot| *slot = Some(callback));
        Ok(OnceTicket { slot: self })
    }

    #[inline]
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Initializers run through this slot so far.
    pub fn fired(&self) -> u64 {
        self.fired.load(Ordering::Relaxed)
    }

    fn take(&self) -> Option<Callback> {
        self.callback.with(Option::take)
    }
}

impl Default for OnceSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive use of the [`OnceSlot`]. Dropping it clears the slot.
#[must_use = "the once slot is released when the ticket drops"]
pub struct OnceTicket<'a> {
    slot: &'a OnceSlot,
}

impl Drop for OnceTicket<'_> {
    fn drop(&mut self) {
        // An initializer that never fired leaves its callback behind.
        drop(self.slot.take());
        self.slot.armed.store(false, Ordering::Release);
    }
}

/// Trampoline handed to the foreign run-once primitive.
pub unsafe extern "C" fn once_cb() {
    let bridge = bridge::global();
    let slot = bridge.once_slot();
    let Some(callback) = slot.take() else {
        kerror!("once: fired with an empty slot");
        return;
    };
    ktrace!("once: firing");
    slot.fired.fetch_add(1, Ordering::Relaxed);

    let mut f = match callback {
        Callback::Unit(f) => f,
        other => {
            kerror!("once: slot holds a {} callback", other.shape());
            return;
        }
    };
    let _guard = RuntimeGuard::enter(bridge.runtime());
    if catch_unwind(AssertUnwindSafe(|| f())).is_err() {
        kerror!("once: managed initializer panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_second_arm_is_busy() {
        let slot = OnceSlot::new();
        let ticket = slot.arm(Callback::unit(|| {})).unwrap();
        assert_eq!(slot.arm(Callback::unit(|| {})).err(), Some(BridgeError::OnceSlotBusy));
        drop(ticket);
        assert!(!slot.is_armed());
        assert!(slot.arm(Callback::unit(|| {})).is_ok());
    }

    #[test]
    fn test_ticket_drop_clears_unfired_callback() {
        let slot = OnceSlot::new();
        let marker = Arc::new(());
        let held = Arc::clone(&marker);
        let ticket = slot.arm(Callback::unit(move || {
            let _ = &held;
        })).unwrap();
        assert_eq!(Arc::strong_count(&marker), 2);
        drop(ticket);
        assert_eq!(Arc::strong_count(&marker), 1);
    }

    #[test]
    fn test_global_once_trampoline() {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        let slot = bridge::global().once_slot();
        let ticket = slot
            .arm(Callback::unit(move || {
                hits2.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        unsafe {
            once_cb();
            // A second trigger finds the slot empty.
            once_cb();
        }
        drop(ticket);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
