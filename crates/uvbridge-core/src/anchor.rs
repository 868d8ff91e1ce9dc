//! Lifetime Anchor
//!
//! Sole owner of a foreign object's callback slot table. The registry holds
//! one `Arc<Anchor>` per live object; trampolines clone it for the duration
//! of one dispatch. Closures become unreachable when the registry entry is
//! released and the last in-flight dispatch returns.

use core::fmt;
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::buffer::ManagedBuffer;
use crate::error::BridgeResult;
use crate::id::AnchorKey;
use crate::slot::{ObjectKind, SlotRole};
use crate::spinlock::SpinLock;
use crate::table::{Callback, Slot, SlotTable};

pub struct Anchor {
    key: AnchorKey,
    kind: ObjectKind,
    table: SpinLock<SlotTable>,
    /// Buffer handed out by the last allocate callback, awaiting its read.
    pending_buffer: SpinLock<Option<ManagedBuffer>>,
    closing: AtomicBool,
    released: AtomicBool,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl Anchor {
    pub(crate) fn new(key: AnchorKey, table: SlotTable) -> Self {
        Self {
            key,
            kind: table.kind(),
            table: SpinLock::new(table),
            pending_buffer: SpinLock::new(None),
            closing: AtomicBool::new(false),
            released: AtomicBool::new(false),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn key(&self) -> AnchorKey {
        self.key
    }

    #[inline]
    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// Install or replace a role callback.
    pub fn set_callback(&self, role: SlotRole, callback: Callback) -> BridgeResult<()> {
        self.table.with(|t| t.set(role, callback))
    }

    pub fn clear_callback(&self, role: SlotRole) -> BridgeResult<()> {
        self.table.with(|t| t.clear(role))
    }

    pub fn has_callback(&self, index: usize) -> bool {
        self.table.with(|t| t.is_set(index))
    }

    pub fn set_self_reference(&self, value: Arc<dyn Any + Send + Sync>) {
        self.table.with(|t| t.set_self_reference(value));
    }

    pub fn self_reference(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.table.with(|t| t.self_reference())
    }

    /// Run `f` on the callback at `index` without holding the table lock.
    ///
    /// The callback is moved out for the call and put back afterwards,
    /// also when `f` unwinds. Returns `None` if the slot holds no callback
    /// or the callback is already running further up this stack.
    pub fn with_callback<R>(&self, index: usize, f: impl FnOnce(&mut Callback) -> R) -> Option<R> {
        let callback = self.table.with(|t| t.take(index))?;
        let mut out = Restore {
            anchor: self,
            index,
            callback: Some(callback),
        };
        Some(f(out.callback.as_mut()?))
    }

    /// First close request wins.
    #[inline]
    pub fn mark_closing(&self) -> bool {
        !self.closing.swap(true, Ordering::AcqRel)
    }

    #[inline]
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Park the buffer returned by an allocate callback.
    pub fn stash_buffer(&self, buffer: ManagedBuffer) -> Option<ManagedBuffer> {
        self.pending_buffer.with(|slot| slot.replace(buffer))
    }

    /// Claim the parked buffer for the read that follows the allocation.
    pub fn take_buffer(&self) -> Option<ManagedBuffer> {
        self.pending_buffer.with(Option::take)
    }

    #[inline]
    pub fn record_delivery(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Callbacks delivered to managed code through this anchor.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Callbacks suppressed because the handle was closing or a slot was empty.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Detach every slot and the parked buffer. Called once by the registry.
    pub(crate) fn release_slots(&self) -> (Vec<Slot>, Option<ManagedBuffer>) {
        self.released.store(true, Ordering::Release);
        let slots = self.table.with(|t| t.drain());
        let buffer = self.take_buffer();
        (slots, buffer)
    }
}

struct Restore<'a> {
    anchor: &'a Anchor,
    index: usize,
    callback: Option<Callback>,
}

impl Drop for Restore<'_> {
    fn drop(&mut self) {
        if let Some(cb) = self.callback.take() {
            if self.anchor.is_released() {
                return;
            }
            let index = self.index;
            self.anchor.table.with(|t| t.restore(index, cb));
        }
    }
}

impl fmt::Debug for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Anchor")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("closing", &self.is_closing())
            .field("released", &self.is_released())
            .field("delivered", &self.delivered())
            .finish()
    }
}
