//! Typed registration builders
//!
//! One constructor per object category, with setters named after the
//! foreign callback they serve. Each setter picks the slot role and the
//! callback shape, so a table built here always matches what its
//! trampolines expect.
//!
//! ```ignore
//! let slots = Slots::stream()
//!     .on_alloc(|suggested| ManagedBuffer::new(suggested).ok())
//!     .on_read(|nread, buf| handle_read(nread, buf))
//!     .on_close(|| println!("closed"));
//! ```

use std::any::Any;
use std::sync::Arc;

use uvbridge_core::{BridgeResult, Callback, ManagedBuffer, ObjectKind, SlotRole, SlotTable};

/// Callback table under construction.
///
/// The first error (allocation failure, role not valid for the category)
/// is kept and returned by [`build`](Self::build).
#[must_use = "a slot table does nothing until registered"]
pub struct Slots {
    kind: ObjectKind,
    table: BridgeResult<SlotTable>,
}

impl Slots {
    pub fn new(kind: ObjectKind) -> Self {
        Slots {
            kind,
            table: SlotTable::new(kind),
        }
    }

    /// Timer, prepare, check, idle, async, poll, signal, process, fs watchers.
    pub fn handle() -> Self {
        Self::new(ObjectKind::Handle)
    }

    /// TCP, pipe, tty.
    pub fn stream() -> Self {
        Self::new(ObjectKind::Stream)
    }

    pub fn udp() -> Self {
        Self::new(ObjectKind::Udp)
    }

    /// Write, connect, shutdown, udp send, fs, getaddrinfo, getnameinfo, random.
    pub fn request() -> Self {
        Self::new(ObjectKind::Request)
    }

    pub fn work() -> Self {
        Self::new(ObjectKind::Work)
    }

    #[inline]
    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// Install `callback` for `role`.
    pub fn set(mut self, role: SlotRole, callback: Callback) -> Self {
        self.table = self.table.and_then(|t| t.with(role, callback));
        self
    }

    /// The generic slot, with whatever shape the handle's trampoline delivers.
    pub fn on_event(self, callback: Callback) -> Self {
        self.set(SlotRole::Generic, callback)
    }

    pub fn on_close(self, f: impl FnMut() + Send + 'static) -> Self {
        self.set(SlotRole::Close, Callback::unit(f))
    }

    /// Timer, prepare, check, idle and async ticks.
    pub fn on_tick(self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_event(Callback::unit(f))
    }

    /// Buffer supplier called before every read or receive.
    pub fn on_alloc(self, f: impl FnMut(usize) -> Option<ManagedBuffer> + Send + 'static) -> Self {
        let role = match self.kind {
            ObjectKind::Udp => SlotRole::UdpAllocate,
            _ => SlotRole::Allocate,
        };
        self.set(role, Callback::alloc(f))
    }

    /// Stream reads: `nread` and the buffer from the matching alloc.
    pub fn on_read(self, f: impl FnMut(isize, Option<ManagedBuffer>) + Send + 'static) -> Self {
        self.on_event(Callback::read(f))
    }

    /// UDP receives: `nread`, buffer, sender address (0 if none), flags.
    pub fn on_recv(self, f: impl FnMut(isize, Option<ManagedBuffer>, usize, u32) + Send + 'static) -> Self {
        self.on_event(Callback::recv(f))
    }

    pub fn on_connection(self, f: impl FnMut(i64) + Send + 'static) -> Self {
        self.set(SlotRole::Connection, Callback::int(f))
    }

    /// Single-status completions: write, connect, shutdown, udp send, fs,
    /// after-work, signal.
    pub fn on_complete(self, f: impl FnMut(i64) + Send + 'static) -> Self {
        self.on_event(Callback::int(f))
    }

    /// Body run on a pool thread for managed work.
    pub fn on_work(self, f: impl FnMut() + Send + 'static) -> Self {
        self.set(SlotRole::WorkFunction, Callback::unit(f))
    }

    /// Keep `value` reachable for the lifetime of the registration.
    pub fn self_reference(mut self, value: Arc<dyn Any + Send + Sync>) -> Self {
        if let Ok(table) = self.table.as_mut() {
            table.set_self_reference(value);
        }
        self
    }

    pub fn build(self) -> BridgeResult<SlotTable> {
        self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uvbridge_core::slot::{ALLOCATE_CALLBACK, CLOSE_CALLBACK, GENERIC_CALLBACK, UDP_ALLOCATE_CALLBACK};
    use uvbridge_core::BridgeError;

    #[test]
    fn test_alloc_role_follows_kind() {
        let stream = Slots::stream().on_alloc(|_| None).build().unwrap();
        assert!(stream.is_set(ALLOCATE_CALLBACK));

        let udp = Slots::udp().on_alloc(|_| None).build().unwrap();
        assert!(udp.is_set(UDP_ALLOCATE_CALLBACK));
        assert!(!udp.is_set(ALLOCATE_CALLBACK));
    }

    #[test]
    fn test_first_error_is_kept() {
        let err = Slots::request()
            .on_close(|| {})
            .on_complete(|_| {})
            .build()
            .unwrap_err();
        assert!(matches!(err, BridgeError::SlotUnavailable { .. }));
    }

    #[test]
    fn test_handle_table() {
        let table = Slots::handle().on_tick(|| {}).on_close(|| {}).build().unwrap();
        assert!(table.is_set(GENERIC_CALLBACK));
        assert!(table.is_set(CLOSE_CALLBACK));
        assert_eq!(table.kind(), ObjectKind::Handle);
    }

    #[test]
    fn test_allocation_failure_surfaces() {
        uvbridge_core::fault::inject_allocation_failures(1);
        let err = Slots::work().on_work(|| {}).build().unwrap_err();
        assert_eq!(err, BridgeError::AllocationFailed);
    }
}
