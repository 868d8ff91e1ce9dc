//! Slot dispatch
//!
//! The common tail of every trampoline: check the handle is not closing,
//! take the runtime lock, run the closure in the requested slot, give the
//! lock back. Panics in managed code stop here.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;

use uvbridge_core::slot::CLOSE_CALLBACK;
use uvbridge_core::{kerror, ktrace, Anchor, Callback, ManagedBuffer};

use crate::bridge::Bridge;
use crate::lock::RuntimeGuard;

/// Run the closure in slot `index` of `anchor` under the runtime lock.
///
/// `call` returns `None` when the slot holds a callback of the wrong
/// shape. Returns `None` whenever nothing was delivered.
pub fn dispatch<R>(
    bridge: &Bridge,
    anchor: &Anchor,
    index: usize,
    what: &'static str,
    call: impl FnOnce(&mut Callback) -> Option<R>,
) -> Option<R> {
    let stats = bridge.stats();

    // Only the close callback may reach a closing handle.
    if anchor.kind().is_handle() && index != CLOSE_CALLBACK && anchor.is_closing() {
        ktrace!("{}: {} is closing, dropped", what, anchor.key());
        anchor.record_dropped();
        stats.dropped_closing.fetch_add(1, Ordering::Relaxed);
        return None;
    }

    if !anchor.has_callback(index) {
        ktrace!("{}: slot {} of {} is empty", what, index, anchor.key());
        anchor.record_dropped();
        stats.dropped_empty.fetch_add(1, Ordering::Relaxed);
        return None;
    }

    let outcome = {
        let _guard = RuntimeGuard::enter(bridge.runtime());
        catch_unwind(AssertUnwindSafe(|| {
            anchor.with_callback(index, |cb| {
                let shape = cb.shape();
                (shape, call(cb))
            })
        }))
    };

    match outcome {
        Ok(Some((_, Some(result)))) => {
            anchor.record_delivery();
            stats.delivered.fetch_add(1, Ordering::Relaxed);
            Some(result)
        }
        Ok(Some((shape, None))) => {
            stats.shape_mismatches.fetch_add(1, Ordering::Relaxed);
            kerror!("{}: slot {} of {} holds a {} callback", what, index, anchor.key(), shape);
            if bridge.config().strict_shapes {
                std::process::abort();
            }
            None
        }
        Ok(None) => {
            // Emptied by another thread, or already running further up this stack.
            anchor.record_dropped();
            stats.dropped_empty.fetch_add(1, Ordering::Relaxed);
            None
        }
        Err(payload) => {
            stats.panics.fetch_add(1, Ordering::Relaxed);
            kerror!("{}: managed callback panicked: {}", what, panic_message(&*payload));
            None
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic>"
    }
}

pub fn call_unit(bridge: &Bridge, anchor: &Anchor, index: usize, what: &'static str) -> bool {
    dispatch(bridge, anchor, index, what, |cb| match cb {
        Callback::Unit(f) => {
            f();
            Some(())
        }
        _ => None,
    })
    .is_some()
}

pub fn call_int(bridge: &Bridge, anchor: &Anchor, index: usize, what: &'static str, a: i64) -> bool {
    dispatch(bridge, anchor, index, what, |cb| match cb {
        Callback::Int(f) => {
            f(a);
            Some(())
        }
        _ => None,
    })
    .is_some()
}

pub fn call_int2(
    bridge: &Bridge,
    anchor: &Anchor,
    index: usize,
    what: &'static str,
    a: i64,
    b: i64,
) -> bool {
    dispatch(bridge, anchor, index, what, |cb| match cb {
        Callback::Int2(f) => {
            f(a, b);
            Some(())
        }
        _ => None,
    })
    .is_some()
}

pub fn call_int3(
    bridge: &Bridge,
    anchor: &Anchor,
    index: usize,
    what: &'static str,
    args: (i64, i64, i64),
) -> bool {
    dispatch(bridge, anchor, index, what, |cb| match cb {
        Callback::Int3(f) => {
            f(args.0, args.1, args.2);
            Some(())
        }
        _ => None,
    })
    .is_some()
}

pub fn call_read(
    bridge: &Bridge,
    anchor: &Anchor,
    index: usize,
    what: &'static str,
    nread: isize,
    buffer: Option<ManagedBuffer>,
) -> bool {
    dispatch(bridge, anchor, index, what, move |cb| match cb {
        Callback::Read(f) => {
            f(nread, buffer);
            Some(())
        }
        _ => None,
    })
    .is_some()
}

pub fn call_recv(
    bridge: &Bridge,
    anchor: &Anchor,
    index: usize,
    nread: isize,
    buffer: Option<ManagedBuffer>,
    addr: usize,
    flags: u32,
) -> bool {
    dispatch(bridge, anchor, index, "udp-recv", move |cb| match cb {
        Callback::Recv(f) => {
            f(nread, buffer, addr, flags);
            Some(())
        }
        _ => None,
    })
    .is_some()
}

/// Ask the allocate callback for a buffer of `suggested` bytes.
pub fn call_alloc(
    bridge: &Bridge,
    anchor: &Anchor,
    index: usize,
    what: &'static str,
    suggested: usize,
) -> Option<ManagedBuffer> {
    dispatch(bridge, anchor, index, what, |cb| match cb {
        Callback::Alloc(f) => Some(f(suggested)),
        _ => None,
    })
    .flatten()
}

pub fn call_path(
    bridge: &Bridge,
    anchor: &Anchor,
    index: usize,
    path: Option<String>,
    events: i64,
    status: i64,
) -> bool {
    dispatch(bridge, anchor, index, "fs-event", move |cb| match cb {
        Callback::Path(f) => {
            f(path, events, status);
            Some(())
        }
        _ => None,
    })
    .is_some()
}

pub fn call_names(
    bridge: &Bridge,
    anchor: &Anchor,
    index: usize,
    status: i64,
    host: Option<String>,
    service: Option<String>,
) -> bool {
    dispatch(bridge, anchor, index, "getnameinfo", move |cb| match cb {
        Callback::Names(f) => {
            f(status, host, service);
            Some(())
        }
        _ => None,
    })
    .is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::master_lock::MasterLock;
    use crate::tls::{self, LockState};
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use uvbridge_core::slot::GENERIC_CALLBACK;
    use uvbridge_core::{ObjectKind, SlotRole, SlotTable};

    fn bridge() -> (Bridge, Arc<MasterLock>) {
        let lock = Arc::new(MasterLock::new(4, Duration::from_millis(1)));
        let bridge = Bridge::new(BridgeConfig::new().max_anchors(64), lock.clone());
        (bridge, lock)
    }

    fn anchor(bridge: &Bridge, kind: ObjectKind, role: SlotRole, cb: Callback) -> Arc<Anchor> {
        let table = SlotTable::new(kind).unwrap().with(role, cb).unwrap();
        bridge.registry().register_detached(table).unwrap()
    }

    #[test]
    fn test_callback_runs_holding_lock() {
        let (b, lock) = bridge();
        let seen = Arc::new(Mutex::new(None));
        let seen2 = Arc::clone(&seen);
        let a = anchor(
            &b,
            ObjectKind::Handle,
            SlotRole::Generic,
            Callback::int(move |v| {
                *seen2.lock().unwrap() = Some((v, tls::lock_state()));
            }),
        );

        assert!(call_int(&b, &a, GENERIC_CALLBACK, "test", -4));
        assert_eq!(*seen.lock().unwrap(), Some((-4, LockState::HoldsLock)));
        assert!(!lock.is_locked());
        assert_eq!(a.delivered(), 1);
    }

    #[test]
    fn test_closing_handle_drops_role_callbacks() {
        let (b, _lock) = bridge();
        let a = anchor(&b, ObjectKind::Handle, SlotRole::Generic, Callback::unit(|| {}));
        a.mark_closing();
        assert!(!call_unit(&b, &a, GENERIC_CALLBACK, "timer"));
        assert_eq!(a.dropped(), 1);
        assert_eq!(b.stats().snapshot().dropped_closing, 1);
    }

    #[test]
    fn test_closing_request_still_delivers() {
        let (b, _lock) = bridge();
        let a = anchor(&b, ObjectKind::Request, SlotRole::Generic, Callback::int(|_| {}));
        a.mark_closing();
        assert!(call_int(&b, &a, GENERIC_CALLBACK, "write", 0));
    }

    #[test]
    fn test_empty_slot_skips_lock() {
        std::thread::spawn(|| {
            let (b, _lock) = bridge();
            let table = SlotTable::new(ObjectKind::Handle).unwrap();
            let a = b.registry().register_detached(table).unwrap();
            let before = tls::thread_stats();
            assert!(!call_unit(&b, &a, GENERIC_CALLBACK, "idle"));
            assert_eq!(tls::thread_stats().since(&before).acquires, 0);
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_shape_mismatch_dropped() {
        let (b, _lock) = bridge();
        let a = anchor(&b, ObjectKind::Handle, SlotRole::Generic, Callback::unit(|| {}));
        assert!(!call_int(&b, &a, GENERIC_CALLBACK, "signal", 2));
        assert_eq!(b.stats().snapshot().shape_mismatches, 1);
        // The callback is still there for a correctly shaped call.
        assert!(call_unit(&b, &a, GENERIC_CALLBACK, "timer"));
    }

    #[test]
    fn test_panic_caught_and_lock_released() {
        let (b, lock) = bridge();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        let a = anchor(
            &b,
            ObjectKind::Handle,
            SlotRole::Generic,
            Callback::unit(move || {
                if hits2.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("managed failure");
                }
            }),
        );

        assert!(!call_unit(&b, &a, GENERIC_CALLBACK, "timer"));
        assert!(!lock.is_locked());
        assert_eq!(b.stats().snapshot().panics, 1);
        assert!(call_unit(&b, &a, GENERIC_CALLBACK, "timer"));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_alloc_returns_buffer() {
        let (b, _lock) = bridge();
        let a = anchor(
            &b,
            ObjectKind::Stream,
            SlotRole::Allocate,
            Callback::alloc(|n| ManagedBuffer::new(n).ok()),
        );
        let buf = call_alloc(&b, &a, uvbridge_core::slot::ALLOCATE_CALLBACK, "alloc", 32).unwrap();
        assert_eq!(buf.len(), 32);
    }

    #[test]
    fn test_reentrant_dispatch_same_thread() {
        let (b, lock) = bridge();
        let b = Arc::new(b);
        let inner = anchor(&b, ObjectKind::Handle, SlotRole::Generic, Callback::unit(|| {}));
        let b2 = Arc::clone(&b);
        let inner2 = Arc::clone(&inner);
        let outer = anchor(
            &b,
            ObjectKind::Handle,
            SlotRole::Generic,
            Callback::unit(move || {
                assert!(call_unit(&b2, &inner2, GENERIC_CALLBACK, "nested"));
            }),
        );
        assert!(call_unit(&b, &outer, GENERIC_CALLBACK, "outer"));
        assert_eq!(inner.delivered(), 1);
        assert!(!lock.is_locked());
    }
}
