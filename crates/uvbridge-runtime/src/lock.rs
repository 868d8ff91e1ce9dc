//! Runtime lock discipline guards
//!
//! Every entry into managed code goes through [`RuntimeGuard`]. The guard
//! keeps the thread-local state machine in `tls` in step with the
//! [`ManagedRuntime`] calls it makes, and undoes them on drop, so unwinds
//! and early returns cannot leave a thread holding the right.

use uvbridge_core::{ktrace, ManagedRuntime};

use crate::tls::{self, LockState};

/// Holds the managed-execution right for its lifetime.
///
/// A thread that is not registered with the runtime is registered for the
/// duration of the guard and unregistered again afterwards.
#[must_use = "the runtime lock is released when the guard drops"]
pub struct RuntimeGuard<'a> {
    runtime: &'a dyn ManagedRuntime,
    registration: Option<ThreadRegistration<'a>>,
}

impl<'a> RuntimeGuard<'a> {
    pub fn enter(runtime: &'a dyn ManagedRuntime) -> Self {
        let registration = if tls::lock_state() == LockState::NotRuntimeThread {
            Some(ThreadRegistration::new(runtime))
        } else {
            None
        };

        runtime.acquire();
        tls::set_depth(tls::depth() + 1);
        tls::set_lock_state(LockState::HoldsLock);
        tls::record_acquire();

        RuntimeGuard {
            runtime,
            registration,
        }
    }

    /// Was the thread registered just for this guard?
    pub fn is_temporary(&self) -> bool {
        self.registration.is_some()
    }
}

impl Drop for RuntimeGuard<'_> {
    fn drop(&mut self) {
        self.runtime.release();
        let depth = tls::depth().saturating_sub(1);
        tls::set_depth(depth);
        if depth == 0 {
            tls::set_lock_state(LockState::Released);
        }
        tls::record_release();
        // Registration (if any) drops after the release above.
        self.registration.take();
    }
}

/// Registers the current thread with the managed runtime until dropped.
///
/// Pool workers and natively spawned threads hold one of these around
/// every managed call they make. A thread that is already registered gets
/// a no-op guard.
#[must_use = "the thread is unregistered when the guard drops"]
pub struct ThreadRegistration<'a> {
    runtime: &'a dyn ManagedRuntime,
    owned: bool,
}

impl<'a> ThreadRegistration<'a> {
    pub fn new(runtime: &'a dyn ManagedRuntime) -> Self {
        if tls::lock_state() != LockState::NotRuntimeThread {
            return ThreadRegistration {
                runtime,
                owned: false,
            };
        }
        runtime.register_thread();
        tls::set_lock_state(LockState::Released);
        tls::record_registration();
        ktrace!("thread registered with {}", runtime.name());
        ThreadRegistration {
            runtime,
            owned: true,
        }
    }

    pub fn is_owned(&self) -> bool {
        self.owned
    }
}

impl Drop for ThreadRegistration<'_> {
    fn drop(&mut self) {
        if !self.owned {
            return;
        }
        // A guard leaked inside this registration must not keep the right.
        while tls::depth() > 0 {
            self.runtime.release();
            tls::set_depth(tls::depth() - 1);
            tls::record_release();
        }
        self.runtime.unregister_thread();
        tls::set_lock_state(LockState::NotRuntimeThread);
        tls::record_deregistration();
        ktrace!("thread unregistered from {}", self.runtime.name());
    }
}

/// Gives up the managed-execution right for a blocking native call.
///
/// Every nested level held by the thread is released and restored on drop.
#[must_use = "the runtime lock is re-acquired when the section drops"]
pub struct BlockingSection<'a> {
    runtime: &'a dyn ManagedRuntime,
    runtime_depth: u32,
    bridge_depth: u32,
    state: LockState,
}

impl<'a> BlockingSection<'a> {
    pub fn enter(runtime: &'a dyn ManagedRuntime) -> Self {
        let state = tls::lock_state();
        let bridge_depth = tls::depth();
        let runtime_depth = runtime.suspend();
        tls::set_depth(0);
        if state == LockState::HoldsLock {
            tls::set_lock_state(LockState::Released);
        }
        BlockingSection {
            runtime,
            runtime_depth,
            bridge_depth,
            state,
        }
    }
}

impl Drop for BlockingSection<'_> {
    fn drop(&mut self) {
        self.runtime.resume(self.runtime_depth);
        tls::set_depth(self.bridge_depth);
        tls::set_lock_state(self.state);
    }
}

/// Run `f` without the managed-execution right.
pub fn without_runtime<R>(runtime: &dyn ManagedRuntime, f: impl FnOnce() -> R) -> R {
    let _section = BlockingSection::enter(runtime);
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::master_lock::MasterLock;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::time::Duration;

    fn lock() -> MasterLock {
        MasterLock::new(4, Duration::from_millis(1))
    }

    #[test]
    fn test_guard_on_unregistered_thread() {
        std::thread::spawn(|| {
            let l = lock();
            let before = tls::thread_stats();
            {
                let guard = RuntimeGuard::enter(&l);
                assert!(guard.is_temporary());
                assert_eq!(tls::lock_state(), LockState::HoldsLock);
                assert!(l.is_held_by_current());
            }
            assert_eq!(tls::lock_state(), LockState::NotRuntimeThread);
            assert!(!l.is_locked());
            let delta = tls::thread_stats().since(&before);
            assert_eq!(delta.acquires, 1);
            assert_eq!(delta.releases, 1);
            assert_eq!(delta.registrations, 1);
            assert_eq!(delta.deregistrations, 1);
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_nested_guards() {
        std::thread::spawn(|| {
            let l = lock();
            let _reg = ThreadRegistration::new(&l);
            let outer = RuntimeGuard::enter(&l);
            {
                let inner = RuntimeGuard::enter(&l);
                assert!(!inner.is_temporary());
                assert_eq!(tls::depth(), 2);
            }
            assert_eq!(tls::lock_state(), LockState::HoldsLock);
            drop(outer);
            assert_eq!(tls::lock_state(), LockState::Released);
            assert!(!l.is_locked());
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_released_on_unwind() {
        std::thread::spawn(|| {
            let l = lock();
            let r = catch_unwind(AssertUnwindSafe(|| {
                let _g = RuntimeGuard::enter(&l);
                panic!("managed error");
            }));
            assert!(r.is_err());
            assert!(!l.is_locked());
            assert_eq!(tls::lock_state(), LockState::NotRuntimeThread);
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_registration_paired_on_early_return() {
        fn work(l: &MasterLock, fail: bool) -> Result<(), ()> {
            let _reg = ThreadRegistration::new(l);
            if fail {
                return Err(());
            }
            let _g = RuntimeGuard::enter(l);
            Ok(())
        }

        std::thread::spawn(|| {
            let l = lock();
            let before = tls::thread_stats();
            assert!(work(&l, true).is_err());
            assert!(work(&l, false).is_ok());
            let delta = tls::thread_stats().since(&before);
            assert_eq!(delta.registrations, 2);
            assert_eq!(delta.deregistrations, 2);
            assert_eq!(delta.acquires, delta.releases);
            assert_eq!(l.registered_threads(), 0);
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_blocking_section_lets_others_in() {
        use std::sync::Arc;
        let l = Arc::new(lock());
        let reg = ThreadRegistration::new(&*l);
        let g1 = RuntimeGuard::enter(&*l);
        let g2 = RuntimeGuard::enter(&*l);

        without_runtime(&*l, || {
            assert!(!l.is_locked());
            let l2 = Arc::clone(&l);
            std::thread::spawn(move || {
                let _g = RuntimeGuard::enter(&*l2);
            })
            .join()
            .unwrap();
        });

        assert!(l.is_held_by_current());
        assert_eq!(tls::depth(), 2);
        drop(g2);
        drop(g1);
        drop(reg);
        assert!(!l.is_locked());
    }
}
