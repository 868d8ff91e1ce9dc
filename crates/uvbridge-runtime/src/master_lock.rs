//! Reentrant master lock
//!
//! Default [`ManagedRuntime`]: one exclusive right to run managed code,
//! owned by at most one thread token at a time. The owner may re-acquire
//! (nested trampolines), contenders spin briefly and then park.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use uvbridge_core::{kerror, ManagedRuntime};

use crate::config::BridgeConfig;
use crate::parking::{new_parking, LockParking};
use crate::tls;

const UNOWNED: u64 = 0;

static NEXT_LOCK_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Ids of the locks this thread is registered with.
    static REGISTERED: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
}

pub struct MasterLock {
    id: u64,
    owner: AtomicU64,
    /// Nesting depth; written only by the owner
    depth: AtomicU32,
    registered: AtomicUsize,
    contended: AtomicU64,
    spins: u32,
    park_timeout: Duration,
    parking: Box<dyn LockParking>,
}

impl MasterLock {
    pub fn new(spins: u32, park_timeout: Duration) -> Self {
        Self {
            id: NEXT_LOCK_ID.fetch_add(1, Ordering::Relaxed),
            owner: AtomicU64::new(UNOWNED),
            depth: AtomicU32::new(0),
            registered: AtomicUsize::new(0),
            contended: AtomicU64::new(0),
            spins,
            park_timeout,
            parking: new_parking(),
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(config.lock_spins, config.lock_park_timeout)
    }

    #[inline]
    fn try_take(&self, token: u64) -> bool {
        self.owner
            .compare_exchange(UNOWNED, token, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Does the calling thread own the lock?
    #[inline]
    pub fn is_held_by_current(&self) -> bool {
        self.owner.load(Ordering::Relaxed) == tls::thread_token()
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.owner.load(Ordering::Relaxed) != UNOWNED
    }

    /// Threads currently registered.
    pub fn registered_threads(&self) -> usize {
        self.registered.load(Ordering::Relaxed)
    }

    /// Times an acquire had to wait for another owner.
    pub fn contended(&self) -> u64 {
        self.contended.load(Ordering::Relaxed)
    }

    fn unlock(&self) {
        self.owner.store(UNOWNED, Ordering::Release);
        self.parking.wake_one();
    }
}

impl Default for MasterLock {
    fn default() -> Self {
        Self::from_config(&BridgeConfig::from_env())
    }
}

impl ManagedRuntime for MasterLock {
    fn acquire(&self) {
        let token = tls::thread_token();
        if self.owner.load(Ordering::Relaxed) == token {
            self.depth.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let mut attempts = 0u32;
        let mut waited = false;
        loop {
            if self.try_take(token) {
                break;
            }
            if attempts < self.spins {
                attempts += 1;
                core::hint::spin_loop();
                continue;
            }
            waited = true;
            let seq = self.parking.prepare();
            if self.try_take(token) {
                break;
            }
            self.parking.park(seq, Some(self.park_timeout));
        }
        if waited {
            self.contended.fetch_add(1, Ordering::Relaxed);
        }
        self.depth.store(1, Ordering::Relaxed);
    }

    fn release(&self) {
        if !self.is_held_by_current() {
            kerror!("master lock: release by a thread that does not hold it");
            return;
        }
        let remaining = self.depth.load(Ordering::Relaxed).saturating_sub(1);
        self.depth.store(remaining, Ordering::Relaxed);
        if remaining == 0 {
            self.unlock();
        }
    }

    fn register_thread(&self) -> bool {
        let newly = REGISTERED.with(|r| {
            let mut ids = r.borrow_mut();
            if ids.contains(&self.id) {
                false
            } else {
                ids.push(self.id);
                true
            }
        });
        if newly {
            self.registered.fetch_add(1, Ordering::Relaxed);
        }
        newly
    }

    fn unregister_thread(&self) {
        let was = REGISTERED.with(|r| {
            let mut ids = r.borrow_mut();
            let before = ids.len();
            ids.retain(|&id| id != self.id);
            ids.len() != before
        });
        if was {
            self.registered.fetch_sub(1, Ordering::Relaxed);
        }
    }

    fn suspend(&self) -> u32 {
        if !self.is_held_by_current() {
            return 0;
        }
        let depth = self.depth.swap(0, Ordering::Relaxed);
        self.unlock();
        depth
    }

    fn resume(&self, depth: u32) {
        if depth == 0 {
            return;
        }
        self.acquire();
        self.depth.store(depth, Ordering::Relaxed);
    }

    fn name(&self) -> &'static str {
        "master-lock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::thread;

    fn lock() -> MasterLock {
        MasterLock::new(8, Duration::from_millis(1))
    }

    #[test]
    fn test_reentrant() {
        let l = lock();
        l.acquire();
        l.acquire();
        assert!(l.is_held_by_current());
        l.release();
        assert!(l.is_held_by_current());
        l.release();
        assert!(!l.is_locked());
    }

    #[test]
    fn test_release_by_non_owner_ignored() {
        let l = Arc::new(lock());
        l.acquire();
        let l2 = Arc::clone(&l);
        thread::spawn(move || l2.release()).join().unwrap();
        assert!(l.is_held_by_current());
        l.release();
    }

    #[test]
    fn test_mutual_exclusion() {
        let l = Arc::new(lock());
        let inside = Arc::new(AtomicBool::new(false));
        let total = Arc::new(AtomicU64::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let l = Arc::clone(&l);
                let inside = Arc::clone(&inside);
                let total = Arc::clone(&total);
                thread::spawn(move || {
                    for _ in 0..500 {
                        l.acquire();
                        assert!(!inside.swap(true, Ordering::SeqCst));
                        total.fetch_add(1, Ordering::Relaxed);
                        inside.store(false, Ordering::SeqCst);
                        l.release();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(total.load(Ordering::Relaxed), 2000);
        assert!(!l.is_locked());
    }

    #[test]
    fn test_suspend_resume_restores_depth() {
        let l = Arc::new(lock());
        l.acquire();
        l.acquire();
        l.acquire();
        let depth = l.suspend();
        assert_eq!(depth, 3);
        assert!(!l.is_locked());

        let l2 = Arc::clone(&l);
        thread::spawn(move || {
            l2.acquire();
            l2.release();
        })
        .join()
        .unwrap();

        l.resume(depth);
        for _ in 0..3 {
            assert!(l.is_held_by_current());
            l.release();
        }
        assert!(!l.is_locked());
    }

    #[test]
    fn test_register_idempotent() {
        let l = lock();
        assert!(l.register_thread());
        assert!(!l.register_thread());
        assert_eq!(l.registered_threads(), 1);
        l.unregister_thread();
        l.unregister_thread();
        assert_eq!(l.registered_threads(), 0);
    }

    #[test]
    fn test_registration_is_per_lock() {
        let a = lock();
        let b = lock();
        assert!(a.register_thread());
        assert!(b.register_thread());
        assert_eq!(a.registered_threads(), 1);
        assert_eq!(b.registered_threads(), 1);

        a.unregister_thread();
        assert_eq!(a.registered_threads(), 0);
        assert_eq!(b.registered_threads(), 1);
        assert!(!b.register_thread());
        b.unregister_thread();
        assert_eq!(b.registered_threads(), 0);
    }
}
