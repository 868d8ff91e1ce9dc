//! Condvar parking for platforms without futex

use super::LockParking;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

pub struct FallbackParking {
    seq: Mutex<u32>,
    condvar: Condvar,
    parked: AtomicUsize,
}

impl FallbackParking {
    pub fn new() -> Self {
        Self {
            seq: Mutex::new(0),
            condvar: Condvar::new(),
            parked: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, u32> {
        self.seq.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for FallbackParking {
    fn default() -> Self {
        Self::new()
    }
}

impl LockParking for FallbackParking {
    fn prepare(&self) -> u32 {
        *self.lock()
    }

    fn park(&self, seq: u32, timeout: Option<Duration>) -> bool {
        self.parked.fetch_add(1, Ordering::SeqCst);
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut guard = self.lock();

        while *guard == seq {
            guard = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    match self.condvar.wait_timeout(guard, deadline - now) {
                        Ok((g, _)) => g,
                        Err(poisoned) => poisoned.into_inner().0,
                    }
                }
                None => match self.condvar.wait(guard) {
                    Ok(g) => g,
                    Err(poisoned) => poisoned.into_inner(),
                },
            };
        }

        let woken = *guard != seq;
        drop(guard);
        self.parked.fetch_sub(1, Ordering::SeqCst);
        woken
    }

    fn wake_one(&self) {
        {
            let mut guard = self.lock();
            *guard = guard.wrapping_add(1);
        }
        self.condvar.notify_one();
    }

    fn wake_all(&self) {
        {
            let mut guard = self.lock();
            *guard = guard.wrapping_add(1);
        }
        self.condvar.notify_all();
    }

    fn parked_count(&self) -> usize {
        self.parked.load(Ordering::Relaxed)
    }
}
