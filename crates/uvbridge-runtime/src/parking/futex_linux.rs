//! Linux futex-based parking
//!
//! The futex word is the wake sequence. Parkers FUTEX_WAIT on the value
//! they observed; wakers bump the word before FUTEX_WAKE, so a parker that
//! arrives late sees a changed value and returns at once (EAGAIN).

use super::LockParking;
use nix::errno::Errno;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

pub struct FutexParking {
    seq: AtomicU32,
    parked: AtomicUsize,
}

impl FutexParking {
    pub fn new() -> Self {
        Self {
            seq: AtomicU32::new(0),
            parked: AtomicUsize::new(0),
        }
    }

    fn wake(&self, count: i32) {
        self.seq.fetch_add(1, Ordering::SeqCst);
        if self.parked.load(Ordering::SeqCst) == 0 {
            return;
        }
        // Safety: the futex word lives as long as self
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.seq.as_ptr(),
                libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
                count,
                std::ptr::null::<libc::timespec>(),
                std::ptr::null::<u32>(),
                0u32,
            );
        }
    }
}

impl Default for FutexParking {
    fn default() -> Self {
        Self::new()
    }
}

impl LockParking for FutexParking {
    fn prepare(&self) -> u32 {
        self.seq.load(Ordering::SeqCst)
    }

    fn park(&self, seq: u32, timeout: Option<Duration>) -> bool {
        self.parked.fetch_add(1, Ordering::SeqCst);

        let timespec = timeout.map(|d| libc::timespec {
            tv_sec: d.as_secs() as libc::time_t,
            tv_nsec: d.subsec_nanos() as libc::c_long,
        });
        let timespec_ptr = match &timespec {
            Some(ts) => ts as *const libc::timespec,
            None => std::ptr::null(),
        };

        // Safety: futex word and timespec outlive the call
        let result = unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.seq.as_ptr(),
                libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
                seq,
                timespec_ptr,
                std::ptr::null::<u32>(),
                0u32,
            )
        };
        let errno = Errno::last();

        self.parked.fetch_sub(1, Ordering::SeqCst);

        if result == 0 {
            return true;
        }
        match errno {
            // Sequence already moved: a release happened after prepare()
            Errno::EAGAIN => true,
            Errno::ETIMEDOUT | Errno::EINTR => false,
            _ => false,
        }
    }

    fn wake_one(&self) {
        self.wake(1);
    }

    fn wake_all(&self) {
        self.wake(i32::MAX);
    }

    fn parked_count(&self) -> usize {
        self.parked.load(Ordering::Relaxed)
    }
}
