//! Parking for runtime-lock contenders
//!
//! A thread that fails to take the managed-runtime lock after spinning
//! sleeps here until the holder releases. Parking is sequence-based:
//! a contender reads the sequence with `prepare()` before its last acquire
//! attempt and passes it to `park()`, which returns immediately if a
//! release happened in between. No wakeup is lost that way.

use std::time::Duration;

pub trait LockParking: Send + Sync {
    /// Current wake sequence.
    fn prepare(&self) -> u32;

    /// Sleep until the sequence moves past `seq` or the timeout expires.
    ///
    /// Returns `true` if woken by a release. Callers re-check the lock
    /// regardless of the result.
    fn park(&self, seq: u32, timeout: Option<Duration>) -> bool;

    /// Advance the sequence and wake one parked contender.
    fn wake_one(&self);

    /// Advance the sequence and wake every parked contender.
    fn wake_all(&self);

    /// Number of parked contenders (hint, may be stale)
    fn parked_count(&self) -> usize;
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod futex_linux;
        pub use futex_linux::FutexParking as PlatformParking;
    } else {
        mod fallback;
        pub use fallback::FallbackParking as PlatformParking;
    }
}

pub fn new_parking() -> Box<dyn LockParking> {
    Box::new(PlatformParking::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_park_timeout() {
        let parking = new_parking();
        let seq = parking.prepare();
        let start = std::time::Instant::now();
        let woken = parking.park(seq, Some(Duration::from_millis(50)));
        assert!(!woken);
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_stale_sequence_returns_immediately() {
        let parking = new_parking();
        let seq = parking.prepare();
        parking.wake_one();
        let start = std::time::Instant::now();
        parking.park(seq, Some(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_wake_one() {
        let parking = Arc::new(PlatformParking::new());
        let parking2 = Arc::clone(&parking);

        let handle = thread::spawn(move || {
            let seq = parking2.prepare();
            parking2.park(seq, Some(Duration::from_secs(10)))
        });

        while parking.parked_count() == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        parking.wake_one();
        assert!(handle.join().unwrap());
    }
}
