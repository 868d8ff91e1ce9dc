//! Allocation fault injection
//!
//! Thread-local countdown consulted by every fallible bridge allocation
//! (arena entries, slot tables, auxiliary work structs). Compiled in for
//! tests and under the `fault-injection` feature; otherwise every query is
//! a constant `false`.

cfg_if::cfg_if! {
    if #[cfg(any(test, feature = "fault-injection"))] {
        use std::cell::Cell;

        thread_local! {
            static FAIL_NEXT: Cell<u32> = const { Cell::new(0) };
            static INJECTED: Cell<u64> = const { Cell::new(0) };
        }

        /// Make the next `count` bridge allocations on this thread fail.
        pub fn inject_allocation_failures(count: u32) {
            FAIL_NEXT.with(|c| c.set(count));
        }

        /// Cancel any pending injected failures on this thread.
        pub fn clear() {
            FAIL_NEXT.with(|c| c.set(0));
        }

        /// How many allocations this thread has failed on purpose.
        pub fn injected_count() -> u64 {
            INJECTED.with(Cell::get)
        }

        /// Consume one pending failure, if any.
        #[inline]
        pub fn should_fail_allocation() -> bool {
            FAIL_NEXT.with(|c| {
                let n = c.get();
                if n == 0 {
                    return false;
                }
                c.set(n - 1);
                INJECTED.with(|i| i.set(i.get() + 1));
                true
            })
        }
    } else {
        #[inline(always)]
        pub fn should_fail_allocation() -> bool {
            false
        }
    }
}

/// Fail with `AllocationFailed` if a fault is pending.
#[inline]
pub fn check_allocation() -> crate::error::BridgeResult<()> {
    if should_fail_allocation() {
        crate::kwarn!("injected allocation failure");
        return Err(crate::error::BridgeError::AllocationFailed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_countdown() {
        inject_allocation_failures(2);
        assert!(check_allocation().is_err());
        assert!(check_allocation().is_err());
        assert!(check_allocation().is_ok());
        assert_eq!(injected_count(), 2);
    }

    #[test]
    fn test_thread_local() {
        inject_allocation_failures(1);
        let other = std::thread::spawn(should_fail_allocation).join().unwrap();
        assert!(!other);
        assert!(should_fail_allocation());
        clear();
    }
}
