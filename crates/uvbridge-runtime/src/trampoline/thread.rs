//! Native thread entry
//!
//! A thread started by the foreign thread-create call receives a bare
//! argument word. It carries the key of a detached anchor whose generic
//! slot holds the managed body.

use core::ffi::c_void;

use uvbridge_core::slot::GENERIC_CALLBACK;
use uvbridge_core::{kerror, ktrace, AnchorKey};

use crate::bridge;
use crate::dispatch;
use crate::lock::ThreadRegistration;

pub unsafe extern "C" fn thread_entry(arg: *mut c_void) {
    let bridge = bridge::global();
    let Some(key) = AnchorKey::from_user_data(arg) else {
        kerror!("thread-entry: null argument");
        return;
    };
    let Some(anchor) = bridge.registry().lookup(key) else {
        kerror!("thread-entry: no anchor for {}", key);
        return;
    };
    ktrace!("thread-entry: {}", key);

    {
        let _registration = ThreadRegistration::new(bridge.runtime());
        dispatch::call_unit(bridge, &anchor, GENERIC_CALLBACK, "thread-entry");
    }
    drop(anchor);
    if let Err(e) = bridge.registry().remove(key) {
        kerror!("thread-entry: release of {} failed: {}", key, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls;
    use std::sync::{Arc, Mutex};
    use uvbridge_core::{Callback, ObjectKind, SlotRole, SlotTable};

    #[test]
    fn test_entry_runs_body_and_retires_anchor() {
        let state = Arc::new(Mutex::new(None));
        let state2 = Arc::clone(&state);
        let table = SlotTable::new(ObjectKind::Thread)
            .unwrap()
            .with(
                SlotRole::Generic,
                Callback::unit(move || {
                    *state2.lock().unwrap() = Some(tls::lock_state());
                }),
            )
            .unwrap();
        let registry = bridge::global().registry();
        let key = registry.register_detached(table).unwrap().key();
        let word = key.to_user_data() as usize;

        std::thread::spawn(move || unsafe { thread_entry(word as *mut c_void) })
            .join()
            .unwrap();

        assert_eq!(*state.lock().unwrap(), Some(tls::LockState::HoldsLock));
        assert!(registry.lookup(key).is_none());
    }
}
