//! Thread-pool trampolines
//!
//! Managed work: `work_cb` runs on a pool thread, which registers with the
//! managed runtime for the duration of the call; `after_work_cb` runs on
//! the loop thread and retires the request.
//!
//! Native work: a plain `fn(*mut c_void)` and its argument ride on the
//! request in a [`CWork`] that temporarily replaces the user-data word.
//! `c_work_cb` calls it without touching the runtime at all.
//! `after_c_work_cb` puts the anchor key back, frees the `CWork`, and then
//! completes like any other work request.

use core::ffi::{c_int, c_void};
use std::sync::atomic::{AtomicU64, Ordering};

use uvbridge_core::fault;
use uvbridge_core::slot::{GENERIC_CALLBACK, WORK_FUNCTION};
use uvbridge_core::{kerror, ktrace, BridgeError, BridgeResult};

use crate::abi::{c_work_fn, uv_work_t};
use crate::bridge;
use crate::dispatch;
use crate::lock::ThreadRegistration;
use crate::trampoline::request;

/// Auxiliary data for a native pool job.
#[repr(C)]
#[derive(Debug)]
pub struct CWork {
    /// The request's user-data word before the swap (its anchor key)
    pub original_user_data: *mut c_void,
    pub function: c_work_fn,
    pub argument: *mut c_void,
}

static CWORK_ALLOCATED: AtomicU64 = AtomicU64::new(0);
static CWORK_FREED: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CWorkStats {
    pub allocated: u64,
    pub freed: u64,
}

impl CWorkStats {
    /// Auxiliary structs not yet freed.
    pub fn outstanding(&self) -> u64 {
        self.allocated.saturating_sub(self.freed)
    }
}

pub fn cwork_stats() -> CWorkStats {
    CWorkStats {
        allocated: CWORK_ALLOCATED.load(Ordering::Relaxed),
        freed: CWORK_FREED.load(Ordering::Relaxed),
    }
}

/// Attach `function(argument)` to a registered work request.
///
/// The request must then be queued with [`c_work_cb`] and
/// [`after_c_work_cb`]. On failure the request is left untouched.
///
/// # Safety
///
/// `req` must be a registered work request not yet queued.
pub unsafe fn add_c_function_and_argument(
    req: *mut uv_work_t,
    function: c_work_fn,
    argument: *mut c_void,
) -> BridgeResult<()> {
    let original_user_data = (*req).data;
    if original_user_data.is_null() {
        return Err(BridgeError::NotRegistered);
    }
    fault::check_allocation()?;
    let aux = Box::new(CWork {
        original_user_data,
        function,
        argument,
    });
    CWORK_ALLOCATED.fetch_add(1, Ordering::Relaxed);
    (*req).data = Box::into_raw(aux).cast();
    ktrace!("c-work: attached to {:p}", req);
    Ok(())
}

/// Pool side of managed work.
pub unsafe extern "C" fn work_cb(req: *mut uv_work_t) {
    let bridge = bridge::global();
    ktrace!("work: {:p}", req);
    let _registration = ThreadRegistration::new(bridge.runtime());
    if let Some(anchor) = bridge.registry().resolve(req) {
        dispatch::call_unit(bridge, &anchor, WORK_FUNCTION, "work");
    }
}

/// Loop side of managed work. `status` is `UV_ECANCELED` for cancelled work.
pub unsafe extern "C" fn after_work_cb(req: *mut uv_work_t, status: c_int) {
    ktrace!("after-work: {:p} status={}", req, status);
    request::complete(req, "after-work", |bridge, anchor| {
        dispatch::call_int(bridge, anchor, GENERIC_CALLBACK, "after-work", status as i64);
    });
}

/// Pool side of native work. No lock, no registration.
pub unsafe extern "C" fn c_work_cb(req: *mut uv_work_t) {
    let aux = (*req).data as *const CWork;
    if aux.is_null() {
        kerror!("c-work: {:p} has no function attached", req);
        return;
    }
    ((*aux).function)((*aux).argument);
}

/// Undo [`add_c_function_and_argument`]: restore the anchor key and free
/// the auxiliary struct. Returns `false` if nothing was attached.
///
/// # Safety
///
/// `req` must not be queued, or its pool job must have finished.
pub unsafe fn remove_c_function_and_argument(req: *mut uv_work_t) -> bool {
    let aux = (*req).data as *mut CWork;
    if aux.is_null() {
        return false;
    }
    let aux = Box::from_raw(aux);
    (*req).data = aux.original_user_data;
    drop(aux);
    CWORK_FREED.fetch_add(1, Ordering::Relaxed);
    true
}

pub unsafe extern "C" fn after_c_work_cb(req: *mut uv_work_t, status: c_int) {
    if !remove_c_function_and_argument(req) {
        kerror!("after-c-work: {:p} has no function attached", req);
        return;
    }
    after_work_cb(req, status);
}
