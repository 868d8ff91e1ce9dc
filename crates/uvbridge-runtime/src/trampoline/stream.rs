//! Stream trampolines
//!
//! A read is always preceded by an allocation on the same handle. The
//! buffer the allocate callback returns is parked on the anchor until the
//! read claims it, so the managed side never loses track of storage the
//! foreign runtime is writing into.

use core::ffi::c_int;

use uvbridge_core::slot::{ALLOCATE_CALLBACK, CONNECTION_CALLBACK, GENERIC_CALLBACK, UDP_ALLOCATE_CALLBACK};
use uvbridge_core::{kwarn, ktrace, Anchor};

use crate::abi::{uv_buf_t, uv_handle_t, uv_stream_t};
use crate::bridge::{self, Bridge};
use crate::dispatch;

/// Fill `buf` from the allocate callback in slot `index`.
pub(crate) unsafe fn allocate_into(
    bridge: &Bridge,
    anchor: &Anchor,
    index: usize,
    what: &'static str,
    suggested: usize,
    buf: *mut uv_buf_t,
) {
    let size = if suggested == 0 {
        bridge.config().suggested_alloc
    } else {
        suggested
    };
    let Some(buffer) = dispatch::call_alloc(bridge, anchor, index, what, size) else {
        return;
    };
    *buf = uv_buf_t::init(buffer.as_mut_ptr().cast(), buffer.len());
    if anchor.stash_buffer(buffer).is_some() {
        kwarn!("{}: {} had an unclaimed buffer", what, anchor.key());
    }
}

unsafe fn alloc_for_slot(handle: *mut uv_handle_t, suggested: usize, buf: *mut uv_buf_t, index: usize, what: &'static str) {
    if buf.is_null() {
        return;
    }
    // An empty descriptor tells the foreign side no memory was provided.
    *buf = uv_buf_t::empty();
    let bridge = bridge::global();
    ktrace!("{}: {:p} suggested={}", what, handle, suggested);
    if let Some(anchor) = bridge.registry().resolve(handle) {
        allocate_into(bridge, &anchor, index, what, suggested, buf);
    }
}

pub unsafe extern "C" fn alloc_cb(handle: *mut uv_handle_t, suggested: usize, buf: *mut uv_buf_t) {
    alloc_for_slot(handle, suggested, buf, ALLOCATE_CALLBACK, "alloc");
}

pub unsafe extern "C" fn udp_alloc_cb(handle: *mut uv_handle_t, suggested: usize, buf: *mut uv_buf_t) {
    alloc_for_slot(handle, suggested, buf, UDP_ALLOCATE_CALLBACK, "udp-alloc");
}

/// Reads arrive through the generic slot.
///
/// The count is forwarded untouched: zero is a would-block read, negative
/// is a status code. The parked buffer goes with every non-negative count.
pub unsafe extern "C" fn read_cb(stream: *mut uv_stream_t, nread: isize, _buf: *const uv_buf_t) {
    let bridge = bridge::global();
    ktrace!("read: {:p} nread={}", stream, nread);
    let Some(anchor) = bridge.registry().resolve(stream) else {
        return;
    };
    let buffer = anchor.take_buffer();
    let buffer = if nread >= 0 { buffer } else { None };
    dispatch::call_read(bridge, &anchor, GENERIC_CALLBACK, "read", nread, buffer);
}

pub unsafe extern "C" fn connection_cb(server: *mut uv_stream_t, status: c_int) {
    let bridge = bridge::global();
    ktrace!("connection: {:p} status={}", server, status);
    if let Some(anchor) = bridge.registry().resolve(server) {
        dispatch::call_int(bridge, &anchor, CONNECTION_CALLBACK, "connection", status as i64);
    }
}
