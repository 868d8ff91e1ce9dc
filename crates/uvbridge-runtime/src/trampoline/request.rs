//! Request completion trampolines
//!
//! A request completes exactly once. Each trampoline here delivers the
//! completion to the generic slot and then releases the anchor, clearing
//! the request's user-data word so a repeated completion resolves to
//! nothing.

use core::ffi::{c_char, c_int, c_void};

use uvbridge_core::slot::GENERIC_CALLBACK;
use uvbridge_core::{kerror, ktrace, Anchor, ForeignObject};

use crate::abi::{
    uv_connect_t, uv_fs_t, uv_getaddrinfo_t, uv_getnameinfo_t, uv_random_t, uv_shutdown_t,
    uv_write_t,
};
use crate::bridge::{self, Bridge};
use crate::dispatch;
use crate::trampoline::handle::owned_str;

/// Deliver through `deliver`, then release the request's anchor.
pub(crate) unsafe fn complete<O: ForeignObject>(
    req: *mut O,
    what: &'static str,
    deliver: impl FnOnce(&Bridge, &Anchor),
) {
    let bridge = bridge::global();
    let Some(anchor) = bridge.registry().resolve(req) else {
        return;
    };
    deliver(bridge, &anchor);
    if let Err(e) = bridge.registry().release(req) {
        kerror!("{}: release of {} failed: {}", what, anchor.key(), e);
    }
}

pub(crate) unsafe fn complete_with_status<O: ForeignObject>(req: *mut O, status: c_int, what: &'static str) {
    ktrace!("{}: {:p} status={}", what, req, status);
    complete(req, what, |bridge, anchor| {
        dispatch::call_int(bridge, anchor, GENERIC_CALLBACK, what, status as i64);
    });
}

pub unsafe extern "C" fn write_cb(req: *mut uv_write_t, status: c_int) {
    complete_with_status(req, status, "write");
}

pub unsafe extern "C" fn connect_cb(req: *mut uv_connect_t, status: c_int) {
    complete_with_status(req, status, "connect");
}

pub unsafe extern "C" fn shutdown_cb(req: *mut uv_shutdown_t, status: c_int) {
    complete_with_status(req, status, "shutdown");
}

/// File system completion: the request's result field is the status.
pub unsafe extern "C" fn fs_cb(req: *mut uv_fs_t) {
    let result = (*req).result;
    ktrace!("fs: {:p} result={}", req, result);
    complete(req, "fs", |bridge, anchor| {
        dispatch::call_int(bridge, anchor, GENERIC_CALLBACK, "fs", result as i64);
    });
}

/// Name resolution. The `addrinfo` list passes to the managed side by
/// address; freeing it is the managed side's job.
pub unsafe extern "C" fn getaddrinfo_cb(req: *mut uv_getaddrinfo_t, status: c_int, res: *mut libc::addrinfo) {
    ktrace!("getaddrinfo: {:p} status={}", req, status);
    complete(req, "getaddrinfo", |bridge, anchor| {
        let addr = res as usize as i64;
        dispatch::call_int2(bridge, anchor, GENERIC_CALLBACK, "getaddrinfo", status as i64, addr);
    });
}

pub unsafe extern "C" fn getnameinfo_cb(
    req: *mut uv_getnameinfo_t,
    status: c_int,
    hostname: *const c_char,
    service: *const c_char,
) {
    ktrace!("getnameinfo: {:p} status={}", req, status);
    let host = owned_str(hostname);
    let service = owned_str(service);
    complete(req, "getnameinfo", |bridge, anchor| {
        dispatch::call_names(bridge, anchor, GENERIC_CALLBACK, status as i64, host, service);
    });
}

/// Random bytes landed in the buffer parked on the anchor when the
/// request was started. The callback sees the byte count, or the status
/// and no buffer on failure.
pub unsafe extern "C" fn random_cb(req: *mut uv_random_t, status: c_int, _buf: *mut c_void, len: usize) {
    ktrace!("random: {:p} status={} len={}", req, status, len);
    complete(req, "random", |bridge, anchor| {
        let buffer = anchor.take_buffer();
        let (count, buffer) = if status < 0 {
            (status as isize, None)
        } else {
            (len as isize, buffer)
        };
        dispatch::call_read(bridge, anchor, GENERIC_CALLBACK, "random", count, buffer);
    });
}
