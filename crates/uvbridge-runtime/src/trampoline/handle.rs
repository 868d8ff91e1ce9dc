//! Handle trampolines
//!
//! Long-lived handles: every callback here except `close_cb` may fire
//! many times, and none of them releases the anchor.

use core::ffi::{c_char, c_int, CStr};

use uvbridge_core::slot::{CLOSE_CALLBACK, GENERIC_CALLBACK};
use uvbridge_core::{kerror, ktrace};

use crate::abi::{
    uv_async_t, uv_check_t, uv_fs_event_t, uv_fs_poll_t, uv_handle_t, uv_idle_t, uv_poll_t,
    uv_prepare_t, uv_process_t, uv_signal_t, uv_stat_t, uv_timer_t,
};
use crate::bridge;
use crate::dispatch;

macro_rules! nullary_trampolines {
    ($($(#[$meta:meta])* $name:ident($handle:ty) => $what:literal;)*) => {
        $(
            $(#[$meta])*
            pub unsafe extern "C" fn $name(handle: *mut $handle) {
                let bridge = bridge::global();
                ktrace!("{}: {:p}", $what, handle);
                if let Some(anchor) = bridge.registry().resolve(handle) {
                    dispatch::call_unit(bridge, &anchor, GENERIC_CALLBACK, $what);
                }
            }
        )*
    };
}

nullary_trampolines! {
    timer_cb(uv_timer_t) => "timer";
    prepare_cb(uv_prepare_t) => "prepare";
    check_cb(uv_check_t) => "check";
    idle_cb(uv_idle_t) => "idle";
    /// Wakeup from `uv_async_send`, possibly coalesced.
    async_cb(uv_async_t) => "async";
}

pub unsafe extern "C" fn poll_cb(handle: *mut uv_poll_t, status: c_int, events: c_int) {
    let bridge = bridge::global();
    ktrace!("poll: {:p} status={} events={:#x}", handle, status, events);
    if let Some(anchor) = bridge.registry().resolve(handle) {
        dispatch::call_int2(bridge, &anchor, GENERIC_CALLBACK, "poll", status as i64, events as i64);
    }
}

pub unsafe extern "C" fn signal_cb(handle: *mut uv_signal_t, signum: c_int) {
    let bridge = bridge::global();
    ktrace!("signal: {:p} {}", handle, signal_name(signum));
    if let Some(anchor) = bridge.registry().resolve(handle) {
        dispatch::call_int(bridge, &anchor, GENERIC_CALLBACK, "signal", signum as i64);
    }
}

/// Process exit. The process handle stays open until closed.
pub unsafe extern "C" fn exit_cb(handle: *mut uv_process_t, exit_status: i64, term_signal: c_int) {
    let bridge = bridge::global();
    ktrace!("exit: {:p} status={} signal={}", handle, exit_status, term_signal);
    if let Some(anchor) = bridge.registry().resolve(handle) {
        dispatch::call_int2(bridge, &anchor, GENERIC_CALLBACK, "exit", exit_status, term_signal as i64);
    }
}

pub unsafe extern "C" fn fs_event_cb(
    handle: *mut uv_fs_event_t,
    filename: *const c_char,
    events: c_int,
    status: c_int,
) {
    let bridge = bridge::global();
    ktrace!("fs-event: {:p} events={} status={}", handle, events, status);
    if let Some(anchor) = bridge.registry().resolve(handle) {
        let path = owned_str(filename);
        dispatch::call_path(bridge, &anchor, GENERIC_CALLBACK, path, events as i64, status as i64);
    }
}

/// The stat structs are only valid during the call; their addresses are
/// passed through for the managed side to read immediately.
pub unsafe extern "C" fn fs_poll_cb(
    handle: *mut uv_fs_poll_t,
    status: c_int,
    prev: *const uv_stat_t,
    curr: *const uv_stat_t,
) {
    let bridge = bridge::global();
    ktrace!("fs-poll: {:p} status={}", handle, status);
    if let Some(anchor) = bridge.registry().resolve(handle) {
        let args = (status as i64, prev as usize as i64, curr as usize as i64);
        dispatch::call_int3(bridge, &anchor, GENERIC_CALLBACK, "fs-poll", args);
    }
}

/// Terminal callback of every handle.
///
/// Runs the close callback, then releases the anchor. No callback for
/// this handle can follow.
pub unsafe extern "C" fn close_cb(handle: *mut uv_handle_t) {
    let bridge = bridge::global();
    ktrace!("close: {:p}", handle);
    let Some(anchor) = bridge.registry().resolve(handle) else {
        return;
    };
    anchor.mark_closing();
    dispatch::call_unit(bridge, &anchor, CLOSE_CALLBACK, "close");
    if let Err(e) = bridge.registry().release(handle) {
        kerror!("close: release of {} failed: {}", anchor.key(), e);
    }
}

/// Copy a foreign C string, `None` for null.
pub(crate) unsafe fn owned_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
}

fn signal_name(signum: c_int) -> &'static str {
    cfg_if::cfg_if! {
        if #[cfg(unix)] {
            match nix::sys::signal::Signal::try_from(signum) {
                Ok(signal) => signal.as_str(),
                Err(_) => "unknown signal",
            }
        } else {
            let _ = signum;
            "signal"
        }
    }
}
