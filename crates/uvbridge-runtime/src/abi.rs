//! Foreign event-loop ABI
//!
//! `#[repr(C)]` shapes of the loop, handle and request objects the bridge
//! touches, plus the callback signatures and status codes. The bridge only
//! ever reads the common prefix (`data`, `loop_`, `type_`); everything past
//! it belongs to the foreign runtime.

#![allow(non_camel_case_types)]

use core::ffi::{c_char, c_int, c_uint, c_void};
use std::sync::atomic::AtomicU32;

use uvbridge_core::{BridgeError, ForeignObject};

// Status codes: negative errno on unix.
macro_rules! uv_errno {
    ($name:ident, $unix:expr, $win:expr) => {
        #[cfg(unix)]
        pub const $name: c_int = -($unix);
        #[cfg(windows)]
        pub const $name: c_int = $win;
    };
}

uv_errno!(UV_EAGAIN, libc::EAGAIN, -4088);
uv_errno!(UV_EBUSY, libc::EBUSY, -4082);
uv_errno!(UV_ECANCELED, libc::ECANCELED, -4081);
uv_errno!(UV_ECONNRESET, libc::ECONNRESET, -4077);
uv_errno!(UV_EEXIST, libc::EEXIST, -4075);
uv_errno!(UV_EINVAL, libc::EINVAL, -4071);
uv_errno!(UV_ENOBUFS, libc::ENOBUFS, -4060);
uv_errno!(UV_ENOENT, libc::ENOENT, -4058);
uv_errno!(UV_ENOMEM, libc::ENOMEM, -4057);
uv_errno!(UV_ENOSPC, libc::ENOSPC, -4055);
uv_errno!(UV_ENOSYS, libc::ENOSYS, -4054);
uv_errno!(UV_ENOTSUP, libc::ENOTSUP, -4049);
uv_errno!(UV_EINTR, libc::EINTR, -4066);
pub const UV_EOF: c_int = -4095;

/// Map a bridge error to the status a native caller would see.
pub fn status_of(error: &BridgeError) -> c_int {
    match error {
        BridgeError::AllocationFailed => UV_ENOMEM,
        BridgeError::AlreadyRegistered => UV_EEXIST,
        BridgeError::NotRegistered => UV_EINVAL,
        BridgeError::AnchorTableFull => UV_ENOSPC,
        BridgeError::OutOfBounds { .. } => UV_EINVAL,
        BridgeError::SlotUnavailable { .. } => UV_EINVAL,
        BridgeError::AlreadyClosing => UV_EINVAL,
        BridgeError::AlreadyInstalled => UV_EEXIST,
        BridgeError::OnceSlotBusy => UV_EBUSY,
        BridgeError::Unsupported(_) => UV_ENOSYS,
        BridgeError::Foreign(code) => *code,
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum uv_handle_type {
    UV_UNKNOWN_HANDLE = 0,
    UV_ASYNC = 1,
    UV_CHECK = 2,
    UV_FS_EVENT = 3,
    UV_FS_POLL = 4,
    UV_HANDLE = 5,
    UV_IDLE = 6,
    UV_NAMED_PIPE = 7,
    UV_POLL = 8,
    UV_PREPARE = 9,
    UV_PROCESS = 10,
    UV_STREAM = 11,
    UV_TCP = 12,
    UV_TIMER = 13,
    UV_TTY = 14,
    UV_UDP = 15,
    UV_SIGNAL = 16,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum uv_req_type {
    UV_UNKNOWN_REQ = 0,
    UV_REQ = 1,
    UV_CONNECT = 2,
    UV_WRITE = 3,
    UV_SHUTDOWN = 4,
    UV_UDP_SEND = 5,
    UV_FS = 6,
    UV_WORK = 7,
    UV_GETADDRINFO = 8,
    UV_GETNAMEINFO = 9,
    UV_RANDOM = 10,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum uv_membership {
    UV_LEAVE_GROUP = 0,
    UV_JOIN_GROUP = 1,
}

#[repr(C)]
pub struct uv_loop_t {
    /// User data; the loop implementation keeps its state here.
    pub data: *mut c_void,
    pub active_handles: c_uint,
}

impl uv_loop_t {
    pub const fn new() -> Self {
        Self {
            data: core::ptr::null_mut(),
            active_handles: 0,
        }
    }
}

impl Default for uv_loop_t {
    fn default() -> Self {
        Self::new()
    }
}

/// Common prefix of every handle.
#[repr(C)]
pub struct uv_handle_t {
    pub data: *mut c_void,
    pub loop_: *mut uv_loop_t,
    pub type_: uv_handle_type,
    pub flags: c_uint,
}

/// Common prefix of every request.
#[repr(C)]
pub struct uv_req_t {
    pub data: *mut c_void,
    pub type_: uv_req_type,
}

macro_rules! handle_types {
    ($($name:ident => $tag:ident),* $(,)?) => {
        $(
            #[repr(C)]
            pub struct $name {
                pub data: *mut c_void,
                pub loop_: *mut uv_loop_t,
                pub type_: uv_handle_type,
                pub flags: c_uint,
            }

            impl $name {
                /// Uninitialized handle as the foreign `*_init` call expects it.
                pub const fn new() -> Self {
                    Self {
                        data: core::ptr::null_mut(),
                        loop_: core::ptr::null_mut(),
                        type_: uv_handle_type::$tag,
                        flags: 0,
                    }
                }

                #[inline]
                pub fn as_handle(&mut self) -> *mut uv_handle_t {
                    self as *mut Self as *mut uv_handle_t
                }
            }

            impl Default for $name {
                fn default() -> Self {
                    Self::new()
                }
            }

            unsafe impl ForeignObject for $name {
                #[inline]
                unsafe fn user_data(object: *const Self) -> *mut c_void {
                    (*object).data
                }

                #[inline]
                unsafe fn set_user_data(object: *mut Self, data: *mut c_void) {
                    (*object).data = data;
                }
            }
        )*
    };
}

handle_types! {
    uv_timer_t => UV_TIMER,
    uv_prepare_t => UV_PREPARE,
    uv_check_t => UV_CHECK,
    uv_idle_t => UV_IDLE,
    uv_async_t => UV_ASYNC,
    uv_poll_t => UV_POLL,
    uv_signal_t => UV_SIGNAL,
    uv_process_t => UV_PROCESS,
    uv_fs_event_t => UV_FS_EVENT,
    uv_fs_poll_t => UV_FS_POLL,
    uv_stream_t => UV_STREAM,
    uv_tcp_t => UV_TCP,
    uv_pipe_t => UV_NAMED_PIPE,
    uv_tty_t => UV_TTY,
    uv_udp_t => UV_UDP,
}

macro_rules! request_types {
    ($($name:ident => $tag:ident),* $(,)?) => {
        $(
            #[repr(C)]
            pub struct $name {
                pub data: *mut c_void,
                pub type_: uv_req_type,
                pub loop_: *mut uv_loop_t,
                /// Result of the operation, filled in before the completion callback
                pub result: isize,
            }

            impl $name {
                pub const fn new() -> Self {
                    Self {
                        data: core::ptr::null_mut(),
                        type_: uv_req_type::$tag,
                        loop_: core::ptr::null_mut(),
                        result: 0,
                    }
                }

                #[inline]
                pub fn as_req(&mut self) -> *mut uv_req_t {
                    self as *mut Self as *mut uv_req_t
                }
            }

            impl Default for $name {
                fn default() -> Self {
                    Self::new()
                }
            }

            unsafe impl ForeignObject for $name {
                #[inline]
                unsafe fn user_data(object: *const Self) -> *mut c_void {
                    (*object).data
                }

                #[inline]
                unsafe fn set_user_data(object: *mut Self, data: *mut c_void) {
                    (*object).data = data;
                }
            }
        )*
    };
}

request_types! {
    uv_write_t => UV_WRITE,
    uv_connect_t => UV_CONNECT,
    uv_shutdown_t => UV_SHUTDOWN,
    uv_udp_send_t => UV_UDP_SEND,
    uv_fs_t => UV_FS,
    uv_work_t => UV_WORK,
    uv_getaddrinfo_t => UV_GETADDRINFO,
    uv_getnameinfo_t => UV_GETNAMEINFO,
    uv_random_t => UV_RANDOM,
}

unsafe impl ForeignObject for uv_handle_t {
    #[inline]
    unsafe fn user_data(object: *const Self) -> *mut c_void {
        (*object).data
    }

    #[inline]
    unsafe fn set_user_data(object: *mut Self, data: *mut c_void) {
        (*object).data = data;
    }
}

unsafe impl ForeignObject for uv_req_t {
    #[inline]
    unsafe fn user_data(object: *const Self) -> *mut c_void {
        (*object).data
    }

    #[inline]
    unsafe fn set_user_data(object: *mut Self, data: *mut c_void) {
        (*object).data = data;
    }
}

/// I/O buffer descriptor.
#[cfg(unix)]
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct uv_buf_t {
    pub base: *mut c_char,
    pub len: usize,
}

#[cfg(windows)]
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct uv_buf_t {
    pub len: u32,
    pub base: *mut c_char,
}

impl uv_buf_t {
    pub const fn empty() -> Self {
        uv_buf_t {
            base: core::ptr::null_mut(),
            len: 0,
        }
    }

    /// Descriptor over `len` bytes at `base`.
    #[inline]
    pub fn init(base: *mut c_char, len: usize) -> Self {
        uv_buf_t {
            base,
            len: len as _,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.base.is_null() || self.len == 0
    }
}

/// File status as reported to fs-poll callbacks.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct uv_stat_t {
    pub st_dev: u64,
    pub st_mode: u64,
    pub st_size: u64,
    pub st_mtim_sec: i64,
    pub st_mtim_nsec: i64,
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        pub type uv_thread_t = libc::pthread_t;
    } else {
        pub type uv_thread_t = usize;
    }
}

pub const UV_ONCE_INIT: uv_once_t = uv_once_t {
    state: AtomicU32::new(0),
};

/// Guard for the foreign run-once primitive.
#[repr(C)]
pub struct uv_once_t {
    pub state: AtomicU32,
}

impl Default for uv_once_t {
    fn default() -> Self {
        UV_ONCE_INIT
    }
}

pub type uv_close_cb = unsafe extern "C" fn(*mut uv_handle_t);
pub type uv_timer_cb = unsafe extern "C" fn(*mut uv_timer_t);
pub type uv_prepare_cb = unsafe extern "C" fn(*mut uv_prepare_t);
pub type uv_check_cb = unsafe extern "C" fn(*mut uv_check_t);
pub type uv_idle_cb = unsafe extern "C" fn(*mut uv_idle_t);
pub type uv_async_cb = unsafe extern "C" fn(*mut uv_async_t);
pub type uv_poll_cb = unsafe extern "C" fn(*mut uv_poll_t, c_int, c_int);
pub type uv_signal_cb = unsafe extern "C" fn(*mut uv_signal_t, c_int);
pub type uv_exit_cb = unsafe extern "C" fn(*mut uv_process_t, i64, c_int);
pub type uv_fs_event_cb = unsafe extern "C" fn(*mut uv_fs_event_t, *const c_char, c_int, c_int);
pub type uv_fs_poll_cb =
    unsafe extern "C" fn(*mut uv_fs_poll_t, c_int, *const uv_stat_t, *const uv_stat_t);
pub type uv_alloc_cb = unsafe extern "C" fn(*mut uv_handle_t, usize, *mut uv_buf_t);
pub type uv_read_cb = unsafe extern "C" fn(*mut uv_stream_t, isize, *const uv_buf_t);
pub type uv_connection_cb = unsafe extern "C" fn(*mut uv_stream_t, c_int);
pub type uv_udp_recv_cb =
    unsafe extern "C" fn(*mut uv_udp_t, isize, *const uv_buf_t, *const libc::sockaddr, c_uint);
pub type uv_udp_send_cb = unsafe extern "C" fn(*mut uv_udp_send_t, c_int);
pub type uv_write_cb = unsafe extern "C" fn(*mut uv_write_t, c_int);
pub type uv_connect_cb = unsafe extern "C" fn(*mut uv_connect_t, c_int);
pub type uv_shutdown_cb = unsafe extern "C" fn(*mut uv_shutdown_t, c_int);
pub type uv_fs_cb = unsafe extern "C" fn(*mut uv_fs_t);
pub type uv_getaddrinfo_cb = unsafe extern "C" fn(*mut uv_getaddrinfo_t, c_int, *mut libc::addrinfo);
pub type uv_getnameinfo_cb =
    unsafe extern "C" fn(*mut uv_getnameinfo_t, c_int, *const c_char, *const c_char);
pub type uv_random_cb = unsafe extern "C" fn(*mut uv_random_t, c_int, *mut c_void, usize);
pub type uv_work_cb = unsafe extern "C" fn(*mut uv_work_t);
pub type uv_after_work_cb = unsafe extern "C" fn(*mut uv_work_t, c_int);
pub type uv_thread_cb = unsafe extern "C" fn(*mut c_void);
pub type uv_once_cb = unsafe extern "C" fn();

/// Plain native function scheduled on the pool without managed code.
pub type c_work_fn = unsafe extern "C" fn(*mut c_void);

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::{offset_of, size_of};

    #[test]
    fn test_prefixes_line_up() {
        assert_eq!(offset_of!(uv_timer_t, data), offset_of!(uv_handle_t, data));
        assert_eq!(offset_of!(uv_tcp_t, loop_), offset_of!(uv_handle_t, loop_));
        assert_eq!(offset_of!(uv_udp_t, type_), offset_of!(uv_handle_t, type_));
        assert_eq!(offset_of!(uv_work_t, data), offset_of!(uv_req_t, data));
        assert_eq!(offset_of!(uv_fs_t, type_), offset_of!(uv_req_t, type_));
        assert_eq!(offset_of!(uv_loop_t, data), 0);
    }

    #[test]
    fn test_buf_is_iovec_sized() {
        assert_eq!(size_of::<uv_buf_t>(), 2 * size_of::<usize>());
    }

    #[test]
    fn test_status_of() {
        assert_eq!(status_of(&BridgeError::AllocationFailed), UV_ENOMEM);
        assert_eq!(status_of(&BridgeError::OutOfBounds { offset: 0, len: 1, capacity: 0 }), UV_EINVAL);
        assert_eq!(status_of(&BridgeError::Foreign(UV_EOF)), UV_EOF);
        assert!(status_of(&BridgeError::OnceSlotBusy) < 0);
    }

    #[test]
    fn test_handle_tags() {
        assert_eq!(uv_timer_t::new().type_, uv_handle_type::UV_TIMER);
        assert_eq!(uv_work_t::new().type_, uv_req_type::UV_WORK);
    }
}
