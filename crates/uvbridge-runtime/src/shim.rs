//! Foreign entry points and capability probing
//!
//! The bridge calls the foreign library only through a [`ForeignApi`]
//! table. Every entry is always callable: a build that lacks a function
//! gets the matching stub from [`ForeignApi::stubbed`], which reports
//! `UV_ENOSYS`. Which entries are real decides the capability set, so
//! callers ask "can I do this" instead of comparing library versions.

use core::ffi::{c_char, c_int, c_uint, c_void};

use uvbridge_core::{kdebug, Capability, CapabilityProbe, CapabilitySet};

use crate::abi::*;

pub type VersionFn = unsafe extern "C" fn() -> c_uint;
pub type CloseFn = unsafe extern "C" fn(*mut uv_handle_t, Option<uv_close_cb>);
pub type TcpCloseResetFn = unsafe extern "C" fn(*mut uv_tcp_t, Option<uv_close_cb>) -> c_int;
pub type QueueWorkFn =
    unsafe extern "C" fn(*mut uv_loop_t, *mut uv_work_t, Option<uv_work_cb>, Option<uv_after_work_cb>) -> c_int;
pub type ThreadCreateFn = unsafe extern "C" fn(*mut uv_thread_t, Option<uv_thread_cb>, *mut c_void) -> c_int;
pub type ThreadJoinFn = unsafe extern "C" fn(*mut uv_thread_t) -> c_int;
pub type OnceFn = unsafe extern "C" fn(*mut uv_once_t, Option<uv_once_cb>);
pub type UdpSetSourceMembershipFn = unsafe extern "C" fn(
    *mut uv_udp_t,
    *const c_char,
    *const c_char,
    *const c_char,
    uv_membership,
) -> c_int;
pub type SignalStartOneshotFn = unsafe extern "C" fn(*mut uv_signal_t, Option<uv_signal_cb>, c_int) -> c_int;

/// Encode a library version the way the foreign `version()` call does.
pub const fn version_hex(major: u32, minor: u32, patch: u32) -> u32 {
    (major << 16) | (minor << 8) | patch
}

/// Capabilities that are flags rather than functions, by first version.
const FLAG_CAPABILITIES: [(Capability, u32); 3] = [
    (Capability::FsCopyfileFiclone, version_hex(1, 20, 0)),
    (Capability::UdpRecvMmsg, version_hex(1, 37, 0)),
    (Capability::MetricsIdleTime, version_hex(1, 39, 0)),
];

/// Foreign entry points the bridge depends on.
#[derive(Clone, Copy)]
pub struct ForeignApi {
    pub version: VersionFn,
    pub close: CloseFn,
    pub tcp_close_reset: TcpCloseResetFn,
    pub queue_work: QueueWorkFn,
    pub thread_create: ThreadCreateFn,
    pub thread_join: ThreadJoinFn,
    pub once: OnceFn,
    pub udp_set_source_membership: UdpSetSourceMembershipFn,
    pub signal_start_oneshot: SignalStartOneshotFn,
}

unsafe extern "C" fn stub_version() -> c_uint {
    0
}

unsafe extern "C" fn stub_close(_handle: *mut uv_handle_t, _cb: Option<uv_close_cb>) {}

unsafe extern "C" fn stub_tcp_close_reset(_handle: *mut uv_tcp_t, _cb: Option<uv_close_cb>) -> c_int {
    UV_ENOSYS
}

unsafe extern "C" fn stub_queue_work(
    _loop: *mut uv_loop_t,
    _req: *mut uv_work_t,
    _work: Option<uv_work_cb>,
    _after: Option<uv_after_work_cb>,
) -> c_int {
    UV_ENOSYS
}

unsafe extern "C" fn stub_thread_create(
    _tid: *mut uv_thread_t,
    _entry: Option<uv_thread_cb>,
    _arg: *mut c_void,
) -> c_int {
    UV_ENOSYS
}

unsafe extern "C" fn stub_thread_join(_tid: *mut uv_thread_t) -> c_int {
    UV_ENOSYS
}

unsafe extern "C" fn stub_once(_guard: *mut uv_once_t, _cb: Option<uv_once_cb>) {}

unsafe extern "C" fn stub_udp_set_source_membership(
    _handle: *mut uv_udp_t,
    _multicast: *const c_char,
    _interface: *const c_char,
    _source: *const c_char,
    _membership: uv_membership,
) -> c_int {
    UV_ENOSYS
}

unsafe extern "C" fn stub_signal_start_oneshot(
    _handle: *mut uv_signal_t,
    _cb: Option<uv_signal_cb>,
    _signum: c_int,
) -> c_int {
    UV_ENOSYS
}

impl ForeignApi {
    /// Every entry a stub.
    pub const fn stubbed() -> Self {
        ForeignApi {
            version: stub_version,
            close: stub_close,
            tcp_close_reset: stub_tcp_close_reset,
            queue_work: stub_queue_work,
            thread_create: stub_thread_create,
            thread_join: stub_thread_join,
            once: stub_once,
            udp_set_source_membership: stub_udp_set_source_membership,
            signal_start_oneshot: stub_signal_start_oneshot,
        }
    }

    /// Version reported by the bound library (0 for a stub).
    pub fn version(&self) -> u32 {
        unsafe { (self.version)() }
    }

    /// Capabilities of this table, logged once at debug level.
    pub fn capabilities(&self) -> CapabilitySet {
        let set = CapabilitySet::probe(self);
        kdebug!("foreign api {:#08x}: {:?}", self.version(), set);
        set
    }
}

impl Default for ForeignApi {
    fn default() -> Self {
        Self::stubbed()
    }
}

impl CapabilityProbe for ForeignApi {
    fn supports(&self, capability: Capability) -> bool {
        let stub = Self::stubbed();
        match capability {
            Capability::TcpCloseReset => self.tcp_close_reset as usize != stub.tcp_close_reset as usize,
            Capability::UdpSourceMembership => {
                self.udp_set_source_membership as usize != stub.udp_set_source_membership as usize
            }
            Capability::SignalOneshot => {
                self.signal_start_oneshot as usize != stub.signal_start_oneshot as usize
            }
            Capability::Threads => {
                self.thread_create as usize != stub.thread_create as usize
                    && self.thread_join as usize != stub.thread_join as usize
            }
            Capability::Once => self.once as usize != stub.once as usize,
            Capability::WorkQueue => self.queue_work as usize != stub.queue_work as usize,
            flag => FLAG_CAPABILITIES
                .iter()
                .any(|&(c, since)| c == flag && self.version() >= since),
        }
    }
}

impl core::fmt::Debug for ForeignApi {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ForeignApi")
            .field("version", &format_args!("{:#08x}", self.version()))
            .field("capabilities", &CapabilitySet::probe(self))
            .finish()
    }
}

/// Values missing from older foreign headers.
pub mod fallback {
    use core::ffi::c_int;

    /// Flag is ignored by builds without batched receive.
    pub const UV_UDP_RECVMMSG: c_int = 0;
    /// Sentinels that no foreign call ever returns.
    pub const UV_EILSEQ: c_int = 0x0424_2424;
    pub const UV_EFTYPE: c_int = 0x1424_2424;
    pub const UV_ENOTTY: c_int = 0x2424_2424;
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe extern "C" fn real_once(_guard: *mut uv_once_t, cb: Option<uv_once_cb>) {
        if let Some(cb) = cb {
            cb();
        }
    }

    unsafe extern "C" fn version_1_38() -> c_uint {
        version_hex(1, 38, 0)
    }

    #[test]
    fn test_stubbed_supports_nothing() {
        let api = ForeignApi::stubbed();
        assert!(api.capabilities().is_empty());
        assert_eq!(api.version(), 0);
    }

    #[test]
    fn test_stub_reports_enosys() {
        let api = ForeignApi::stubbed();
        let rc = unsafe { (api.tcp_close_reset)(core::ptr::null_mut(), None) };
        assert_eq!(rc, UV_ENOSYS);
    }

    #[test]
    fn test_probe_sees_real_entries() {
        let api = ForeignApi {
            once: real_once,
            version: version_1_38,
            ..ForeignApi::stubbed()
        };
        let caps = api.capabilities();
        assert!(caps.contains(Capability::Once));
        assert!(caps.contains(Capability::UdpRecvMmsg));
        assert!(caps.contains(Capability::FsCopyfileFiclone));
        assert!(!caps.contains(Capability::MetricsIdleTime));
        assert!(!caps.contains(Capability::Threads));
    }

    #[test]
    fn test_fallback_sentinels_are_not_errors() {
        assert!(fallback::UV_EILSEQ > 0);
        assert_ne!(fallback::UV_EFTYPE, fallback::UV_ENOTTY);
    }
}
