//! Trampoline dispatcher
//!
//! One `extern "C"` function per foreign callback shape. Each resolves the
//! object's anchor, reads the slot for its role, and dispatches under the
//! runtime lock.
//!
//! Registration code that hands callbacks to the foreign runtime through
//! untyped tables asks [`address_of`] for the pointer; roles whose
//! registration call accepts "no callback" also have a
//! [`null_variant`].

pub mod handle;
pub mod stream;
pub mod udp;
pub mod request;
pub mod work;
pub mod thread;
pub mod once;

use core::ffi::c_void;

use crate::abi::*;

pub type TrampolinePtr = *const c_void;

/// Every callback role with a trampoline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trampoline {
    Timer,
    Prepare,
    Check,
    Idle,
    Async,
    Poll,
    Signal,
    Exit,
    FsEvent,
    FsPoll,
    Close,
    Alloc,
    Read,
    Connection,
    UdpAlloc,
    UdpRecv,
    UdpSend,
    Write,
    Connect,
    Shutdown,
    Fs,
    GetAddrInfo,
    GetNameInfo,
    Random,
    Work,
    AfterWork,
    CWork,
    AfterCWork,
    ThreadEntry,
    Once,
}

impl Trampoline {
    pub const ALL: [Trampoline; 30] = [
        Trampoline::Timer,
        Trampoline::Prepare,
        Trampoline::Check,
        Trampoline::Idle,
        Trampoline::Async,
        Trampoline::Poll,
        Trampoline::Signal,
        Trampoline::Exit,
        Trampoline::FsEvent,
        Trampoline::FsPoll,
        Trampoline::Close,
        Trampoline::Alloc,
        Trampoline::Read,
        Trampoline::Connection,
        Trampoline::UdpAlloc,
        Trampoline::UdpRecv,
        Trampoline::UdpSend,
        Trampoline::Write,
        Trampoline::Connect,
        Trampoline::Shutdown,
        Trampoline::Fs,
        Trampoline::GetAddrInfo,
        Trampoline::GetNameInfo,
        Trampoline::Random,
        Trampoline::Work,
        Trampoline::AfterWork,
        Trampoline::CWork,
        Trampoline::AfterCWork,
        Trampoline::ThreadEntry,
        Trampoline::Once,
    ];
}

/// Address of the trampoline for `role`.
pub fn address_of(role: Trampoline) -> TrampolinePtr {
    match role {
        Trampoline::Timer => handle::timer_cb as uv_timer_cb as TrampolinePtr,
        Trampoline::Prepare => handle::prepare_cb as uv_prepare_cb as TrampolinePtr,
        Trampoline::Check => handle::check_cb as uv_check_cb as TrampolinePtr,
        Trampoline::Idle => handle::idle_cb as uv_idle_cb as TrampolinePtr,
        Trampoline::Async => handle::async_cb as uv_async_cb as TrampolinePtr,
        Trampoline::Poll => handle::poll_cb as uv_poll_cb as TrampolinePtr,
        Trampoline::Signal => handle::signal_cb as uv_signal_cb as TrampolinePtr,
        Trampoline::Exit => handle::exit_cb as uv_exit_cb as TrampolinePtr,
        Trampoline::FsEvent => handle::fs_event_cb as uv_fs_event_cb as TrampolinePtr,
        Trampoline::FsPoll => handle::fs_poll_cb as uv_fs_poll_cb as TrampolinePtr,
        Trampoline::Close => handle::close_cb as uv_close_cb as TrampolinePtr,
        Trampoline::Alloc => stream::alloc_cb as uv_alloc_cb as TrampolinePtr,
        Trampoline::Read => stream::read_cb as uv_read_cb as TrampolinePtr,
        Trampoline::Connection => stream::connection_cb as uv_connection_cb as TrampolinePtr,
        Trampoline::UdpAlloc => stream::udp_alloc_cb as uv_alloc_cb as TrampolinePtr,
        Trampoline::UdpRecv => udp::recv_cb as uv_udp_recv_cb as TrampolinePtr,
        Trampoline::UdpSend => udp::send_cb as uv_udp_send_cb as TrampolinePtr,
        Trampoline::Write => request::write_cb as uv_write_cb as TrampolinePtr,
        Trampoline::Connect => request::connect_cb as uv_connect_cb as TrampolinePtr,
        Trampoline::Shutdown => request::shutdown_cb as uv_shutdown_cb as TrampolinePtr,
        Trampoline::Fs => request::fs_cb as uv_fs_cb as TrampolinePtr,
        Trampoline::GetAddrInfo => request::getaddrinfo_cb as uv_getaddrinfo_cb as TrampolinePtr,
        Trampoline::GetNameInfo => request::getnameinfo_cb as uv_getnameinfo_cb as TrampolinePtr,
        Trampoline::Random => request::random_cb as uv_random_cb as TrampolinePtr,
        Trampoline::Work => work::work_cb as uv_work_cb as TrampolinePtr,
        Trampoline::AfterWork => work::after_work_cb as uv_after_work_cb as TrampolinePtr,
        Trampoline::CWork => work::c_work_cb as uv_work_cb as TrampolinePtr,
        Trampoline::AfterCWork => work::after_c_work_cb as uv_after_work_cb as TrampolinePtr,
        Trampoline::ThreadEntry => thread::thread_entry as uv_thread_cb as TrampolinePtr,
        Trampoline::Once => once::once_cb as uv_once_cb as TrampolinePtr,
    }
}

/// Literal null for roles where the foreign runtime accepts "no callback".
///
/// Returns `None` for roles that must always be given a trampoline.
pub fn null_variant(role: Trampoline) -> Option<TrampolinePtr> {
    match role {
        Trampoline::Exit
        | Trampoline::Fs
        | Trampoline::UdpSend
        | Trampoline::Write
        | Trampoline::Connect
        | Trampoline::Shutdown
        | Trampoline::Close => Some(core::ptr::null()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_addresses_distinct_and_non_null() {
        let mut seen = HashSet::new();
        for role in Trampoline::ALL {
            let ptr = address_of(role);
            assert!(!ptr.is_null(), "{:?}", role);
            assert!(seen.insert(ptr as usize), "{:?} shares an address", role);
        }
    }

    #[test]
    fn test_null_variants() {
        assert_eq!(null_variant(Trampoline::Write), Some(core::ptr::null()));
        assert_eq!(null_variant(Trampoline::Exit), Some(core::ptr::null()));
        assert_eq!(null_variant(Trampoline::Read), None);
        assert_eq!(null_variant(Trampoline::Once), None);
    }
}
