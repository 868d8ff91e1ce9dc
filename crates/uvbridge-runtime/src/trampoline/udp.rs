//! UDP receive and send-completion trampolines
//!
//! Allocation for UDP handles goes through `stream::udp_alloc_cb`, which
//! reads the UDP allocate slot.

use core::ffi::{c_int, c_uint};

use uvbridge_core::ktrace;
use uvbridge_core::slot::GENERIC_CALLBACK;

use crate::abi::{uv_buf_t, uv_udp_send_t, uv_udp_t};
use crate::bridge;
use crate::dispatch;
use crate::trampoline::request;

/// Datagram or status on a UDP handle.
///
/// `addr` is the sender's sockaddr, valid only during the call, passed as
/// an address (0 when the foreign side has none).
pub unsafe extern "C" fn recv_cb(
    handle: *mut uv_udp_t,
    nread: isize,
    _buf: *const uv_buf_t,
    addr: *const libc::sockaddr,
    flags: c_uint,
) {
    let bridge = bridge::global();
    ktrace!("udp-recv: {:p} nread={} flags={:#x}", handle, nread, flags);
    let Some(anchor) = bridge.registry().resolve(handle) else {
        return;
    };
    let buffer = anchor.take_buffer();
    let buffer = if nread >= 0 { buffer } else { None };
    dispatch::call_recv(bridge, &anchor, GENERIC_CALLBACK, nread, buffer, addr as usize, flags);
}

pub unsafe extern "C" fn send_cb(req: *mut uv_udp_send_t, status: c_int) {
    request::complete_with_status(req, status, "udp-send");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trampoline::handle::close_cb;
    use crate::trampoline::stream::udp_alloc_cb;
    use std::sync::{Arc, Mutex};
    use uvbridge_core::{Callback, ManagedBuffer, ObjectKind, SlotRole, SlotTable};

    #[test]
    fn test_recv_gets_allocated_buffer_and_sender() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        let table = SlotTable::new(ObjectKind::Udp)
            .unwrap()
            .with(SlotRole::UdpAllocate, Callback::alloc(|n| ManagedBuffer::new(n).ok()))
            .unwrap()
            .with(
                SlotRole::Generic,
                Callback::recv(move |nread, buf, addr, flags| {
                    let bytes = buf.map(|b| b.copy_prefix(nread as usize));
                    seen2.lock().unwrap().push((nread, bytes, addr != 0, flags));
                }),
            )
            .unwrap();

        let mut udp = uv_udp_t::new();
        let sender: libc::sockaddr = unsafe { core::mem::zeroed() };
        unsafe {
            bridge::global().registry().register(&mut udp as *mut _, table).unwrap();
            let mut buf = uv_buf_t::empty();
            udp_alloc_cb(udp.as_handle(), 16, &mut buf);
            *buf.base = b'x' as _;
            recv_cb(&mut udp, 1, &buf, &sender, 0);
            // Nothing more to read: zero bytes and no sender.
            udp_alloc_cb(udp.as_handle(), 16, &mut buf);
            recv_cb(&mut udp, 0, &buf, core::ptr::null(), 0);
            close_cb(udp.as_handle());
        }

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], (1, Some(b"x".to_vec()), true, 0));
        assert_eq!(seen[1], (0, Some(Vec::new()), false, 0));
    }
}
