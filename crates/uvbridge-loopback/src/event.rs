//! Events queued for the loop thread
//!
//! Foreign objects travel as addresses so events can be posted from any
//! thread. The loop thread turns them back into pointers.

use core::ffi::c_int;
use std::ffi::CString;

use uvbridge_runtime::abi::*;

pub(crate) enum Event {
    Read {
        stream: usize,
        nread: isize,
        data: Vec<u8>,
    },
    Recv {
        udp: usize,
        nread: isize,
        data: Vec<u8>,
        has_sender: bool,
    },
    Connection {
        server: usize,
        status: c_int,
    },
    /// Timer expiry or signal delivery, depending on the handle's watcher
    Fire {
        handle: usize,
    },
    Poll {
        handle: usize,
        status: c_int,
        events: c_int,
    },
    Exit {
        process: usize,
        status: i64,
        signal: c_int,
    },
    Complete {
        req: usize,
        status: c_int,
    },
    AfterWork {
        req: usize,
        status: c_int,
        after: Option<uv_after_work_cb>,
    },
}

impl Event {
    /// Handle the event targets, `None` for request events.
    pub(crate) fn handle(&self) -> Option<usize> {
        match self {
            Event::Read { stream, .. } => Some(*stream),
            Event::Recv { udp, .. } => Some(*udp),
            Event::Connection { server, .. } => Some(*server),
            Event::Fire { handle } | Event::Poll { handle, .. } => Some(*handle),
            Event::Exit { process, .. } => Some(*process),
            Event::Complete { .. } | Event::AfterWork { .. } => None,
        }
    }
}

/// What a handle is started for.
#[derive(Clone, Copy)]
pub(crate) enum Watcher {
    Timer(uv_timer_cb),
    Signal {
        cb: uv_signal_cb,
        signum: c_int,
        oneshot: bool,
    },
    Poll(uv_poll_cb),
    Process(Option<uv_exit_cb>),
    Listen(uv_connection_cb),
}

#[derive(Clone, Copy)]
pub(crate) enum Reading {
    Stream(uv_alloc_cb, uv_read_cb),
    Udp(uv_alloc_cb, uv_udp_recv_cb),
}

/// Completion a submitted request is waiting for.
pub enum Completion {
    Write(Option<uv_write_cb>),
    Connect(Option<uv_connect_cb>),
    Shutdown(Option<uv_shutdown_cb>),
    UdpSend(Option<uv_udp_send_cb>),
    Fs(Option<uv_fs_cb>),
    GetAddrInfo(uv_getaddrinfo_cb),
    GetNameInfo {
        cb: uv_getnameinfo_cb,
        host: Option<CString>,
        service: Option<CString>,
    },
    /// Fills `len` bytes at `buf` before completing
    Random {
        cb: Option<uv_random_cb>,
        buf: usize,
        len: usize,
    },
}

impl Completion {
    pub fn name(&self) -> &'static str {
        match self {
            Completion::Write(_) => "write",
            Completion::Connect(_) => "connect",
            Completion::Shutdown(_) => "shutdown",
            Completion::UdpSend(_) => "udp-send",
            Completion::Fs(_) => "fs",
            Completion::GetAddrInfo(_) => "getaddrinfo",
            Completion::GetNameInfo { .. } => "getnameinfo",
            Completion::Random { .. } => "random",
        }
    }
}

impl core::fmt::Debug for Completion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Completion::{}", self.name())
    }
}
