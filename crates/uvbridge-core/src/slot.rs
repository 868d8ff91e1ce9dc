//! Callback slot layout
//!
//! Slot indices are the ABI between the registry and the trampolines: a
//! trampoline for role R reads index R and nothing else. The numbering is
//! fixed and must only change with both sides rebuilt together.
//!
//! ```text
//!   index   minimum   handle   stream       udp            work
//!   0       self      self     self         self           self
//!   1       generic   generic  generic      generic        generic
//!   2                 close    close        close          work-fn
//!   3                          connection   udp-allocate
//!   4                          allocate
//! ```
//!
//! Stream reads and UDP receives are delivered through the generic slot.

use core::fmt;

/// Keeps the managed wrapper reachable for the anchor's lifetime.
pub const SELF_REFERENCE: usize = 0;
/// Primary callback: timer fire, read, recv, poll, exit, request completion.
pub const GENERIC_CALLBACK: usize = 1;
pub const MINIMUM_SLOT_COUNT: usize = 2;

pub const CLOSE_CALLBACK: usize = MINIMUM_SLOT_COUNT;
pub const HANDLE_SLOT_COUNT: usize = CLOSE_CALLBACK + 1;

pub const CONNECTION_CALLBACK: usize = HANDLE_SLOT_COUNT;
pub const ALLOCATE_CALLBACK: usize = CONNECTION_CALLBACK + 1;
pub const STREAM_SLOT_COUNT: usize = ALLOCATE_CALLBACK + 1;

pub const UDP_ALLOCATE_CALLBACK: usize = HANDLE_SLOT_COUNT;
pub const UDP_SLOT_COUNT: usize = UDP_ALLOCATE_CALLBACK + 1;

/// Function run on a pool thread, separate from the completion callback.
pub const WORK_FUNCTION: usize = MINIMUM_SLOT_COUNT;
pub const WORK_SLOT_COUNT: usize = WORK_FUNCTION + 1;

/// Object category; determines the slot table length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ObjectKind {
    /// One-shot request (write, connect, fs, getaddrinfo, ...)
    Request = 0,
    /// Long-lived handle without stream semantics (timer, poll, signal, ...)
    Handle = 1,
    /// Stream handle (tcp, pipe, tty)
    Stream = 2,
    /// UDP handle
    Udp = 3,
    /// Thread-pool work request
    Work = 4,
    /// Native thread entry; has no foreign object
    Thread = 5,
}

impl ObjectKind {
    /// Number of slots in this category's table
    #[inline]
    pub const fn slot_count(self) -> usize {
        match self {
            ObjectKind::Request | ObjectKind::Thread => MINIMUM_SLOT_COUNT,
            ObjectKind::Handle => HANDLE_SLOT_COUNT,
            ObjectKind::Stream => STREAM_SLOT_COUNT,
            ObjectKind::Udp => UDP_SLOT_COUNT,
            ObjectKind::Work => WORK_SLOT_COUNT,
        }
    }

    /// Handles receive many callbacks and end with a close callback.
    #[inline]
    pub const fn is_handle(self) -> bool {
        matches!(self, ObjectKind::Handle | ObjectKind::Stream | ObjectKind::Udp)
    }

    /// Requests get exactly one completion.
    #[inline]
    pub const fn is_one_shot(self) -> bool {
        !self.is_handle()
    }

    pub const fn name(self) -> &'static str {
        match self {
            ObjectKind::Request => "request",
            ObjectKind::Handle => "handle",
            ObjectKind::Stream => "stream",
            ObjectKind::Udp => "udp",
            ObjectKind::Work => "work",
            ObjectKind::Thread => "thread",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Named slot position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotRole {
    SelfReference,
    Generic,
    Close,
    Connection,
    Allocate,
    UdpAllocate,
    WorkFunction,
}

impl SlotRole {
    /// Index of this role in a table of the given category
    pub const fn index_in(self, kind: ObjectKind) -> Option<usize> {
        match (self, kind) {
            (SlotRole::SelfReference, _) => Some(SELF_REFERENCE),
            (SlotRole::Generic, _) => Some(GENERIC_CALLBACK),
            (SlotRole::Close, ObjectKind::Handle)
            | (SlotRole::Close, ObjectKind::Stream)
            | (SlotRole::Close, ObjectKind::Udp) => Some(CLOSE_CALLBACK),
            (SlotRole::Connection, ObjectKind::Stream) => Some(CONNECTION_CALLBACK),
            (SlotRole::Allocate, ObjectKind::Stream) => Some(ALLOCATE_CALLBACK),
            (SlotRole::UdpAllocate, ObjectKind::Udp) => Some(UDP_ALLOCATE_CALLBACK),
            (SlotRole::WorkFunction, ObjectKind::Work) => Some(WORK_FUNCTION),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            SlotRole::SelfReference => "self-reference",
            SlotRole::Generic => "generic",
            SlotRole::Close => "close",
            SlotRole::Connection => "connection",
            SlotRole::Allocate => "allocate",
            SlotRole::UdpAllocate => "udp-allocate",
            SlotRole::WorkFunction => "work-function",
        }
    }
}

impl fmt::Display for SlotRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
