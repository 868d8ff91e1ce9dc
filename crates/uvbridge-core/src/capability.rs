//! Capabilities of the bound foreign library
//!
//! The bridge is written against "does the foreign library do X", never
//! against version numbers. The shim layer fills in a `CapabilitySet` for
//! whatever build it is bound to.

use core::fmt;

/// One optional feature of the foreign library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Capability {
    /// Closing a TCP handle with a reset
    TcpCloseReset = 0,
    /// Source-specific multicast membership on UDP handles
    UdpSourceMembership = 1,
    /// One-shot signal watchers
    SignalOneshot = 2,
    /// Native threads created by the foreign library
    Threads = 3,
    /// Foreign run-once primitive
    Once = 4,
    /// Thread-pool work queue
    WorkQueue = 5,
    /// Batched UDP receive (recvmmsg)
    UdpRecvMmsg = 6,
    /// Loop idle-time metrics
    MetricsIdleTime = 7,
    /// Copy-on-write file cloning
    FsCopyfileFiclone = 8,
}

impl Capability {
    pub const ALL: [Capability; 9] = [
        Capability::TcpCloseReset,
        Capability::UdpSourceMembership,
        Capability::SignalOneshot,
        Capability::Threads,
        Capability::Once,
        Capability::WorkQueue,
        Capability::UdpRecvMmsg,
        Capability::MetricsIdleTime,
        Capability::FsCopyfileFiclone,
    ];

    #[inline]
    const fn bit(self) -> u32 {
        1 << (self as u8)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Capability::TcpCloseReset => "tcp-close-reset",
            Capability::UdpSourceMembership => "udp-source-membership",
            Capability::SignalOneshot => "signal-oneshot",
            Capability::Threads => "threads",
            Capability::Once => "once",
            Capability::WorkQueue => "work-queue",
            Capability::UdpRecvMmsg => "udp-recvmmsg",
            Capability::MetricsIdleTime => "metrics-idle-time",
            Capability::FsCopyfileFiclone => "fs-copyfile-ficlone",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Answers capability queries.
pub trait CapabilityProbe: Send + Sync {
    fn supports(&self, capability: Capability) -> bool;
}

/// Bitset of capabilities.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilitySet(u32);

impl CapabilitySet {
    pub const EMPTY: CapabilitySet = CapabilitySet(0);

    pub fn all() -> Self {
        Capability::ALL.iter().fold(Self::EMPTY, |set, &c| set.with(c))
    }

    /// Everything `source` reports as supported.
    pub fn probe(source: &impl CapabilityProbe) -> Self {
        Capability::ALL
            .iter()
            .filter(|&&c| source.supports(c))
            .fold(Self::EMPTY, |set, &c| set.with(c))
    }

    #[inline]
    pub const fn with(self, capability: Capability) -> Self {
        CapabilitySet(self.0 | capability.bit())
    }

    #[inline]
    pub fn insert(&mut self, capability: Capability) {
        self.0 |= capability.bit();
    }

    #[inline]
    pub fn remove(&mut self, capability: Capability) {
        self.0 &= !capability.bit();
    }

    #[inline]
    pub const fn contains(self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    pub fn iter(self) -> impl Iterator<Item = Capability> {
        Capability::ALL.into_iter().filter(move |c| self.contains(*c))
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl CapabilityProbe for CapabilitySet {
    fn supports(&self, capability: Capability) -> bool {
        self.contains(capability)
    }
}

impl fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(Capability::name)).finish()
    }
}
