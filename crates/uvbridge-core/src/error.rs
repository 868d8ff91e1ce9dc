//! Error types for the callback bridge

use core::fmt;

use crate::capability::Capability;
use crate::slot::{ObjectKind, SlotRole};

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors surfaced to the immediate caller of a bridge operation.
///
/// Status codes delivered by the foreign runtime to callbacks are never
/// turned into this type; they reach the managed closure as plain integers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// Slot table, arena entry or auxiliary struct could not be allocated
    AllocationFailed,

    /// The object's user-data word is already in use
    AlreadyRegistered,

    /// The object has no anchor (never registered, or already finalized)
    NotRegistered,

    /// The arena reached its configured capacity
    AnchorTableFull,

    /// A write of `len` bytes at `offset` does not fit a buffer of `capacity`
    OutOfBounds { offset: usize, len: usize, capacity: usize },

    /// The object category has no slot for this role
    SlotUnavailable { kind: ObjectKind, role: SlotRole },

    /// Close was already requested for this handle
    AlreadyClosing,

    /// Process-wide bridge state was already installed
    AlreadyInstalled,

    /// Another call-site is using the run-once slot
    OnceSlotBusy,

    /// The bound foreign library lacks this capability
    Unsupported(Capability),

    /// A foreign entry point returned this negative status
    Foreign(i32),
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::AllocationFailed => write!(f, "allocation failed"),
            BridgeError::AlreadyRegistered => write!(f, "object already registered"),
            BridgeError::NotRegistered => write!(f, "object not registered"),
            BridgeError::AnchorTableFull => write!(f, "anchor table full"),
            BridgeError::OutOfBounds { offset, len, capacity } => {
                write!(f, "{} bytes at offset {} exceed buffer of {}", len, offset, capacity)
            }
            BridgeError::SlotUnavailable { kind, role } => {
                write!(f, "{} objects have no {} slot", kind, role)
            }
            BridgeError::AlreadyClosing => write!(f, "handle already closing"),
            BridgeError::AlreadyInstalled => write!(f, "bridge already installed"),
            BridgeError::OnceSlotBusy => write!(f, "run-once slot busy"),
            BridgeError::Unsupported(cap) => write!(f, "unsupported by foreign library: {}", cap),
            BridgeError::Foreign(code) => write!(f, "foreign status {}", code),
        }
    }
}

impl std::error::Error for BridgeError {}

impl From<std::collections::TryReserveError> for BridgeError {
    fn from(_: std::collections::TryReserveError) -> Self {
        BridgeError::AllocationFailed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(format!("{}", BridgeError::AllocationFailed), "allocation failed");

        let e = BridgeError::SlotUnavailable {
            kind: ObjectKind::Request,
            role: SlotRole::Close,
        };
        assert_eq!(format!("{}", e), "request objects have no close slot");

        assert_eq!(format!("{}", BridgeError::Foreign(-4)), "foreign status -4");
    }

    #[test]
    fn test_try_reserve_conversion() {
        let mut v: Vec<u64> = Vec::new();
        let err = v.try_reserve(usize::MAX).unwrap_err();
        let bridge: BridgeError = err.into();
        assert_eq!(bridge, BridgeError::AllocationFailed);
    }
}
