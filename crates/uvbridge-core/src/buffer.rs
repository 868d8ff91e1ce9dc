//! Managed buffers handed to the foreign runtime by allocation callbacks
//!
//! The managed side owns the storage. The foreign runtime receives its
//! address and length, writes into it, and never frees it.

use core::cell::UnsafeCell;
use core::fmt;
use std::sync::Arc;

use crate::error::{BridgeError, BridgeResult};

struct Storage {
    bytes: UnsafeCell<Box<[u8]>>,
}

// Safety: the foreign runtime writes only between the allocation callback
// and the matching read callback, on the thread driving the loop. Managed
// readers go through `copy_prefix`/`with_bytes` after that callback.
unsafe impl Send for Storage {}
unsafe impl Sync for Storage {}

/// Reference-counted byte buffer with a stable address.
#[derive(Clone)]
pub struct ManagedBuffer {
    storage: Arc<Storage>,
}

impl ManagedBuffer {
    /// Zeroed buffer of `len` bytes.
    pub fn new(len: usize) -> BridgeResult<Self> {
        crate::fault::check_allocation()?;
        let mut bytes = Vec::new();
        bytes.try_reserve_exact(len)?;
        bytes.resize(len, 0);
        Ok(Self::from_vec(bytes))
    }

    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self {
            storage: Arc::new(Storage {
                bytes: UnsafeCell::new(bytes.into_boxed_slice()),
            }),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        // Safety: the box itself is never replaced, only its contents written
        unsafe { (&*self.storage.bytes.get()).len() }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Base address for the foreign runtime.
    #[inline]
    pub fn as_mut_ptr(&self) -> *mut u8 {
        // Safety: see `len`
        unsafe { (&mut *self.storage.bytes.get()).as_mut_ptr() }
    }

    /// Copy out the first `n` bytes (clamped to the buffer length).
    pub fn copy_prefix(&self, n: usize) -> Vec<u8> {
        self.with_bytes(|bytes| bytes[..n.min(bytes.len())].to_vec())
    }

    /// Borrow the contents.
    ///
    /// Must not be called while the foreign runtime may be writing.
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        // Safety: documented contract above
        let bytes = unsafe { &*self.storage.bytes.get() };
        f(bytes)
    }

    /// Overwrite the start of the buffer. Managed-side writes for outgoing data.
    pub fn write_at(&self, offset: usize, data: &[u8]) -> BridgeResult<()> {
        let out_of_bounds = BridgeError::OutOfBounds {
            offset,
            len: data.len(),
            capacity: self.len(),
        };
        let end = offset.checked_add(data.len()).ok_or_else(|| out_of_bounds.clone())?;
        if end > self.len() {
            return Err(out_of_bounds);
        }
        // Safety: bounds checked, same contract as `with_bytes`
        unsafe {
            core::ptr::copy_nonoverlapping(data.as_ptr(), self.as_mut_ptr().add(offset), data.len());
        }
        Ok(())
    }

    /// Same storage?
    #[inline]
    pub fn ptr_eq(&self, other: &ManagedBuffer) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }

    /// Number of live clones (diagnostics and tests).
    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.storage)
    }
}

impl fmt::Debug for ManagedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedBuffer")
            .field("ptr", &self.as_mut_ptr())
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_zeroed() {
        let buf = ManagedBuffer::new(16).unwrap();
        assert_eq!(buf.len(), 16);
        assert_eq!(buf.copy_prefix(16), vec![0u8; 16]);
    }

    #[test]
    fn test_foreign_style_write_visible() {
        let buf = ManagedBuffer::new(8).unwrap();
        let clone = buf.clone();
        unsafe {
            *buf.as_mut_ptr().add(2) = 0xAB;
        }
        assert_eq!(clone.copy_prefix(3), vec![0, 0, 0xAB]);
        assert!(buf.ptr_eq(&clone));
        assert_eq!(buf.holders(), 2);
    }

    #[test]
    fn test_copy_prefix_clamps() {
        let buf = ManagedBuffer::from_vec(vec![1, 2, 3]);
        assert_eq!(buf.copy_prefix(100), vec![1, 2, 3]);
    }

    #[test]
    fn test_write_at_bounds() {
        let buf = ManagedBuffer::new(4).unwrap();
        assert!(buf.write_at(1, b"ab").is_ok());
        assert_eq!(buf.copy_prefix(4), vec![0, b'a', b'b', 0]);
        assert_eq!(
            buf.write_at(3, b"xy"),
            Err(BridgeError::OutOfBounds { offset: 3, len: 2, capacity: 4 })
        );
        assert!(matches!(buf.write_at(usize::MAX, b"x"), Err(BridgeError::OutOfBounds { .. })));
    }
}
