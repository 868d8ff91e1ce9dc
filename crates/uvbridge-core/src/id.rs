//! Anchor key type
//!
//! The value stored in a foreign object's native user-data word. It is an
//! arena index plus a generation, packed into one non-zero pointer-sized
//! word, so foreign memory never holds a pointer into managed state.

use core::ffi::c_void;
use core::fmt;

cfg_if::cfg_if! {
    if #[cfg(target_pointer_width = "64")] {
        const INDEX_BITS: u32 = 32;
    } else if #[cfg(target_pointer_width = "32")] {
        const INDEX_BITS: u32 = 20;
    } else {
        compile_error!("Unsupported pointer width");
    }
}

const INDEX_MASK: usize = (1usize << INDEX_BITS) - 1;
const GENERATION_BITS: u32 = usize::BITS - INDEX_BITS;

/// Largest number of anchors an arena can address.
///
/// The low field stores `index + 1` so that a registered key is never zero.
pub const MAX_ANCHOR_INDEX: usize = INDEX_MASK - 1;

/// Mask applied to generations before packing.
pub const GENERATION_MASK: u32 = u32::MAX >> (32 - min_bits(GENERATION_BITS, 32));

const fn min_bits(a: u32, b: u32) -> u32 {
    if a < b { a } else { b }
}

/// Key of a Lifetime Anchor inside the registry arena.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct AnchorKey(usize);

impl AnchorKey {
    /// Sentinel: the user-data word of an unregistered object.
    pub const NONE: AnchorKey = AnchorKey(0);

    /// Pack an arena index and generation.
    #[inline]
    pub const fn new(index: u32, generation: u32) -> Self {
        let low = (index as usize & INDEX_MASK) + 1;
        let high = ((generation & GENERATION_MASK) as usize) << INDEX_BITS;
        AnchorKey(high | low)
    }

    /// Arena index.
    #[inline]
    pub const fn index(self) -> u32 {
        (self.0 & INDEX_MASK).wrapping_sub(1) as u32
    }

    #[inline]
    pub const fn generation(self) -> u32 {
        ((self.0 >> INDEX_BITS) as u32) & GENERATION_MASK
    }

    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Value to write into a native user-data word.
    #[inline]
    pub fn to_user_data(self) -> *mut c_void {
        self.0 as *mut c_void
    }

    /// Decode a native user-data word. Null decodes to `None`.
    #[inline]
    pub fn from_user_data(data: *mut c_void) -> Option<AnchorKey> {
        let raw = data as usize;
        if raw == 0 {
            None
        } else {
            Some(AnchorKey(raw))
        }
    }
}

impl Default for AnchorKey {
    fn default() -> Self {
        AnchorKey::NONE
    }
}

impl fmt::Debug for AnchorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "AnchorKey(NONE)")
        } else {
            write!(f, "AnchorKey({}#{})", self.index(), self.generation())
        }
    }
}

impl fmt::Display for AnchorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "none")
        } else {
            write!(f, "{}#{}", self.index(), self.generation())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack() {
        let key = AnchorKey::new(42, 7);
        assert_eq!(key.index(), 42);
        assert_eq!(key.generation(), 7);
        assert!(!key.is_none());
    }

    #[test]
    fn test_index_zero_is_not_null() {
        let key = AnchorKey::new(0, 0);
        assert!(!key.is_none());
        assert!(!key.to_user_data().is_null());
    }

    #[test]
    fn test_user_data_round_trip() {
        let key = AnchorKey::new(1234, 99);
        let data = key.to_user_data();
        assert_eq!(AnchorKey::from_user_data(data), Some(key));
        assert_eq!(AnchorKey::from_user_data(core::ptr::null_mut()), None);
    }

    #[test]
    fn test_generation_wraps_into_mask() {
        let key = AnchorKey::new(3, u32::MAX);
        assert_eq!(key.generation(), u32::MAX & GENERATION_MASK);
        assert_eq!(key.index(), 3);
    }

    #[test]
    fn test_distinct_generations_differ() {
        assert_ne!(AnchorKey::new(5, 1), AnchorKey::new(5, 2));
    }
}
