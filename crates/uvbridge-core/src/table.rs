//! Callback slot table
//!
//! Fixed-length array of managed closures, one per slot role of the
//! object's category. Owned exclusively by one Lifetime Anchor.

use core::fmt;
use std::any::Any;
use std::sync::Arc;

use crate::buffer::ManagedBuffer;
use crate::error::{BridgeError, BridgeResult};
use crate::slot::{ObjectKind, SlotRole};

/// A managed closure, tagged with its calling convention.
///
/// Integers map directly; the foreign runtime's negative status codes
/// arrive unmodified.
pub enum Callback {
    /// No arguments: timer, prepare, check, idle, async, close, work, once, thread entry
    Unit(Box<dyn FnMut() + Send>),
    /// One integer: status, signal number, connection status, fs result
    Int(Box<dyn FnMut(i64) + Send>),
    /// Two integers: poll (status, events), exit (status, signal)
    Int2(Box<dyn FnMut(i64, i64) + Send>),
    /// Three integers: fs-poll (status, previous stat, current stat addresses)
    Int3(Box<dyn FnMut(i64, i64, i64) + Send>),
    /// Stream read: byte count or negative status, and the buffer from the allocate callback
    Read(Box<dyn FnMut(isize, Option<ManagedBuffer>) + Send>),
    /// UDP receive: count, buffer, sender sockaddr address (0 if none), flags
    Recv(Box<dyn FnMut(isize, Option<ManagedBuffer>, usize, u32) + Send>),
    /// Allocation: suggested size in, buffer out (`None` reports no buffer)
    Alloc(Box<dyn FnMut(usize) -> Option<ManagedBuffer> + Send>),
    /// File system event: file name, events, status
    Path(Box<dyn FnMut(Option<String>, i64, i64) + Send>),
    /// Name lookup: status, host name, service name
    Names(Box<dyn FnMut(i64, Option<String>, Option<String>) + Send>),
}

impl Callback {
    pub fn unit(f: impl FnMut() + Send + 'static) -> Self {
        Callback::Unit(Box::new(f))
    }

    pub fn int(f: impl FnMut(i64) + Send + 'static) -> Self {
        Callback::Int(Box::new(f))
    }

    pub fn int2(f: impl FnMut(i64, i64) + Send + 'static) -> Self {
        Callback::Int2(Box::new(f))
    }

    pub fn int3(f: impl FnMut(i64, i64, i64) + Send + 'static) -> Self {
        Callback::Int3(Box::new(f))
    }

    pub fn read(f: impl FnMut(isize, Option<ManagedBuffer>) + Send + 'static) -> Self {
        Callback::Read(Box::new(f))
    }

    pub fn recv(f: impl FnMut(isize, Option<ManagedBuffer>, usize, u32) + Send + 'static) -> Self {
        Callback::Recv(Box::new(f))
    }

    pub fn alloc(f: impl FnMut(usize) -> Option<ManagedBuffer> + Send + 'static) -> Self {
        Callback::Alloc(Box::new(f))
    }

    pub fn path(f: impl FnMut(Option<String>, i64, i64) + Send + 'static) -> Self {
        Callback::Path(Box::new(f))
    }

    pub fn names(f: impl FnMut(i64, Option<String>, Option<String>) + Send + 'static) -> Self {
        Callback::Names(Box::new(f))
    }

    pub fn shape(&self) -> &'static str {
        match self {
            Callback::Unit(_) => "unit",
            Callback::Int(_) => "int",
            Callback::Int2(_) => "int2",
            Callback::Int3(_) => "int3",
            Callback::Read(_) => "read",
            Callback::Recv(_) => "recv",
            Callback::Alloc(_) => "alloc",
            Callback::Path(_) => "path",
            Callback::Names(_) => "names",
        }
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback::{}", self.shape())
    }
}

/// Contents of one slot.
pub enum Slot {
    Empty,
    Callback(Callback),
    /// Managed value kept reachable (the wrapper object, write buffers, ...)
    Value(Arc<dyn Any + Send + Sync>),
    /// The callback is out of the table while it runs
    Running,
}

impl Slot {
    fn describe(&self) -> &'static str {
        match self {
            Slot::Empty => "empty",
            Slot::Callback(cb) => cb.shape(),
            Slot::Value(_) => "value",
            Slot::Running => "running",
        }
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Per-object callback table.
pub struct SlotTable {
    kind: ObjectKind,
    slots: Box<[Slot]>,
}

impl SlotTable {
    /// Empty table sized for `kind`.
    pub fn new(kind: ObjectKind) -> BridgeResult<Self> {
        crate::fault::check_allocation()?;
        let count = kind.slot_count();
        let mut slots = Vec::new();
        slots.try_reserve_exact(count)?;
        slots.extend((0..count).map(|_| Slot::Empty));
        Ok(Self {
            kind,
            slots: slots.into_boxed_slice(),
        })
    }

    #[inline]
    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn index_of(&self, role: SlotRole) -> BridgeResult<usize> {
        role.index_in(self.kind).ok_or(BridgeError::SlotUnavailable {
            kind: self.kind,
            role,
        })
    }

    /// Install a callback in the slot for `role`, replacing what was there.
    pub fn set(&mut self, role: SlotRole, callback: Callback) -> BridgeResult<()> {
        let index = self.index_of(role)?;
        self.slots[index] = Slot::Callback(callback);
        Ok(())
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, role: SlotRole, callback: Callback) -> BridgeResult<Self> {
        self.set(role, callback)?;
        Ok(self)
    }

    /// Store the self-reference.
    pub fn set_self_reference(&mut self, value: Arc<dyn Any + Send + Sync>) {
        self.slots[crate::slot::SELF_REFERENCE] = Slot::Value(value);
    }

    pub fn self_reference(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        match &self.slots[crate::slot::SELF_REFERENCE] {
            Slot::Value(v) => Some(Arc::clone(v)),
            _ => None,
        }
    }

    pub fn clear(&mut self, role: SlotRole) -> BridgeResult<()> {
        let index = self.index_of(role)?;
        self.slots[index] = Slot::Empty;
        Ok(())
    }

    /// Does the slot hold a callback (running or not)?
    pub fn is_set(&self, index: usize) -> bool {
        matches!(self.slots.get(index), Some(Slot::Callback(_)) | Some(Slot::Running))
    }

    /// Move the callback at `index` out, leaving `Running`.
    pub fn take(&mut self, index: usize) -> Option<Callback> {
        let slot = self.slots.get_mut(index)?;
        match core::mem::replace(slot, Slot::Running) {
            Slot::Callback(cb) => Some(cb),
            other => {
                *slot = other;
                None
            }
        }
    }

    /// Put a callback back after it ran.
    ///
    /// If the slot was replaced or cleared while the callback ran, the new
    /// contents win and the old callback is dropped.
    pub fn restore(&mut self, index: usize, callback: Callback) {
        if let Some(slot) = self.slots.get_mut(index) {
            if matches!(slot, Slot::Running) {
                *slot = Slot::Callback(callback);
            }
        }
    }

    /// Drop every slot. Used when the anchor is released.
    pub fn drain(&mut self) -> Vec<Slot> {
        self.slots
            .iter_mut()
            .map(|slot| core::mem::replace(slot, Slot::Empty))
            .collect()
    }
}

impl fmt::Debug for SlotTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotTable")
            .field("kind", &self.kind)
            .field("slots", &self.slots)
            .finish()
    }
}
