//! Handle/Request Registry
//!
//! Arena of Lifetime Anchors. A foreign object's user-data word holds an
//! [`AnchorKey`] into this arena, never a pointer. Freed entries are reused
//! LIFO and bump their generation, so a key that outlived its anchor no
//! longer resolves.
//!
//! Lifecycle of one entry:
//!
//! ```text
//!   register ──> live ──(terminal callback)──> release ──> free
//!                 │                                         │
//!                 └── resolve (any number of times) ◄───────┘ (stale key: None)
//! ```

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::anchor::Anchor;
use crate::error::{BridgeError, BridgeResult};
use crate::fault;
use crate::id::{AnchorKey, GENERATION_MASK, MAX_ANCHOR_INDEX};
use crate::spinlock::SpinLock;
use crate::table::SlotTable;
use crate::traits::ForeignObject;
use crate::{kerror, ktrace, kwarn};

struct Entry {
    generation: u32,
    anchor: Option<Arc<Anchor>>,
}

struct Arena {
    entries: Vec<Entry>,
    /// LIFO stack of free entry indices
    free: Vec<u32>,
}

/// Counters reported by [`Registry::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub live: usize,
    pub peak: usize,
    pub registered: u64,
    pub released: u64,
    pub stale_lookups: u64,
}

pub struct Registry {
    arena: SpinLock<Arena>,
    max_anchors: usize,
    live: AtomicUsize,
    peak: AtomicUsize,
    registered: AtomicU64,
    released: AtomicU64,
    stale_lookups: AtomicU64,
}

impl Registry {
    /// Registry holding at most `max_anchors` live anchors.
    pub fn new(max_anchors: usize) -> Self {
        Self {
            arena: SpinLock::new(Arena {
                entries: Vec::new(),
                free: Vec::new(),
            }),
            max_anchors: max_anchors.clamp(1, MAX_ANCHOR_INDEX + 1),
            live: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            registered: AtomicU64::new(0),
            released: AtomicU64::new(0),
            stale_lookups: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn max_anchors(&self) -> usize {
        self.max_anchors
    }

    /// Number of anchors currently alive in the arena.
    #[inline]
    pub fn live(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            live: self.live(),
            peak: self.peak.load(Ordering::Relaxed),
            registered: self.registered.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            stale_lookups: self.stale_lookups.load(Ordering::Relaxed),
        }
    }

    fn insert(&self, table: SlotTable) -> BridgeResult<Arc<Anchor>> {
        fault::check_allocation()?;

        let anchor = {
            let mut arena = self.arena.lock();
            let index = match arena.free.pop() {
                Some(index) => index,
                None => {
                    if arena.entries.len() >= self.max_anchors {
                        return Err(BridgeError::AnchorTableFull);
                    }
                    // Reserve the free-stack slot now so release never allocates.
                    arena.entries.try_reserve(1)?;
                    arena.free.try_reserve(1)?;
                    arena.entries.push(Entry {
                        generation: 0,
                        anchor: None,
                    });
                    (arena.entries.len() - 1) as u32
                }
            };
            let entry = &mut arena.entries[index as usize];
            let anchor = Arc::new(Anchor::new(AnchorKey::new(index, entry.generation), table));
            entry.anchor = Some(Arc::clone(&anchor));
            anchor
        };

        let live = self.live.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak.fetch_max(live, Ordering::Relaxed);
        self.registered.fetch_add(1, Ordering::Relaxed);
        ktrace!("registry: registered {} {}", anchor.kind(), anchor.key());
        Ok(anchor)
    }

    /// Store `table` behind a new anchor and write its key into `object`.
    ///
    /// Fails with `AlreadyRegistered` if the user-data word is in use, so
    /// a request cannot be registered twice.
    ///
    /// # Safety
    ///
    /// `object` must point to a live foreign object, and the caller must be
    /// the only thread touching its user-data word.
    pub unsafe fn register<O: ForeignObject>(
        &self,
        object: *mut O,
        table: SlotTable,
    ) -> BridgeResult<Arc<Anchor>> {
        if !O::user_data(object).is_null() {
            kwarn!("registry: user-data already set, refusing {} registration", table.kind());
            return Err(BridgeError::AlreadyRegistered);
        }
        let anchor = self.insert(table)?;
        O::set_user_data(object, anchor.key().to_user_data());
        Ok(anchor)
    }

    /// Anchor with no foreign object behind it (native thread entries).
    ///
    /// The caller keeps the key and calls [`remove`](Self::remove) once.
    pub fn register_detached(&self, table: SlotTable) -> BridgeResult<Arc<Anchor>> {
        self.insert(table)
    }

    /// Anchor for `key`, or `None` if the key is stale or was never issued.
    pub fn lookup(&self, key: AnchorKey) -> Option<Arc<Anchor>> {
        if key.is_none() {
            return None;
        }
        let arena = self.arena.lock();
        let entry = arena.entries.get(key.index() as usize)?;
        if entry.generation != key.generation() {
            return None;
        }
        entry.anchor.clone()
    }

    /// Anchor whose key is in `object`'s user-data word.
    ///
    /// A miss means a trampoline fired for an object that was never
    /// registered or was already finalized. It is logged and counted.
    ///
    /// # Safety
    ///
    /// `object` must point to a live foreign object.
    pub unsafe fn resolve<O: ForeignObject>(&self, object: *const O) -> Option<Arc<Anchor>> {
        let data = O::user_data(object);
        let found = AnchorKey::from_user_data(data).and_then(|key| self.lookup(key));
        if found.is_none() {
            self.stale_lookups.fetch_add(1, Ordering::Relaxed);
            kerror!("registry: no anchor for user-data {:p}", data);
        }
        found
    }

    /// Free the entry for `key`. The second call for the same key fails.
    ///
    /// Closures are dropped here unless a dispatch still holds the anchor,
    /// in which case they go when that dispatch returns.
    pub fn remove(&self, key: AnchorKey) -> BridgeResult<()> {
        if key.is_none() {
            return Err(BridgeError::NotRegistered);
        }
        let anchor = {
            let mut arena = self.arena.lock();
            let index = key.index();
            let entry = match arena.entries.get_mut(index as usize) {
                Some(entry) if entry.generation == key.generation() && entry.anchor.is_some() => entry,
                _ => return Err(BridgeError::NotRegistered),
            };
            let anchor = entry.anchor.take();
            entry.generation = entry.generation.wrapping_add(1) & GENERATION_MASK;
            arena.free.push(index);
            anchor
        };

        self.live.fetch_sub(1, Ordering::Relaxed);
        self.released.fetch_add(1, Ordering::Relaxed);
        if let Some(anchor) = anchor {
            ktrace!("registry: released {} {}", anchor.kind(), key);
            // Slots drop here, outside the arena lock.
            drop(anchor.release_slots());
        }
        Ok(())
    }

    /// Clear `object`'s user-data word, then free its entry.
    ///
    /// # Safety
    ///
    /// `object` must point to a live foreign object, and the foreign
    /// runtime must not invoke another callback that reads this object's
    /// anchor after this call.
    pub unsafe fn release<O: ForeignObject>(&self, object: *mut O) -> BridgeResult<()> {
        let key = AnchorKey::from_user_data(O::user_data(object)).ok_or(BridgeError::NotRegistered)?;
        O::set_user_data(object, core::ptr::null_mut());
        self.remove(key)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(MAX_ANCHOR_INDEX + 1)
    }
}
