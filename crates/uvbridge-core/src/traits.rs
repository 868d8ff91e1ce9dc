//! Seams between the bridge, the managed runtime and foreign objects

use core::ffi::c_void;

/// The managed runtime's execution right.
///
/// Exactly one thread at a time may run managed code. Trampolines acquire
/// around each closure call and release immediately after, so native
/// dispatch itself runs without the right held.
///
/// Implementations must be reentrant: a thread that already holds the
/// right may acquire again (a trampoline reached from inside a managed
/// callback), and each acquire is paired with one release.
pub trait ManagedRuntime: Send + Sync {
    /// Block until the current thread holds the right.
    fn acquire(&self);

    /// Give back one level of the right.
    fn release(&self);

    /// Make the current thread eligible to run managed code.
    ///
    /// Returns `false` if it already was.
    fn register_thread(&self) -> bool;

    /// Undo `register_thread`.
    fn unregister_thread(&self);

    /// Release every level held by this thread, returning how many.
    fn suspend(&self) -> u32;

    /// Re-acquire `depth` levels taken away by `suspend`.
    fn resume(&self, depth: u32);

    /// Name for diagnostics.
    fn name(&self) -> &'static str {
        "managed-runtime"
    }
}

/// Access to the single native user-data word of a foreign object.
///
/// # Safety
///
/// Implementors guarantee that the word read and written by these
/// functions is the object's user-data slot and that nothing else in the
/// bridge aliases it.
pub unsafe trait ForeignObject {
    /// Read the user-data word.
    ///
    /// # Safety
    ///
    /// `object` must point to a live, initialized foreign object.
    unsafe fn user_data(object: *const Self) -> *mut c_void;

    /// Write the user-data word.
    ///
    /// # Safety
    ///
    /// `object` must point to a live, initialized foreign object, and the
    /// caller must be the only writer (the thread owning the object's loop,
    /// or the pool worker running the object's work).
    unsafe fn set_user_data(object: *mut Self, data: *mut c_void);
}
