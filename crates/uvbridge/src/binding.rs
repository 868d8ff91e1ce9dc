//! `Binding`: the bridge's operations against one foreign library
//!
//! Every call into the foreign library goes through the [`ForeignApi`]
//! table the binding was created with. Operations that need an optional
//! entry point check the probed capability first and fail with
//! `Unsupported` instead of reaching a stub.

use core::ffi::{c_int, c_void, CStr};
use std::sync::Arc;

use uvbridge_core::{
    kdebug, ktrace, kwarn, Anchor, AnchorKey, BridgeError, BridgeResult, Callback, Capability,
    CapabilitySet, ForeignObject, ObjectKind, SlotRole, SlotTable,
};
use uvbridge_runtime::abi::*;
use uvbridge_runtime::trampoline::handle::{close_cb, signal_cb};
use uvbridge_runtime::trampoline::once::once_cb;
use uvbridge_runtime::trampoline::thread::thread_entry;
use uvbridge_runtime::trampoline::work::{
    add_c_function_and_argument, after_c_work_cb, after_work_cb, c_work_cb,
    remove_c_function_and_argument, work_cb,
};
use uvbridge_runtime::{global, BlockingSection, Bridge, ForeignApi};

use crate::slots::Slots;

fn check(rc: c_int) -> BridgeResult<()> {
    if rc < 0 {
        return Err(BridgeError::Foreign(rc));
    }
    Ok(())
}

/// A native thread started through [`Binding::spawn_thread`].
#[must_use = "a spawned thread should be joined"]
#[derive(Debug)]
pub struct NativeThread {
    tid: uv_thread_t,
    key: AnchorKey,
}

impl NativeThread {
    /// Key of the anchor holding the thread body until it has run.
    pub fn key(&self) -> AnchorKey {
        self.key
    }
}

#[derive(Clone, Copy)]
pub struct Binding {
    api: ForeignApi,
    capabilities: CapabilitySet,
}

impl Binding {
    pub fn new(api: ForeignApi) -> Self {
        let capabilities = api.capabilities();
        kdebug!("binding: {} capabilities", capabilities.len());
        Binding { api, capabilities }
    }

    /// Binding to a library with none of the optional entry points.
    pub fn stubbed() -> Self {
        Self::new(ForeignApi::stubbed())
    }

    #[inline]
    pub fn api(&self) -> &ForeignApi {
        &self.api
    }

    #[inline]
    pub fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    #[inline]
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(capability)
    }

    pub fn version(&self) -> u32 {
        self.api.version()
    }

    fn require(&self, capability: Capability) -> BridgeResult<()> {
        if !self.supports(capability) {
            ktrace!("binding: {} not supported", capability);
            return Err(BridgeError::Unsupported(capability));
        }
        Ok(())
    }

    /// The process-wide bridge every trampoline dispatches through.
    #[inline]
    pub fn bridge(&self) -> &'static Bridge {
        global()
    }

    /// Register `object` with the callbacks in `slots`.
    ///
    /// # Safety
    ///
    /// `object` must be a live foreign object that stays valid until its
    /// terminal callback (close for handles, completion for requests).
    pub unsafe fn register<O: ForeignObject>(&self, object: *mut O, slots: Slots) -> BridgeResult<Arc<Anchor>> {
        let table = slots.build()?;
        self.bridge().registry().register(object, table)
    }

    /// Anchor currently stored in `object`.
    ///
    /// # Safety
    ///
    /// `object` must be a live foreign object.
    pub unsafe fn resolve<O: ForeignObject>(&self, object: *const O) -> Option<Arc<Anchor>> {
        self.bridge().registry().resolve(object)
    }

    fn begin_close<O: ForeignObject>(&self, handle: *mut O) -> BridgeResult<Arc<Anchor>> {
        let anchor = unsafe { self.resolve(handle) }.ok_or(BridgeError::NotRegistered)?;
        if !anchor.kind().is_handle() {
            return Err(BridgeError::SlotUnavailable {
                kind: anchor.kind(),
                role: SlotRole::Close,
            });
        }
        if !anchor.mark_closing() {
            return Err(BridgeError::AlreadyClosing);
        }
        Ok(anchor)
    }

    /// Close a registered handle. Callable from any thread.
    ///
    /// From here on only the close callback reaches the handle; its anchor
    /// is released after that callback returns.
    ///
    /// # Safety
    ///
    /// `handle` must be a live registered handle.
    pub unsafe fn close(&self, handle: *mut uv_handle_t) -> BridgeResult<()> {
        let anchor = self.begin_close(handle)?;
        ktrace!("binding: close {}", anchor.key());
        (self.api.close)(handle, Some(close_cb));
        Ok(())
    }

    /// Close a TCP handle with a reset instead of a graceful shutdown.
    ///
    /// # Safety
    ///
    /// `tcp` must be a live registered handle.
    pub unsafe fn close_reset(&self, tcp: *mut uv_tcp_t) -> BridgeResult<()> {
        self.require(Capability::TcpCloseReset)?;
        let anchor = self.begin_close(tcp)?;
        let rc = (self.api.tcp_close_reset)(tcp, Some(close_cb));
        if rc < 0 {
            // The closing mark stays; the foreign side may already hold the close.
            kwarn!("binding: close-reset of {} failed: {}", anchor.key(), rc);
        }
        check(rc)
    }

    /// Register `req` and run its work slot on the foreign thread pool.
    ///
    /// # Safety
    ///
    /// `loop_` must be a live loop and `req` an unregistered work request
    /// that stays valid until its after-work callback.
    pub unsafe fn queue_work(&self, loop_: *mut uv_loop_t, req: *mut uv_work_t, slots: Slots) -> BridgeResult<Arc<Anchor>> {
        self.require(Capability::WorkQueue)?;
        if slots.kind() != ObjectKind::Work {
            return Err(BridgeError::SlotUnavailable {
                kind: slots.kind(),
                role: SlotRole::WorkFunction,
            });
        }
        let anchor = self.register(req, slots)?;
        let rc = (self.api.queue_work)(loop_, req, Some(work_cb), Some(after_work_cb));
        if rc < 0 {
            self.bridge().registry().release(req)?;
            return Err(BridgeError::Foreign(rc));
        }
        Ok(anchor)
    }

    /// Run a native `function(argument)` on the pool with no managed code,
    /// then `after(status)` on the loop thread.
    ///
    /// # Safety
    ///
    /// As [`queue_work`](Self::queue_work); `function` must be safe to call
    /// with `argument` from any thread.
    pub unsafe fn queue_c_work(
        &self,
        loop_: *mut uv_loop_t,
        req: *mut uv_work_t,
        function: c_work_fn,
        argument: *mut c_void,
        after: impl FnMut(i64) + Send + 'static,
    ) -> BridgeResult<Arc<Anchor>> {
        self.require(Capability::WorkQueue)?;
        let anchor = self.register(req, Slots::work().on_complete(after))?;
        if let Err(e) = add_c_function_and_argument(req, function, argument) {
            self.bridge().registry().release(req)?;
            return Err(e);
        }
        let rc = (self.api.queue_work)(loop_, req, Some(c_work_cb), Some(after_c_work_cb));
        if rc < 0 {
            remove_c_function_and_argument(req);
            self.bridge().registry().release(req)?;
            return Err(BridgeError::Foreign(rc));
        }
        Ok(anchor)
    }

    /// Run `body` under the runtime lock on a new native thread.
    pub fn spawn_thread(&self, body: impl FnMut() + Send + 'static) -> BridgeResult<NativeThread> {
        self.require(Capability::Threads)?;
        let table = SlotTable::new(ObjectKind::Thread)?.with(SlotRole::Generic, Callback::unit(body))?;
        let registry = self.bridge().registry();
        let key = registry.register_detached(table)?.key();

        // Zero is a valid placeholder for every uv_thread_t representation.
        let mut tid: uv_thread_t = unsafe { core::mem::zeroed() };
        let rc = unsafe { (self.api.thread_create)(&mut tid, Some(thread_entry), key.to_user_data()) };
        if rc < 0 {
            registry.remove(key)?;
            return Err(BridgeError::Foreign(rc));
        }
        ktrace!("binding: spawned thread for {}", key);
        Ok(NativeThread { tid, key })
    }

    /// Wait for a thread from [`spawn_thread`](Self::spawn_thread).
    ///
    /// The caller's hold on the runtime is given up while it waits, so the
    /// thread body can take it.
    pub fn join_thread(&self, thread: NativeThread) -> BridgeResult<()> {
        let NativeThread { mut tid, key } = thread;
        let rc = {
            let _section = BlockingSection::enter(self.bridge().runtime());
            unsafe { (self.api.thread_join)(&mut tid) }
        };
        ktrace!("binding: joined thread for {} rc={}", key, rc);
        check(rc)
    }

    /// Run `init` the first time any caller passes `guard`.
    ///
    /// Distinct uses are serialized through one process-wide slot; a
    /// concurrent call fails with `OnceSlotBusy`.
    pub fn once(&self, guard: &uv_once_t, init: impl FnMut() + Send + 'static) -> BridgeResult<()> {
        self.require(Capability::Once)?;
        let ticket = self.bridge().once_slot().arm(Callback::unit(init))?;
        unsafe { (self.api.once)(guard as *const uv_once_t as *mut uv_once_t, Some(once_cb)) };
        drop(ticket);
        Ok(())
    }

    /// Join or leave a source-specific multicast group.
    ///
    /// # Safety
    ///
    /// `udp` must be a live UDP handle.
    pub unsafe fn udp_set_source_membership(
        &self,
        udp: *mut uv_udp_t,
        multicast: &CStr,
        interface: Option<&CStr>,
        source: &CStr,
        membership: uv_membership,
    ) -> BridgeResult<()> {
        self.require(Capability::UdpSourceMembership)?;
        let interface = interface.map_or(core::ptr::null(), CStr::as_ptr);
        check((self.api.udp_set_source_membership)(
            udp,
            multicast.as_ptr(),
            interface,
            source.as_ptr(),
            membership,
        ))
    }

    /// Watch for `signum` once; the handle's generic slot gets the signal number.
    ///
    /// # Safety
    ///
    /// `signal` must be a live registered handle.
    pub unsafe fn signal_start_oneshot(&self, signal: *mut uv_signal_t, signum: c_int) -> BridgeResult<()> {
        self.require(Capability::SignalOneshot)?;
        if self.resolve(signal).is_none() {
            return Err(BridgeError::NotRegistered);
        }
        check((self.api.signal_start_oneshot)(signal, Some(signal_cb), signum))
    }
}

impl Default for Binding {
    fn default() -> Self {
        Self::stubbed()
    }
}

impl core::fmt::Debug for Binding {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Binding")
            .field("version", &format_args!("{:#08x}", self.version()))
            .field("capabilities", &self.capabilities)
            .finish()
    }
}
