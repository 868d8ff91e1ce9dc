//! Loopback event loop
//!
//! A foreign runtime in miniature. It owns a `uv_loop_t`, tracks the
//! handles and requests started on it, and calls the callbacks it was
//! given from [`Loop::run_once`] on the driving thread, in the order the
//! events were posted. There is no I/O: reads, timer expiries and request
//! completions are injected through a [`LoopRemote`], from any thread.
//!
//! Close follows the foreign rules: it never fails, no other callback
//! reaches the handle once it is requested, and the close callback runs at
//! the end of the next iteration. Closes bypass the bounded event queue.

use core::ffi::{c_char, c_int, c_uint, c_void};
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use crossbeam_queue::ArrayQueue;

use uvbridge_core::{kdebug, kerror, ktrace, kwarn};
use uvbridge_runtime::abi::*;
use uvbridge_runtime::shim::{version_hex, ForeignApi};
use uvbridge_runtime::{bridge, BlockingSection};

use crate::config::LoopbackConfig;
use crate::event::{Completion, Event, Reading, Watcher};
use crate::pool::{Job, PoolStats, WorkPool};

#[derive(Default)]
struct HandleEntry {
    closing: bool,
    watcher: Option<Watcher>,
    reading: Option<Reading>,
}

/// Counters for one loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub iterations: u64,
    pub callbacks: u64,
    /// Events for closing or unknown handles, or requests never submitted
    pub skipped: u64,
    pub closes: u64,
}

pub(crate) struct LoopState {
    config: LoopbackConfig,
    events: Arc<ArrayQueue<Event>>,
    handles: Mutex<HashMap<usize, HandleEntry>>,
    requests: Mutex<HashMap<usize, Completion>>,
    pending_closes: Mutex<Vec<(usize, Option<uv_close_cb>)>>,
    pool: WorkPool,
    iterations: AtomicU64,
    callbacks: AtomicU64,
    skipped: AtomicU64,
    closes: AtomicU64,
}

const POOL_WAIT: Duration = Duration::from_micros(20);

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl LoopState {
    fn post(&self, event: Event) -> c_int {
        match self.events.push(event) {
            Ok(()) => 0,
            Err(_) => {
                kwarn!("loopback: event queue full");
                UV_EAGAIN
            }
        }
    }

    /// Stop the handle now and queue its close callback.
    fn begin_close(&self, handle: usize, cb: Option<uv_close_cb>) -> c_int {
        let mut handles = locked(&self.handles);
        match handles.get_mut(&handle) {
            Some(entry) if !entry.closing => {
                entry.closing = true;
                entry.watcher = None;
                entry.reading = None;
                drop(handles);
                locked(&self.pending_closes).push((handle, cb));
                0
            }
            _ => {
                drop(handles);
                kerror!("loopback: close of {:#x} which is not open", handle);
                UV_EINVAL
            }
        }
    }

    fn watch(&self, handle: usize, f: impl FnOnce(&mut HandleEntry)) -> c_int {
        let mut handles = locked(&self.handles);
        match handles.get_mut(&handle) {
            Some(entry) if !entry.closing => {
                f(entry);
                0
            }
            _ => UV_EINVAL,
        }
    }
}

/// Recover the loop state a foreign object is attached to.
unsafe fn state_of<'a>(loop_: *mut uv_loop_t) -> Option<&'a LoopState> {
    if loop_.is_null() || (*loop_).data.is_null() {
        return None;
    }
    Some(&*((*loop_).data as *const LoopState))
}

unsafe fn state_of_handle<'a>(handle: *mut uv_handle_t) -> Option<&'a LoopState> {
    if handle.is_null() {
        return None;
    }
    state_of((*handle).loop_)
}

/// The loop, owned by the thread that drives it.
pub struct Loop {
    raw: Box<uv_loop_t>,
    state: Arc<LoopState>,
}

/// Posts events to a [`Loop`] from any thread.
#[derive(Clone)]
pub struct LoopRemote {
    state: Arc<LoopState>,
}

impl Loop {
    pub fn new(config: LoopbackConfig) -> io::Result<Self> {
        let config = config.normalized();
        let events = Arc::new(ArrayQueue::new(config.queue_depth));
        let pool = WorkPool::new(config.pool_size, config.queue_depth, Arc::clone(&events))?;
        let state = Arc::new(LoopState {
            config,
            events,
            handles: Mutex::new(HashMap::new()),
            requests: Mutex::new(HashMap::new()),
            pending_closes: Mutex::new(Vec::new()),
            pool,
            iterations: AtomicU64::new(0),
            callbacks: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            closes: AtomicU64::new(0),
        });
        let mut raw = Box::new(uv_loop_t::new());
        raw.data = Arc::as_ptr(&state) as *mut c_void;
        Ok(Loop { raw, state })
    }

    /// The foreign loop object.
    #[inline]
    pub fn raw(&mut self) -> *mut uv_loop_t {
        &mut *self.raw
    }

    pub fn remote(&self) -> LoopRemote {
        LoopRemote {
            state: Arc::clone(&self.state),
        }
    }

    pub fn config(&self) -> &LoopbackConfig {
        &self.state.config
    }

    /// Attach a handle to this loop.
    ///
    /// # Safety
    ///
    /// `handle` must stay valid until its close callback has run.
    pub unsafe fn init(&mut self, handle: *mut uv_handle_t) -> c_int {
        if handle.is_null() {
            return UV_EINVAL;
        }
        (*handle).loop_ = self.raw();
        let fresh = locked(&self.state.handles)
            .insert(handle as usize, HandleEntry::default())
            .is_none();
        if !fresh {
            return UV_EBUSY;
        }
        self.raw.active_handles += 1;
        0
    }

    /// Attach a request to this loop and remember how to complete it.
    ///
    /// # Safety
    ///
    /// `req` must stay valid until its completion has run.
    pub unsafe fn submit(&mut self, req: *mut uv_req_t, completion: Completion) -> c_int {
        if req.is_null() {
            return UV_EINVAL;
        }
        let loop_ptr = self.raw();
        // Every request type shares the same prefix.
        (*(req as *mut uv_write_t)).loop_ = loop_ptr;
        ktrace!("loopback: submit {} {:p}", completion.name(), req);
        let mut requests = locked(&self.state.requests);
        if requests.contains_key(&(req as usize)) {
            return UV_EBUSY;
        }
        requests.insert(req as usize, completion);
        0
    }

    /// # Safety
    ///
    /// `stream` must have been passed to [`init`](Self::init).
    pub unsafe fn read_start(&mut self, stream: *mut uv_stream_t, alloc: uv_alloc_cb, read: uv_read_cb) -> c_int {
        self.state
            .watch(stream as usize, |e| e.reading = Some(Reading::Stream(alloc, read)))
    }

    pub unsafe fn read_stop(&mut self, stream: *mut uv_stream_t) -> c_int {
        self.state.watch(stream as usize, |e| e.reading = None)
    }

    pub unsafe fn udp_recv_start(&mut self, udp: *mut uv_udp_t, alloc: uv_alloc_cb, recv: uv_udp_recv_cb) -> c_int {
        self.state
            .watch(udp as usize, |e| e.reading = Some(Reading::Udp(alloc, recv)))
    }

    pub unsafe fn listen(&mut self, server: *mut uv_stream_t, cb: uv_connection_cb) -> c_int {
        self.state
            .watch(server as usize, |e| e.watcher = Some(Watcher::Listen(cb)))
    }

    pub unsafe fn timer_start(&mut self, timer: *mut uv_timer_t, cb: uv_timer_cb) -> c_int {
        self.state.watch(timer as usize, |e| e.watcher = Some(Watcher::Timer(cb)))
    }

    pub unsafe fn poll_start(&mut self, poll: *mut uv_poll_t, cb: uv_poll_cb) -> c_int {
        self.state.watch(poll as usize, |e| e.watcher = Some(Watcher::Poll(cb)))
    }

    pub unsafe fn signal_start(&mut self, signal: *mut uv_signal_t, cb: uv_signal_cb, signum: c_int) -> c_int {
        self.state.watch(signal as usize, |e| {
            e.watcher = Some(Watcher::Signal {
                cb,
                signum,
                oneshot: false,
            })
        })
    }

    /// Register a spawned child; `exit_cb` may be the null variant.
    pub unsafe fn process_spawned(&mut self, process: *mut uv_process_t, exit_cb: Option<uv_exit_cb>) -> c_int {
        self.state
            .watch(process as usize, |e| e.watcher = Some(Watcher::Process(exit_cb)))
    }

    /// Stop whatever the handle was started for.
    pub unsafe fn stop(&mut self, handle: *mut uv_handle_t) -> c_int {
        self.state.watch(handle as usize, |e| e.watcher = None)
    }

    /// Queue work on the pool. Same contract as the `queue_work` entry point.
    pub unsafe fn queue_work(
        &mut self,
        req: *mut uv_work_t,
        work: Option<uv_work_cb>,
        after: Option<uv_after_work_cb>,
    ) -> c_int {
        loopback_queue_work(self.raw(), req, work, after)
    }

    /// Process the events posted so far, then run pending close callbacks.
    ///
    /// Events posted while this runs wait for the next iteration. Returns
    /// the number of callbacks made.
    pub fn run_once(&mut self) -> usize {
        let state = Arc::clone(&self.state);
        state.iterations.fetch_add(1, Ordering::Relaxed);
        let mut made = 0;

        for _ in 0..state.events.len() {
            let Some(event) = state.events.pop() else {
                break;
            };
            made += unsafe { self.process(event) };
        }

        let closing: Vec<_> = locked(&state.pending_closes).drain(..).collect();
        for (handle, cb) in closing {
            locked(&state.handles).remove(&handle);
            self.raw.active_handles = self.raw.active_handles.saturating_sub(1);
            state.closes.fetch_add(1, Ordering::Relaxed);
            if let Some(cb) = cb {
                unsafe { cb(handle as *mut uv_handle_t) };
                made += 1;
            }
        }

        state.callbacks.fetch_add(made as u64, Ordering::Relaxed);
        made
    }

    /// Iterate until no event, pool job or close is outstanding.
    ///
    /// The runtime lock is given up while waiting on the pool, so the
    /// caller may hold it.
    pub fn run_until_idle(&mut self) -> usize {
        let mut made = 0;
        loop {
            made += self.run_once();
            if self.is_idle() {
                return made;
            }
            if self.state.events.is_empty() {
                let _section = BlockingSection::enter(bridge::global().runtime());
                if self.state.pool.in_flight() > 0 {
                    thread::sleep(POOL_WAIT);
                } else {
                    thread::yield_now();
                }
            }
        }
    }

    fn is_idle(&self) -> bool {
        self.state.events.is_empty()
            && self.state.pool.in_flight() == 0
            && locked(&self.state.pending_closes).is_empty()
    }

    /// Handles attached and not yet closed.
    pub fn active_handles(&self) -> usize {
        self.raw.active_handles as usize
    }

    /// Requests submitted and not yet completed.
    pub fn pending_requests(&self) -> usize {
        locked(&self.state.requests).len()
    }

    pub fn stats(&self) -> LoopStats {
        let s = &self.state;
        LoopStats {
            iterations: s.iterations.load(Ordering::Relaxed),
            callbacks: s.callbacks.load(Ordering::Relaxed),
            skipped: s.skipped.load(Ordering::Relaxed),
            closes: s.closes.load(Ordering::Relaxed),
        }
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.state.pool.stats()
    }

    pub fn pool_workers(&self) -> usize {
        self.state.pool.workers()
    }

    fn skip(&self, what: &str, target: usize) -> usize {
        ktrace!("loopback: {} for {:#x} skipped", what, target);
        self.state.skipped.fetch_add(1, Ordering::Relaxed);
        0
    }

    /// Copy the entry's callbacks out so none is called with the table locked.
    fn entry(&self, handle: usize) -> Option<(Option<Watcher>, Option<Reading>)> {
        let handles = locked(&self.state.handles);
        match handles.get(&handle) {
            Some(entry) if !entry.closing => Some((entry.watcher, entry.reading)),
            _ => None,
        }
    }

    unsafe fn process(&mut self, event: Event) -> usize {
        if let Some(handle) = event.handle() {
            let Some((watcher, reading)) = self.entry(handle) else {
                return self.skip("event", handle);
            };
            return self.deliver(event, watcher, reading);
        }

        match event {
            Event::Complete { req, status } => {
                let completion = locked(&self.state.requests).remove(&req);
                match completion {
                    Some(completion) => {
                        complete_request(req, status, completion);
                        1
                    }
                    None => self.skip("completion", req),
                }
            }
            Event::AfterWork { req, status, after } => match after {
                Some(after) => {
                    after(req as *mut uv_work_t, status);
                    1
                }
                None => 0,
            },
            _ => 0,
        }
    }

    unsafe fn deliver(&mut self, event: Event, watcher: Option<Watcher>, reading: Option<Reading>) -> usize {
        let suggested = self.state.config.suggested_alloc;
        match (event, watcher, reading) {
            (Event::Read { stream, nread, data }, _, Some(Reading::Stream(alloc, read))) => {
                let mut buf = uv_buf_t::empty();
                alloc(stream as *mut uv_handle_t, suggested, &mut buf);
                let nread = fill(&buf, nread, &data);
                read(stream as *mut uv_stream_t, nread, &buf);
                2
            }
            (Event::Recv { udp, nread, data, has_sender }, _, Some(Reading::Udp(alloc, recv))) => {
                let mut buf = uv_buf_t::empty();
                alloc(udp as *mut uv_handle_t, suggested, &mut buf);
                let nread = fill(&buf, nread, &data);
                let sender = loopback_sender();
                let addr = if has_sender {
                    &sender as *const libc::sockaddr_in as *const libc::sockaddr
                } else {
                    core::ptr::null()
                };
                recv(udp as *mut uv_udp_t, nread, &buf, addr, 0);
                2
            }
            (Event::Connection { server, status }, Some(Watcher::Listen(cb)), _) => {
                cb(server as *mut uv_stream_t, status);
                1
            }
            (Event::Fire { handle }, Some(Watcher::Timer(cb)), _) => {
                cb(handle as *mut uv_timer_t);
                1
            }
            (Event::Fire { handle }, Some(Watcher::Signal { cb, signum, oneshot }), _) => {
                if oneshot {
                    self.state.watch(handle, |e| e.watcher = None);
                }
                cb(handle as *mut uv_signal_t, signum);
                1
            }
            (Event::Poll { handle, status, events }, Some(Watcher::Poll(cb)), _) => {
                cb(handle as *mut uv_poll_t, status, events);
                1
            }
            (Event::Exit { process, status, signal }, Some(Watcher::Process(cb)), _) => match cb {
                Some(cb) => {
                    cb(process as *mut uv_process_t, status, signal);
                    1
                }
                None => 0,
            },
            (event, _, _) => self.skip("unwatched event", event.handle().unwrap_or(0)),
        }
    }
}

impl Drop for Loop {
    fn drop(&mut self) {
        let open = locked(&self.state.handles).len();
        if open > 0 {
            kwarn!("loopback: dropped with {} open handles", open);
        }
        kdebug!("loopback: {:?}", self.stats());
    }
}

/// Copy injected bytes into the allocated buffer and report the count.
///
/// No buffer means `UV_ENOBUFS`. Zero and negative counts pass through.
unsafe fn fill(buf: &uv_buf_t, nread: isize, data: &[u8]) -> isize {
    if buf.is_empty() {
        return UV_ENOBUFS as isize;
    }
    if nread <= 0 {
        return nread;
    }
    let n = (nread as usize).min(data.len()).min(buf.len());
    core::ptr::copy_nonoverlapping(data.as_ptr(), buf.base.cast::<u8>(), n);
    n as isize
}

fn loopback_sender() -> libc::sockaddr_in {
    let mut addr: libc::sockaddr_in = unsafe { core::mem::zeroed() };
    addr.sin_family = libc::AF_INET as libc::sa_family_t;
    addr.sin_addr.s_addr = u32::from_ne_bytes([127, 0, 0, 1]);
    addr
}

unsafe fn complete_request(req: usize, status: c_int, completion: Completion) {
    ktrace!("loopback: complete {} {:#x} status={}", completion.name(), req, status);
    match completion {
        Completion::Write(cb) => {
            if let Some(cb) = cb {
                cb(req as *mut uv_write_t, status);
            }
        }
        Completion::Connect(cb) => {
            if let Some(cb) = cb {
                cb(req as *mut uv_connect_t, status);
            }
        }
        Completion::Shutdown(cb) => {
            if let Some(cb) = cb {
                cb(req as *mut uv_shutdown_t, status);
            }
        }
        Completion::UdpSend(cb) => {
            if let Some(cb) = cb {
                cb(req as *mut uv_udp_send_t, status);
            }
        }
        Completion::Fs(cb) => {
            let fs = req as *mut uv_fs_t;
            (*fs).result = status as isize;
            if let Some(cb) = cb {
                cb(fs);
            }
        }
        Completion::GetAddrInfo(cb) => cb(req as *mut uv_getaddrinfo_t, status, core::ptr::null_mut()),
        Completion::GetNameInfo { cb, host, service } => {
            let host = host.as_ref().map_or(core::ptr::null(), |h| h.as_ptr());
            let service = service.as_ref().map_or(core::ptr::null(), |s| s.as_ptr());
            cb(req as *mut uv_getnameinfo_t, status, host, service);
        }
        Completion::Random { cb, buf, len } => {
            if status == 0 && buf != 0 {
                fill_pattern(buf as *mut u8, len);
            }
            if let Some(cb) = cb {
                cb(req as *mut uv_random_t, status, buf as *mut c_void, len);
            }
        }
    }
}

/// Deterministic stand-in for random bytes.
unsafe fn fill_pattern(buf: *mut u8, len: usize) {
    let mut x: u32 = 0x9E37_79B9;
    for i in 0..len {
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        *buf.add(i) = x as u8;
    }
}

impl LoopRemote {
    /// Deliver `nread` (and up to that many bytes of `data`) to a reading stream.
    pub fn inject_read(&self, stream: *mut uv_stream_t, nread: isize, data: &[u8]) -> c_int {
        self.state.post(Event::Read {
            stream: stream as usize,
            nread,
            data: data.to_vec(),
        })
    }

    pub fn inject_recv(&self, udp: *mut uv_udp_t, nread: isize, data: &[u8], has_sender: bool) -> c_int {
        self.state.post(Event::Recv {
            udp: udp as usize,
            nread,
            data: data.to_vec(),
            has_sender,
        })
    }

    pub fn inject_connection(&self, server: *mut uv_stream_t, status: c_int) -> c_int {
        self.state.post(Event::Connection {
            server: server as usize,
            status,
        })
    }

    /// Expire a timer or deliver a signal.
    pub fn fire(&self, handle: *mut uv_handle_t) -> c_int {
        self.state.post(Event::Fire {
            handle: handle as usize,
        })
    }

    pub fn inject_poll(&self, poll: *mut uv_poll_t, status: c_int, events: c_int) -> c_int {
        self.state.post(Event::Poll {
            handle: poll as usize,
            status,
            events,
        })
    }

    pub fn inject_exit(&self, process: *mut uv_process_t, status: i64, signal: c_int) -> c_int {
        self.state.post(Event::Exit {
            process: process as usize,
            status,
            signal,
        })
    }

    /// Complete a submitted request with `status`.
    pub fn complete(&self, req: *mut uv_req_t, status: c_int) -> c_int {
        self.state.post(Event::Complete {
            req: req as usize,
            status,
        })
    }

    /// Close from any thread. Events still queued for the handle are dropped.
    pub fn close(&self, handle: *mut uv_handle_t, cb: Option<uv_close_cb>) -> c_int {
        self.state.begin_close(handle as usize, cb)
    }
}

// Foreign entry points. Each finds its loop through the object's loop pointer.

pub unsafe extern "C" fn loopback_version() -> c_uint {
    version_hex(1, 48, 0)
}

pub unsafe extern "C" fn loopback_close(handle: *mut uv_handle_t, cb: Option<uv_close_cb>) {
    match state_of_handle(handle) {
        Some(state) => {
            state.begin_close(handle as usize, cb);
        }
        None => kerror!("loopback: close of {:p} with no loop", handle),
    }
}

pub unsafe extern "C" fn loopback_tcp_close_reset(handle: *mut uv_tcp_t, cb: Option<uv_close_cb>) -> c_int {
    let handle = handle as *mut uv_handle_t;
    let Some(state) = state_of_handle(handle) else {
        return UV_EINVAL;
    };
    state.begin_close(handle as usize, cb)
}

pub unsafe extern "C" fn loopback_queue_work(
    loop_: *mut uv_loop_t,
    req: *mut uv_work_t,
    work: Option<uv_work_cb>,
    after: Option<uv_after_work_cb>,
) -> c_int {
    if req.is_null() || work.is_none() {
        return UV_EINVAL;
    }
    let Some(state) = state_of(loop_) else {
        return UV_EINVAL;
    };
    (*req).loop_ = loop_;
    let job = Job {
        req: req as usize,
        work,
        after,
    };
    match state.pool.enqueue(job) {
        Ok(()) => 0,
        Err(_) => UV_EAGAIN,
    }
}

struct ThreadStart {
    entry: uv_thread_cb,
    arg: usize,
}

extern "C" fn thread_start(raw: *mut c_void) -> *mut c_void {
    let start = unsafe { Box::from_raw(raw as *mut ThreadStart) };
    unsafe { (start.entry)(start.arg as *mut c_void) };
    core::ptr::null_mut()
}

pub unsafe extern "C" fn loopback_thread_create(
    tid: *mut uv_thread_t,
    entry: Option<uv_thread_cb>,
    arg: *mut c_void,
) -> c_int {
    let Some(entry) = entry else {
        return UV_EINVAL;
    };
    if tid.is_null() {
        return UV_EINVAL;
    }
    let start = Box::into_raw(Box::new(ThreadStart {
        entry,
        arg: arg as usize,
    }));
    let rc = libc::pthread_create(tid, core::ptr::null(), thread_start, start.cast());
    if rc != 0 {
        drop(Box::from_raw(start));
        return -rc;
    }
    0
}

pub unsafe extern "C" fn loopback_thread_join(tid: *mut uv_thread_t) -> c_int {
    if tid.is_null() {
        return UV_EINVAL;
    }
    -libc::pthread_join(*tid, core::ptr::null_mut())
}

const ONCE_NEW: u32 = 0;
const ONCE_RUNNING: u32 = 1;
const ONCE_DONE: u32 = 2;

pub unsafe extern "C" fn loopback_once(guard: *mut uv_once_t, cb: Option<uv_once_cb>) {
    if guard.is_null() {
        return;
    }
    let state: &AtomicU32 = &(*guard).state;
    if state
        .compare_exchange(ONCE_NEW, ONCE_RUNNING, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
    {
        if let Some(cb) = cb {
            cb();
        }
        state.store(ONCE_DONE, Ordering::Release);
        return;
    }
    while state.load(Ordering::Acquire) != ONCE_DONE {
        thread::yield_now();
    }
}

pub unsafe extern "C" fn loopback_udp_set_source_membership(
    handle: *mut uv_udp_t,
    multicast: *const c_char,
    _interface: *const c_char,
    source: *const c_char,
    _membership: uv_membership,
) -> c_int {
    if handle.is_null() || multicast.is_null() || source.is_null() {
        return UV_EINVAL;
    }
    0
}

pub unsafe extern "C" fn loopback_signal_start_oneshot(
    handle: *mut uv_signal_t,
    cb: Option<uv_signal_cb>,
    signum: c_int,
) -> c_int {
    let Some(cb) = cb else {
        return UV_EINVAL;
    };
    let Some(state) = state_of_handle(handle as *mut uv_handle_t) else {
        return UV_EINVAL;
    };
    state.watch(handle as usize, |e| {
        e.watcher = Some(Watcher::Signal {
            cb,
            signum,
            oneshot: true,
        })
    })
}

/// Entry-point table pointing at this loop implementation.
pub fn api() -> ForeignApi {
    ForeignApi {
        version: loopback_version,
        close: loopback_close,
        tcp_close_reset: loopback_tcp_close_reset,
        queue_work: loopback_queue_work,
        thread_create: loopback_thread_create,
        thread_join: loopback_thread_join,
        once: loopback_once,
        udp_set_source_membership: loopback_udp_set_source_membership,
        signal_start_oneshot: loopback_signal_start_oneshot,
    }
}
