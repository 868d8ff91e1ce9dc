//! End-to-end behaviour over the loopback loop
//!
//! Each test drives real trampolines through a loopback `Loop` and the
//! process-wide bridge, and checks what the managed side observed.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use uvbridge_core::{fault, BridgeError, Callback, ManagedBuffer};
use uvbridge_loopback::{Completion, Loop, LoopbackConfig};
use uvbridge_runtime::abi::*;
use uvbridge_runtime::trampoline::handle::{poll_cb, signal_cb, timer_cb};
use uvbridge_runtime::trampoline::request::{fs_cb, write_cb};
use uvbridge_runtime::trampoline::stream::{alloc_cb, connection_cb, read_cb, udp_alloc_cb};
use uvbridge_runtime::trampoline::udp::recv_cb;
use uvbridge_runtime::trampoline::work::cwork_stats;
use uvbridge_runtime::lock::RuntimeGuard;
use uvbridge_runtime::tls::{self, LockState};

use crate::{Binding, Slots};

type Log = Arc<Mutex<Vec<String>>>;

fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn setup() -> (Loop, Binding) {
    let config = LoopbackConfig::default()
        .pool_size(2)
        .queue_depth(4096)
        .suggested_alloc(4096);
    (Loop::new(config).unwrap(), Binding::new(uvbridge_loopback::api()))
}

#[test]
fn test_stream_reads_alloc_then_read() {
    let (mut lp, binding) = setup();
    let calls = log();
    let mut tcp = Box::new(uv_tcp_t::new());
    let tcp_ptr = &mut *tcp as *mut uv_tcp_t;
    let stream = tcp_ptr as *mut uv_stream_t;

    let closed = Arc::new(AtomicUsize::new(0));
    let (a, r, c) = (Arc::clone(&calls), Arc::clone(&calls), Arc::clone(&closed));
    let anchor = unsafe {
        lp.init(tcp_ptr.cast());
        let anchor = binding
            .register(
                tcp_ptr,
                Slots::stream()
                    .on_alloc(move |suggested| {
                        a.lock().unwrap().push(format!("A({})", suggested));
                        ManagedBuffer::new(64).ok()
                    })
                    .on_read(move |nread, buf| {
                        let bytes = buf.map(|b| b.copy_prefix(nread.max(0) as usize));
                        r.lock().unwrap().push(format!("R({}) {:?}", nread, bytes));
                    })
                    .on_close(move || {
                        c.fetch_add(1, Ordering::SeqCst);
                    }),
            )
            .unwrap();
        assert_eq!(lp.read_start(stream, alloc_cb, read_cb), 0);
        anchor
    };

    let remote = lp.remote();
    remote.inject_read(stream, 10, &[7; 10]);
    remote.inject_read(stream, 0, &[]);
    remote.inject_read(stream, -4, &[]);
    lp.run_until_idle();

    assert_eq!(
        entries(&calls),
        vec![
            "A(4096)".to_string(),
            format!("R(10) {:?}", Some(vec![7u8; 10])),
            "A(4096)".to_string(),
            format!("R(0) {:?}", Some(Vec::<u8>::new())),
            "A(4096)".to_string(),
            "R(-4) None".to_string(),
        ]
    );
    assert!(!anchor.is_released());
    assert_eq!(anchor.delivered(), 6);

    drop(anchor);
    unsafe { binding.close(tcp_ptr.cast()).unwrap() };
    lp.run_until_idle();
    assert_eq!(closed.load(Ordering::SeqCst), 1);
    assert!(tcp.data.is_null());
}

#[test]
fn test_handle_callbacks_follow_foreign_order() {
    let (mut lp, binding) = setup();
    let seen = log();
    let mut poll = Box::new(uv_poll_t::new());
    let mut signal = Box::new(uv_signal_t::new());
    let poll_ptr = &mut *poll as *mut uv_poll_t;
    let signal_ptr = &mut *signal as *mut uv_signal_t;

    let (p, s) = (Arc::clone(&seen), Arc::clone(&seen));
    unsafe {
        lp.init(poll_ptr.cast());
        lp.init(signal_ptr.cast());
        binding
            .register(
                poll_ptr,
                Slots::handle().on_event(Callback::int2(move |status, events| {
                    p.lock().unwrap().push(format!("poll {} {}", status, events));
                })),
            )
            .unwrap();
        binding
            .register(signal_ptr, Slots::handle().on_complete(move |signum| {
                s.lock().unwrap().push(format!("signal {}", signum));
            }))
            .unwrap();
        lp.poll_start(poll_ptr, poll_cb);
        lp.signal_start(signal_ptr, signal_cb, libc::SIGUSR2);
    }

    let remote = lp.remote();
    let delivered = [(0, 1), (0, 4), (UV_EINVAL, 0), (0, 5)];
    for &(status, events) in &delivered {
        remote.inject_poll(poll_ptr, status, events);
    }
    remote.fire(signal_ptr.cast());
    lp.run_until_idle();

    let mut expected: Vec<String> = delivered
        .iter()
        .map(|(status, events)| format!("poll {} {}", status, events))
        .collect();
    expected.push(format!("signal {}", libc::SIGUSR2));
    assert_eq!(entries(&seen), expected);

    unsafe {
        binding.close(poll_ptr.cast()).unwrap();
        binding.close(signal_ptr.cast()).unwrap();
    }
    lp.run_until_idle();
    assert_eq!(lp.active_handles(), 0);
}

#[test]
fn test_close_is_last_and_exactly_once() {
    let (mut lp, binding) = setup();
    let ticks = Arc::new(AtomicUsize::new(0));
    let closes = Arc::new(AtomicUsize::new(0));
    let mut timer = Box::new(uv_timer_t::new());
    let timer_ptr = &mut *timer as *mut uv_timer_t;

    let (t, c) = (Arc::clone(&ticks), Arc::clone(&closes));
    let anchor = unsafe {
        lp.init(timer_ptr.cast());
        let anchor = binding
            .register(
                timer_ptr,
                Slots::handle()
                    .on_tick(move || {
                        t.fetch_add(1, Ordering::SeqCst);
                    })
                    .on_close(move || {
                        c.fetch_add(1, Ordering::SeqCst);
                    }),
            )
            .unwrap();
        lp.timer_start(timer_ptr, timer_cb);
        anchor
    };

    let remote = lp.remote();
    remote.fire(timer_ptr.cast());
    lp.run_once();
    assert_eq!(ticks.load(Ordering::SeqCst), 1);

    // Three expiries already queued when the close is requested.
    for _ in 0..3 {
        remote.fire(timer_ptr.cast());
    }
    unsafe { binding.close(timer_ptr.cast()).unwrap() };
    assert_eq!(
        unsafe { binding.close(timer_ptr.cast()) },
        Err(BridgeError::AlreadyClosing)
    );
    remote.fire(timer_ptr.cast());
    lp.run_until_idle();

    assert_eq!(ticks.load(Ordering::SeqCst), 1);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    // The loop stops the handle at close, so the queued expiries never
    // reach the trampoline.
    assert_eq!(lp.stats().skipped, 4);
    assert_eq!(anchor.dropped(), 0);
    assert!(anchor.is_released());
    assert!(timer.data.is_null());
}

#[test]
fn test_close_lands_when_event_queue_is_full() {
    let config = LoopbackConfig::default().pool_size(1).queue_depth(16);
    let mut lp = Loop::new(config).unwrap();
    let binding = Binding::new(uvbridge_loopback::api());
    let closes = Arc::new(AtomicUsize::new(0));
    let mut timer = Box::new(uv_timer_t::new());
    let timer_ptr = &mut *timer as *mut uv_timer_t;

    let c = Arc::clone(&closes);
    let anchor = unsafe {
        lp.init(timer_ptr.cast());
        let anchor = binding
            .register(
                timer_ptr,
                Slots::handle().on_tick(|| {}).on_close(move || {
                    c.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        lp.timer_start(timer_ptr, timer_cb);
        anchor
    };

    let remote = lp.remote();
    let mut posted = 0;
    while remote.fire(timer_ptr.cast()) == 0 {
        posted += 1;
    }
    assert_eq!(posted, 16);

    unsafe { binding.close(timer_ptr.cast()).unwrap() };
    lp.run_until_idle();
    lp.run_until_idle();

    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert!(anchor.is_released());
    assert!(timer.data.is_null());
    assert_eq!(lp.active_handles(), 0);
}

#[test]
fn test_run_until_idle_while_holding_runtime() {
    let (mut lp, binding) = setup();
    let ran = Arc::new(AtomicUsize::new(0));
    let completed = Arc::new(AtomicUsize::new(0));
    let mut req = Box::new(uv_work_t::new());

    let _guard = RuntimeGuard::enter(binding.bridge().runtime());
    let (r, c) = (Arc::clone(&ran), Arc::clone(&completed));
    unsafe {
        binding
            .queue_work(
                lp.raw(),
                &mut *req,
                Slots::work()
                    .on_work(move || {
                        r.fetch_add(1, Ordering::SeqCst);
                    })
                    .on_complete(move |_| {
                        c.fetch_add(1, Ordering::SeqCst);
                    }),
            )
            .unwrap();
    }
    lp.run_until_idle();

    assert_eq!(ran.load(Ordering::SeqCst), 1);
    assert_eq!(completed.load(Ordering::SeqCst), 1);
    assert_eq!(tls::lock_state(), LockState::HoldsLock);
}

#[test]
fn test_request_completes_once() {
    let (mut lp, binding) = setup();
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let mut write = Box::new(uv_write_t::new());
    let mut fs = Box::new(uv_fs_t::new());
    let write_ptr = &mut *write as *mut uv_write_t;
    let fs_ptr = &mut *fs as *mut uv_fs_t;

    let (w, f) = (Arc::clone(&statuses), Arc::clone(&statuses));
    unsafe {
        binding
            .register(write_ptr, Slots::request().on_complete(move |s| w.lock().unwrap().push(("write", s))))
            .unwrap();
        let again = binding.register(write_ptr, Slots::request().on_complete(|_| {}));
        assert_eq!(again.unwrap_err(), BridgeError::AlreadyRegistered);

        binding
            .register(fs_ptr, Slots::request().on_complete(move |s| f.lock().unwrap().push(("fs", s))))
            .unwrap();
        lp.submit(write_ptr.cast(), Completion::Write(Some(write_cb)));
        lp.submit(fs_ptr.cast(), Completion::Fs(Some(fs_cb)));
    }

    let remote = lp.remote();
    remote.complete(write_ptr.cast(), UV_ECONNRESET);
    remote.complete(write_ptr.cast(), 0);
    remote.complete(fs_ptr.cast(), 1234);
    lp.run_until_idle();

    assert_eq!(
        *statuses.lock().unwrap(),
        vec![("write", UV_ECONNRESET as i64), ("fs", 1234)]
    );
    assert!(write.data.is_null());
    assert!(fs.data.is_null());
}

#[test]
fn test_udp_and_listener() {
    let (mut lp, binding) = setup();
    let seen = log();
    let mut udp = Box::new(uv_udp_t::new());
    let mut server = Box::new(uv_tcp_t::new());
    let udp_ptr = &mut *udp as *mut uv_udp_t;
    let server_ptr = &mut *server as *mut uv_tcp_t;

    let (u, l) = (Arc::clone(&seen), Arc::clone(&seen));
    unsafe {
        lp.init(udp_ptr.cast());
        lp.init(server_ptr.cast());
        binding
            .register(
                udp_ptr,
                Slots::udp()
                    .on_alloc(|n| ManagedBuffer::new(n.min(512)).ok())
                    .on_recv(move |nread, buf, addr, _flags| {
                        let text = buf.map(|b| b.copy_prefix(nread.max(0) as usize));
                        u.lock().unwrap().push(format!("recv {} {:?} sender={}", nread, text, addr != 0));
                    }),
            )
            .unwrap();
        binding
            .register(server_ptr, Slots::stream().on_connection(move |status| {
                l.lock().unwrap().push(format!("connection {}", status));
            }))
            .unwrap();
        lp.udp_recv_start(udp_ptr, udp_alloc_cb, recv_cb);
        lp.listen(server_ptr.cast(), connection_cb);
    }

    let remote = lp.remote();
    remote.inject_recv(udp_ptr, 2, b"hi", true);
    remote.inject_connection(server_ptr.cast(), 0);
    remote.inject_recv(udp_ptr, 0, &[], false);
    lp.run_until_idle();

    assert_eq!(
        entries(&seen),
        vec![
            format!("recv 2 {:?} sender=true", Some(b"hi".to_vec())),
            "connection 0".to_string(),
            format!("recv 0 {:?} sender=false", Some(Vec::<u8>::new())),
        ]
    );
    unsafe {
        binding.close(udp_ptr.cast()).unwrap();
        binding.close(server_ptr.cast()).unwrap();
    }
    lp.run_until_idle();
}

static SEEN_ARGUMENT: AtomicUsize = AtomicUsize::new(0);

unsafe extern "C" fn record_argument(arg: *mut core::ffi::c_void) {
    SEEN_ARGUMENT.store(arg as usize, Ordering::SeqCst);
}

#[test]
fn test_c_work_restores_anchor_before_completion() {
    let (mut lp, binding) = setup();
    let before = cwork_stats();
    let mut req = Box::new(uv_work_t::new());
    let req_ptr = &mut *req as *mut uv_work_t;
    let mut payload = [0u8; 4];
    let argument: *mut core::ffi::c_void = payload.as_mut_ptr().cast();

    let completions = Arc::new(Mutex::new(Vec::new()));
    let word_at_completion = Arc::new(AtomicUsize::new(0));
    let (done, word) = (Arc::clone(&completions), Arc::clone(&word_at_completion));
    let req_addr = req_ptr as usize;

    let anchor = unsafe {
        binding
            .queue_c_work(lp.raw(), req_ptr, record_argument, argument, move |status| {
                word.store((*(req_addr as *const uv_work_t)).data as usize, Ordering::SeqCst);
                done.lock().unwrap().push(status);
            })
            .unwrap()
    };
    let key_word = anchor.key().to_user_data() as usize;
    drop(anchor);
    lp.run_until_idle();

    assert_eq!(SEEN_ARGUMENT.load(Ordering::SeqCst), argument as usize);
    assert_eq!(*completions.lock().unwrap(), vec![0]);
    assert_eq!(word_at_completion.load(Ordering::SeqCst), key_word);
    let after = cwork_stats();
    assert_eq!(after.allocated - before.allocated, 1);
    assert_eq!(after.freed - before.freed, 1);

    let pool = lp.pool_stats();
    assert_eq!(pool.acquires, 0);
    assert_eq!(pool.registrations, 0);
    assert!(req.data.is_null());
}

#[test]
fn test_managed_work_pairs_registration_on_failure() {
    let (mut lp, binding) = setup();
    let results = log();
    let mut failing = Box::new(uv_work_t::new());
    let mut panicking = Box::new(uv_work_t::new());

    let (r1, r2, r3) = (Arc::clone(&results), Arc::clone(&results), Arc::clone(&results));
    unsafe {
        let slots = Slots::work()
            .on_work(move || {
                fault::inject_allocation_failures(1);
                match ManagedBuffer::new(32) {
                    Ok(_) => r1.lock().unwrap().push("allocated".into()),
                    Err(e) => r1.lock().unwrap().push(format!("work failed: {}", e)),
                }
            })
            .on_complete(move |status| r2.lock().unwrap().push(format!("after {}", status)));
        binding.queue_work(lp.raw(), &mut *failing, slots).unwrap();

        let slots = Slots::work()
            .on_work(|| panic!("managed work blew up"))
            .on_complete(move |status| r3.lock().unwrap().push(format!("after {}", status)));
        binding.queue_work(lp.raw(), &mut *panicking, slots).unwrap();
    }
    lp.run_until_idle();

    let results = entries(&results);
    assert!(results.contains(&format!("work failed: {}", BridgeError::AllocationFailed)));
    assert_eq!(results.iter().filter(|s| *s == "after 0").count(), 2);

    let pool = lp.pool_stats();
    assert_eq!(pool.jobs, 2);
    assert_eq!(pool.registrations, 2);
    assert_eq!(pool.deregistrations, 2);
    assert_eq!(pool.acquires, pool.releases);
    assert!(failing.data.is_null());
    assert!(panicking.data.is_null());
}

#[test]
fn test_register_then_resolve_roundtrip() {
    let binding = Binding::new(uvbridge_loopback::api());
    let mut timers: Vec<Box<uv_timer_t>> = (0..16).map(|_| Box::new(uv_timer_t::new())).collect();
    let mut anchors = Vec::new();
    for timer in &mut timers {
        let ptr = &mut **timer as *mut uv_timer_t;
        anchors.push(unsafe { binding.register(ptr, Slots::handle()).unwrap() });
    }
    for (timer, anchor) in timers.iter_mut().zip(&anchors) {
        let ptr = &mut **timer as *mut uv_timer_t;
        let resolved = unsafe { binding.resolve(ptr) }.unwrap();
        assert!(Arc::ptr_eq(&resolved, anchor));
        unsafe { binding.bridge().registry().release(ptr).unwrap() };
        assert!(anchor.is_released());
        assert!(unsafe { binding.resolve(ptr) }.is_none());
    }
}

#[test]
fn test_once_and_native_threads() {
    let binding = Binding::new(uvbridge_loopback::api());
    let runs = Arc::new(AtomicUsize::new(0));
    let guard = uv_once_t::default();
    for _ in 0..3 {
        let runs = Arc::clone(&runs);
        binding
            .once(&guard, move || {
                runs.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(!binding.bridge().once_slot().is_armed());

    let state = Arc::new(Mutex::new(None));
    let s = Arc::clone(&state);
    let thread = binding
        .spawn_thread(move || {
            *s.lock().unwrap() = Some(tls::lock_state());
        })
        .unwrap();
    let key = thread.key();
    binding.join_thread(thread).unwrap();
    assert_eq!(*state.lock().unwrap(), Some(LockState::HoldsLock));
    assert!(binding.bridge().registry().lookup(key).is_none());
}

/// Per-handle record for the close/read race.
#[derive(Default)]
struct Racer {
    reads: AtomicUsize,
    closes: AtomicUsize,
    closed: AtomicBool,
    late_reads: AtomicUsize,
}

#[test]
fn test_concurrent_close_and_pending_reads() {
    const HANDLES: usize = 32;
    const READS: usize = 50;

    let (mut lp, binding) = setup();
    let mut streams: Vec<Box<uv_tcp_t>> = (0..HANDLES).map(|_| Box::new(uv_tcp_t::new())).collect();
    let racers: Vec<Arc<Racer>> = (0..HANDLES).map(|_| Arc::new(Racer::default())).collect();

    for (tcp, racer) in streams.iter_mut().zip(&racers) {
        let ptr = &mut **tcp as *mut uv_tcp_t;
        let (on_read, on_close) = (Arc::clone(racer), Arc::clone(racer));
        unsafe {
            lp.init(ptr.cast());
            binding
                .register(
                    ptr,
                    Slots::stream()
                        .on_alloc(|n| ManagedBuffer::new(n.min(16)).ok())
                        .on_read(move |_, _| {
                            if on_read.closed.load(Ordering::SeqCst) {
                                on_read.late_reads.fetch_add(1, Ordering::SeqCst);
                            }
                            on_read.reads.fetch_add(1, Ordering::SeqCst);
                        })
                        .on_close(move || {
                            on_close.closed.store(true, Ordering::SeqCst);
                            on_close.closes.fetch_add(1, Ordering::SeqCst);
                        }),
                )
                .unwrap();
            lp.read_start(ptr.cast(), alloc_cb, read_cb);
        }
    }
    let addrs: Vec<usize> = streams.iter_mut().map(|s| &mut **s as *mut uv_tcp_t as usize).collect();

    let remote = lp.remote();
    let reader = {
        let addrs = addrs.clone();
        thread::spawn(move || {
            for _ in 0..READS {
                for &addr in &addrs {
                    while remote.inject_read(addr as *mut uv_stream_t, 3, b"abc") != 0 {
                        thread::yield_now();
                    }
                }
            }
        })
    };
    let closer = thread::spawn(move || {
        for &addr in addrs.iter().rev() {
            thread::sleep(Duration::from_micros(50));
            unsafe { binding.close(addr as *mut uv_handle_t).unwrap() };
        }
    });

    let deadline = Instant::now() + Duration::from_secs(20);
    while racers.iter().any(|r| r.closes.load(Ordering::SeqCst) == 0) {
        assert!(Instant::now() < deadline, "closes did not arrive");
        lp.run_once();
    }
    reader.join().unwrap();
    closer.join().unwrap();
    lp.run_until_idle();

    for (tcp, racer) in streams.iter().zip(&racers) {
        assert_eq!(racer.closes.load(Ordering::SeqCst), 1);
        assert_eq!(racer.late_reads.load(Ordering::SeqCst), 0);
        assert!(racer.reads.load(Ordering::SeqCst) <= READS);
        assert!(tcp.data.is_null());
    }
    assert_eq!(lp.active_handles(), 0);
}
