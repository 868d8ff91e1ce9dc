//! uvbridge End-to-End Smoke Test
//!
//! Drives every object category through the loopback loop:
//!   Part A: Binding capabilities of the loopback entry points
//!   Part B: Handles (timer, oneshot signal, process exit, close ordering)
//!   Part C: Streams and UDP (alloc/read, connection, recv)
//!   Part D: Requests (write, getaddrinfo, getnameinfo, random)
//!   Part E: Pool and threads (managed work, native work, once, threads)
//!
//! Run: UVB_LOG_LEVEL=debug cargo run -p uvbridge-smoke

use std::ffi::CString;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use uvbridge::abi::*;
use uvbridge::trampoline::handle::{exit_cb, timer_cb};
use uvbridge::trampoline::request::{getaddrinfo_cb, getnameinfo_cb, random_cb, write_cb};
use uvbridge::trampoline::stream::{alloc_cb, connection_cb, read_cb, udp_alloc_cb};
use uvbridge::trampoline::udp::recv_cb;
use uvbridge::trampoline::work::cwork_stats;
use uvbridge::{global, kinfo, null_variant, Binding, Callback, Capability, ManagedBuffer, Slots, Trampoline};
use uvbridge_loopback::{Completion, Loop, LoopbackConfig};

// ── Test harness ──

struct TestRunner {
    total: usize,
    passed: usize,
    failed: usize,
}

const LINE: &str = "────────────────────────────────────────────────────────────";

impl TestRunner {
    fn new() -> Self {
        Self { total: 0, passed: 0, failed: 0 }
    }

    fn section(&self, name: &str) {
        println!("\n{}", LINE);
        println!("  {}", name);
        println!("{}", LINE);
    }

    fn check(&mut self, name: &str, ok: bool, reason: &str) {
        self.total += 1;
        if ok {
            self.passed += 1;
            println!("  [{:2}] {:<52} PASS", self.total, name);
        } else {
            self.failed += 1;
            println!("  [{:2}] {:<52} FAIL: {}", self.total, name, reason);
        }
    }

    fn summary(&self) {
        println!("\n{}", LINE);
        println!(
            "  Total: {}  Passed: {}  Failed: {}",
            self.total, self.passed, self.failed
        );
        println!("{}", LINE);
    }
}

type Log = Arc<Mutex<Vec<String>>>;

fn record(log: &Log) -> impl Fn(String) + Send + Sync + 'static {
    let log = Arc::clone(log);
    move |line| log.lock().unwrap_or_else(|p| p.into_inner()).push(line)
}

fn take(log: &Log) -> Vec<String> {
    std::mem::take(&mut *log.lock().unwrap_or_else(|p| p.into_inner()))
}

// ════════════════════════════════════════════════════════════
// Part A: Binding
// ════════════════════════════════════════════════════════════

fn test_binding(t: &mut TestRunner, binding: &Binding) {
    t.section("Part A: Binding");
    let caps = binding.capabilities();
    println!("       version {:#08x}, {:?}", binding.version(), caps);
    for cap in Capability::ALL {
        t.check(&format!("capability {}", cap), caps.contains(cap), "missing");
    }
    t.check(
        "stubbed binding has no capabilities",
        Binding::stubbed().capabilities().is_empty(),
        "stub probed as real",
    );
    t.check(
        "null variant for exit callback",
        null_variant(Trampoline::Exit).map_or(false, |p| p.is_null()),
        "no null variant",
    );
}

// ════════════════════════════════════════════════════════════
// Part B: Handles
// ════════════════════════════════════════════════════════════

fn test_handles(t: &mut TestRunner, lp: &mut Loop, binding: &Binding) {
    t.section("Part B: Handles");
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut timer = Box::new(uv_timer_t::new());
    let mut signal = Box::new(uv_signal_t::new());
    let mut process = Box::new(uv_process_t::new());
    let timer_ptr = &mut *timer as *mut uv_timer_t;
    let signal_ptr = &mut *signal as *mut uv_signal_t;
    let process_ptr = &mut *process as *mut uv_process_t;

    let (tick, closed, sig, exit, exit_closed) = (record(&log), record(&log), record(&log), record(&log), record(&log));
    let registered = unsafe {
        lp.init(timer_ptr.cast());
        lp.init(signal_ptr.cast());
        lp.init(process_ptr.cast());
        let ok = binding
            .register(
                timer_ptr,
                Slots::handle()
                    .on_tick(move || tick("tick".into()))
                    .on_close(move || closed("timer closed".into())),
            )
            .is_ok()
            && binding
                .register(signal_ptr, Slots::handle().on_complete(move |n| sig(format!("signal {}", n))))
                .is_ok()
            && binding
                .register(
                    process_ptr,
                    Slots::handle()
                        .on_event(Callback::int2(move |status, term| exit(format!("exit {} {}", status, term))))
                        .on_close(move || exit_closed("process closed".into())),
                )
                .is_ok();
        lp.timer_start(timer_ptr, timer_cb);
        lp.process_spawned(process_ptr, Some(exit_cb));
        ok
    };
    t.check("register timer, signal, process", registered, "registration failed");

    let oneshot = unsafe { binding.signal_start_oneshot(signal_ptr, libc::SIGHUP) };
    t.check("signal_start_oneshot", oneshot.is_ok(), &format!("{:?}", oneshot));

    let remote = lp.remote();
    remote.fire(timer_ptr.cast());
    remote.fire(timer_ptr.cast());
    remote.fire(signal_ptr.cast());
    remote.fire(signal_ptr.cast());
    remote.inject_exit(process_ptr, 3, 0);
    lp.run_until_idle();
    let seen = take(&log);
    let expected = vec![
        "tick".to_string(),
        "tick".to_string(),
        format!("signal {}", libc::SIGHUP),
        "exit 3 0".to_string(),
    ];
    t.check("callbacks in delivery order", seen == expected, &format!("{:?}", seen));

    unsafe {
        let _ = binding.close(timer_ptr.cast());
        let _ = binding.close(signal_ptr.cast());
        let _ = binding.close(process_ptr.cast());
    }
    remote.fire(timer_ptr.cast());
    lp.run_until_idle();
    let seen = take(&log);
    t.check(
        "close callbacks only",
        seen == ["timer closed", "process closed"],
        &format!("{:?}", seen),
    );
    t.check(
        "anchors released",
        timer.data.is_null() && signal.data.is_null() && process.data.is_null(),
        "user-data still set",
    );
}

// ════════════════════════════════════════════════════════════
// Part C: Streams and UDP
// ════════════════════════════════════════════════════════════

fn test_streams(t: &mut TestRunner, lp: &mut Loop, binding: &Binding) {
    t.section("Part C: Streams and UDP");
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut tcp = Box::new(uv_tcp_t::new());
    let mut udp = Box::new(uv_udp_t::new());
    let tcp_ptr = &mut *tcp as *mut uv_tcp_t;
    let udp_ptr = &mut *udp as *mut uv_udp_t;

    let (alloc, read, conn, ualloc, recv) = (record(&log), record(&log), record(&log), record(&log), record(&log));
    unsafe {
        lp.init(tcp_ptr.cast());
        lp.init(udp_ptr.cast());
        let tcp_slots = Slots::stream()
            .on_alloc(move |n| {
                alloc(format!("A({})", n));
                ManagedBuffer::new(n).ok()
            })
            .on_read(move |n, buf| {
                let text = buf.map(|b| String::from_utf8_lossy(&b.copy_prefix(n.max(0) as usize)).into_owned());
                read(format!("R({}) {:?}", n, text));
            })
            .on_connection(move |status| conn(format!("connection {}", status)));
        let udp_slots = Slots::udp()
            .on_alloc(move |n| {
                ualloc(format!("UA({})", n));
                ManagedBuffer::new(n).ok()
            })
            .on_recv(move |n, _, addr, _| recv(format!("recv {} from {}", n, addr != 0)));
        let ok = binding.register(tcp_ptr, tcp_slots).is_ok() && binding.register(udp_ptr, udp_slots).is_ok();
        t.check("register tcp and udp", ok, "registration failed");
        lp.read_start(tcp_ptr.cast(), alloc_cb, read_cb);
        lp.listen(tcp_ptr.cast(), connection_cb);
        lp.udp_recv_start(udp_ptr, udp_alloc_cb, recv_cb);
    }

    let suggested = lp.config().suggested_alloc;
    let remote = lp.remote();
    remote.inject_read(tcp_ptr.cast(), 5, b"hello");
    remote.inject_read(tcp_ptr.cast(), UV_EOF as isize, &[]);
    remote.inject_connection(tcp_ptr.cast(), 0);
    remote.inject_recv(udp_ptr, 4, b"ping", true);
    lp.run_until_idle();
    let seen = take(&log);
    let expected = vec![
        format!("A({})", suggested),
        format!("R(5) {:?}", Some("hello")),
        format!("A({})", suggested),
        format!("R({}) None", UV_EOF),
        "connection 0".to_string(),
        format!("UA({})", suggested),
        "recv 4 from true".to_string(),
    ];
    t.check("alloc before every read", seen == expected, &format!("{:?}", seen));

    unsafe {
        let _ = binding.close(tcp_ptr.cast());
        let _ = binding.close(udp_ptr.cast());
    }
    lp.run_until_idle();
    t.check(
        "stream and udp released",
        tcp.data.is_null() && udp.data.is_null(),
        "user-data still set",
    );
}

// ════════════════════════════════════════════════════════════
// Part D: Requests
// ════════════════════════════════════════════════════════════

fn test_requests(t: &mut TestRunner, lp: &mut Loop, binding: &Binding) {
    t.section("Part D: Requests");
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut write = Box::new(uv_write_t::new());
    let mut gai = Box::new(uv_getaddrinfo_t::new());
    let mut gni = Box::new(uv_getnameinfo_t::new());
    let mut random = Box::new(uv_random_t::new());
    let mut bytes = vec![0u8; 32];

    let (w, a, n, r) = (record(&log), record(&log), record(&log), record(&log));
    unsafe {
        let ok = binding
            .register(&mut *write as *mut uv_write_t, Slots::request().on_complete(move |s| w(format!("write {}", s))))
            .is_ok()
            && binding
                .register(
                    &mut *gai as *mut uv_getaddrinfo_t,
                    Slots::request().on_event(Callback::int2(move |s, res| a(format!("getaddrinfo {} {}", s, res)))),
                )
                .is_ok()
            && binding
                .register(
                    &mut *gni as *mut uv_getnameinfo_t,
                    Slots::request().on_event(Callback::names(move |s, host, service| {
                        n(format!("getnameinfo {} {:?} {:?}", s, host, service))
                    })),
                )
                .is_ok()
            && binding
                .register(
                    &mut *random as *mut uv_random_t,
                    Slots::request().on_event(Callback::read(move |len, _| r(format!("random {}", len)))),
                )
                .is_ok();
        t.check("register requests", ok, "registration failed");

        lp.submit(write.as_req(), Completion::Write(Some(write_cb)));
        lp.submit(gai.as_req(), Completion::GetAddrInfo(getaddrinfo_cb));
        lp.submit(
            gni.as_req(),
            Completion::GetNameInfo {
                cb: getnameinfo_cb,
                host: CString::new("localhost").ok(),
                service: CString::new("http").ok(),
            },
        );
        lp.submit(
            random.as_req(),
            Completion::Random {
                cb: Some(random_cb),
                buf: bytes.as_mut_ptr() as usize,
                len: bytes.len(),
            },
        );
    }

    let remote = lp.remote();
    remote.complete(write.as_req(), 0);
    remote.complete(write.as_req(), UV_ECANCELED);
    remote.complete(gai.as_req(), UV_ENOENT);
    remote.complete(gni.as_req(), 0);
    remote.complete(random.as_req(), 0);
    lp.run_until_idle();

    let seen = take(&log);
    let expected = vec![
        "write 0".to_string(),
        format!("getaddrinfo {} 0", UV_ENOENT),
        format!("getnameinfo 0 {:?} {:?}", Some("localhost"), Some("http")),
        format!("random {}", bytes.len()),
    ];
    t.check("each request completes once", seen == expected, &format!("{:?}", seen));
    t.check("random bytes filled", bytes.iter().any(|&b| b != 0), "buffer untouched");
    t.check(
        "request anchors released",
        write.data.is_null() && gai.data.is_null() && gni.data.is_null() && random.data.is_null(),
        "user-data still set",
    );
}

// ════════════════════════════════════════════════════════════
// Part E: Pool and threads
// ════════════════════════════════════════════════════════════

static NATIVE_RUNS: AtomicUsize = AtomicUsize::new(0);

unsafe extern "C" fn native_job(arg: *mut core::ffi::c_void) {
    NATIVE_RUNS.fetch_add(1, Ordering::SeqCst);
    *(arg as *mut u64) *= 2;
}

fn test_pool(t: &mut TestRunner, lp: &mut Loop, binding: &Binding) {
    t.section("Part E: Pool and threads");
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut managed = Box::new(uv_work_t::new());
    let mut native = Box::new(uv_work_t::new());
    let mut value: u64 = 21;
    let before = cwork_stats();

    let (work, after, native_after) = (record(&log), record(&log), record(&log));
    let queued = unsafe {
        let slots = Slots::work()
            .on_work(move || work(format!("work on {}", std::thread::current().name().unwrap_or("?"))))
            .on_complete(move |s| after(format!("after {}", s)));
        let managed_ok = binding.queue_work(lp.raw(), &mut *managed, slots);
        let native_ok = binding.queue_c_work(
            lp.raw(),
            &mut *native,
            native_job,
            (&mut value as *mut u64).cast(),
            move |s| native_after(format!("native after {}", s)),
        );
        managed_ok.is_ok() && native_ok.is_ok()
    };
    t.check("queue managed and native work", queued, "queue_work failed");
    lp.run_until_idle();

    let seen = take(&log);
    t.check(
        "managed work ran on a pool thread",
        seen.iter().any(|s| s.starts_with("work on uvb-pool-")),
        &format!("{:?}", seen),
    );
    t.check(
        "both completions delivered",
        seen.contains(&"after 0".to_string()) && seen.contains(&"native after 0".to_string()),
        &format!("{:?}", seen),
    );
    t.check("native function saw its argument", value == 42, &format!("value={}", value));
    let stats = cwork_stats();
    t.check(
        "aux struct freed once",
        stats.allocated - before.allocated == 1 && stats.freed - before.freed == 1,
        &format!("{:?}", stats),
    );
    let pool = lp.pool_stats();
    t.check(
        "registration paired on pool threads",
        pool.registrations == pool.deregistrations && pool.acquires == pool.releases,
        &format!("{:?}", pool),
    );

    let guard = uv_once_t::default();
    let runs = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        let runs = Arc::clone(&runs);
        let _ = binding.once(&guard, move || {
            runs.fetch_add(1, Ordering::SeqCst);
        });
    }
    t.check("once runs its initializer once", runs.load(Ordering::SeqCst) == 1, "ran more than once");

    let hits = Arc::new(AtomicUsize::new(0));
    let h = Arc::clone(&hits);
    let joined = binding
        .spawn_thread(move || {
            h.fetch_add(1, Ordering::SeqCst);
        })
        .and_then(|thread| binding.join_thread(thread));
    t.check(
        "native thread body ran",
        joined.is_ok() && hits.load(Ordering::SeqCst) == 1,
        &format!("{:?}", joined),
    );
}

fn main() {
    uvbridge::init_logging();
    println!("=== uvbridge End-to-End Smoke Test ===");
    let mut t = TestRunner::new();

    let mut lp = match Loop::new(LoopbackConfig::from_env()) {
        Ok(lp) => lp,
        Err(e) => {
            println!("\nFATAL: loopback loop failed to start: {}", e);
            std::process::exit(1);
        }
    };
    let binding = Binding::new(uvbridge_loopback::api());
    kinfo!("smoke: loopback with {} pool workers", lp.pool_workers());

    test_binding(&mut t, &binding);
    test_handles(&mut t, &mut lp, &binding);
    test_streams(&mut t, &mut lp, &binding);
    test_requests(&mut t, &mut lp, &binding);
    test_pool(&mut t, &mut lp, &binding);

    let bridge = global();
    println!("\n  registry: {:?}", bridge.registry().stats());
    println!("  dispatch: {:?}", bridge.stats().snapshot());
    println!("  loop:     {:?}", lp.stats());
    t.check("no live anchors left", bridge.registry().live() == 0, "anchors leaked");

    t.summary();
    std::process::exit(if t.failed > 0 { 1 } else { 0 });
}
