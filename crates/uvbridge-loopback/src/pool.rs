//! `WorkPool`: fixed worker threads for queued work.
//!
//! Workers pop jobs from a lock-free MPMC queue, run the pool-side
//! callback, and post the after-work event to the loop's event queue.
//! The lock-discipline counters of each job are summed so tests can see
//! how a job touched the managed runtime.

use crossbeam_queue::ArrayQueue;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use uvbridge_core::{kdebug, kwarn};
use uvbridge_runtime::abi::{uv_after_work_cb, uv_work_cb, uv_work_t};
use uvbridge_runtime::tls;

use crate::event::Event;

#[derive(Clone, Copy)]
pub(crate) struct Job {
    pub req: usize,
    pub work: Option<uv_work_cb>,
    pub after: Option<uv_after_work_cb>,
}

/// Lock-discipline activity summed over every job run so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub jobs: u64,
    pub acquires: u64,
    pub releases: u64,
    pub registrations: u64,
    pub deregistrations: u64,
}

#[derive(Default)]
struct Counters {
    jobs: AtomicU64,
    acquires: AtomicU64,
    releases: AtomicU64,
    registrations: AtomicU64,
    deregistrations: AtomicU64,
}

struct PoolInner {
    jobs: ArrayQueue<Job>,
    events: Arc<ArrayQueue<Event>>,
    /// Jobs queued or running whose after-work event is not yet posted
    in_flight: AtomicUsize,
    shutdown: AtomicBool,
    counters: Counters,
}

pub(crate) struct WorkPool {
    inner: Arc<PoolInner>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl WorkPool {
    pub fn new(n: usize, queue_depth: usize, events: Arc<ArrayQueue<Event>>) -> io::Result<Self> {
        let inner = Arc::new(PoolInner {
            jobs: ArrayQueue::new(queue_depth),
            events,
            in_flight: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
            counters: Counters::default(),
        });

        let mut handles = Vec::with_capacity(n);
        for worker_id in 0..n {
            let inner = Arc::clone(&inner);
            let handle = thread::Builder::new()
                .name(format!("uvb-pool-{}", worker_id))
                .spawn(move || worker_loop(inner))?;
            handles.push(handle);
        }
        kdebug!("loopback pool: {} workers", n);

        Ok(WorkPool { inner, handles })
    }

    /// Queue a job. Fails when the queue is full or the pool is shutting down.
    pub fn enqueue(&self, job: Job) -> Result<(), Job> {
        if self.inner.shutdown.load(Ordering::Relaxed) {
            return Err(job);
        }
        self.inner.in_flight.fetch_add(1, Ordering::AcqRel);
        self.inner.jobs.push(job).map_err(|job| {
            self.inner.in_flight.fetch_sub(1, Ordering::AcqRel);
            job
        })?;
        for handle in &self.handles {
            handle.thread().unpark();
        }
        Ok(())
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    pub fn workers(&self) -> usize {
        self.handles.len()
    }

    pub fn stats(&self) -> PoolStats {
        let c = &self.inner.counters;
        PoolStats {
            jobs: c.jobs.load(Ordering::Relaxed),
            acquires: c.acquires.load(Ordering::Relaxed),
            releases: c.releases.load(Ordering::Relaxed),
            registrations: c.registrations.load(Ordering::Relaxed),
            deregistrations: c.deregistrations.load(Ordering::Relaxed),
        }
    }
}

impl Drop for WorkPool {
    fn drop(&mut self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        for handle in self.handles.drain(..) {
            handle.thread().unpark();
            if handle.join().is_err() {
                kwarn!("loopback pool: worker panicked");
            }
        }
    }
}

fn worker_loop(inner: Arc<PoolInner>) {
    loop {
        if inner.shutdown.load(Ordering::Relaxed) {
            break;
        }

        match inner.jobs.pop() {
            Some(job) => {
                run_job(&inner, job);
                let mut event = Event::AfterWork {
                    req: job.req,
                    status: 0,
                    after: job.after,
                };
                // The loop thread drains this queue every iteration.
                while let Err(back) = inner.events.push(event) {
                    if inner.shutdown.load(Ordering::Relaxed) {
                        break;
                    }
                    event = back;
                    thread::yield_now();
                }
                inner.in_flight.fetch_sub(1, Ordering::AcqRel);
            }
            None => thread::park_timeout(Duration::from_millis(1)),
        }
    }
}

fn run_job(inner: &PoolInner, job: Job) {
    let before = tls::thread_stats();
    if let Some(work) = job.work {
        unsafe { work(job.req as *mut uv_work_t) };
    }
    let delta = tls::thread_stats().since(&before);

    let c = &inner.counters;
    c.jobs.fetch_add(1, Ordering::Relaxed);
    c.acquires.fetch_add(delta.acquires, Ordering::Relaxed);
    c.releases.fetch_add(delta.releases, Ordering::Relaxed);
    c.registrations.fetch_add(delta.registrations, Ordering::Relaxed);
    c.deregistrations.fetch_add(delta.deregistrations, Ordering::Relaxed);
}
