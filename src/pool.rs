//! The thread pool: the barrier-synchronized fan-out at the heart of the
//! system. A single mutex/condvar pair implements a phase-counter
//! rendezvous — "begin phase P" and "phase P complete" — without per-task
//! allocation or a work queue.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use crate::error;
use crate::kernel::KernelRegistry;
use crate::node::OperatorNode;
use crate::payload::ComputePayload;

/// Scheduling priority hint recorded on the pool. Whether the host honors
/// it is opportunistic — the preference is recorded but no raw priority
/// syscall is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedPriority {
    Normal,
    High,
}

/// State protected by the pool mutex: phase, completion counter, the
/// active-worker width for the in-flight kickoff, and the interrupt flag.
struct PoolState {
    phase: u64,
    completed: usize,
    active_workers: usize,
    interrupt: bool,
}

/// A payload slot, one per allocated worker. Written under the pool mutex
/// at kickoff; read and cleared by its owning worker *without* the mutex
/// held, which is sound only because exactly one worker ever touches a
/// given slot between one kickoff and the barrier that follows it (the
/// mutex release at kickoff and re-acquisition in the worker's wait loop
/// supplies the happens-before edge).
struct PayloadSlot(UnsafeCell<ComputePayload>);

// SAFETY: see the discipline documented on `PayloadSlot` above.
unsafe impl Sync for PayloadSlot {}

impl PayloadSlot {
    fn new(thread_index: usize, thread_count: usize) -> Self {
        Self(UnsafeCell::new(ComputePayload::empty(thread_index, thread_count)))
    }

    /// # Safety
    /// Caller must hold the pool mutex (kickoff path) or be the single
    /// worker owning this slot for the current phase (execute path).
    #[allow(clippy::mut_from_ref)]
    unsafe fn get(&self) -> &mut ComputePayload {
        unsafe { &mut *self.0.get() }
    }
}

struct Shared {
    mutex: Mutex<PoolState>,
    condvar: Condvar,
    num_allocated_workers: usize,
    online_count: AtomicUsize,
    registry: Arc<KernelRegistry>,
    payloads: Vec<PayloadSlot>,
    /// Each worker's last-observed phase, exposed for the barrier's debug
    /// self-check and for test instrumentation verifying an inactive
    /// worker's phase did not advance.
    worker_phases: Vec<AtomicU64>,
    #[allow(dead_code)] // recorded, not applied — see `SchedPriority`.
    sched_prio: SchedPriority,
}

/// The allocated worker pool.
pub struct ThreadPool {
    shared: Arc<Shared>,
    handles: Vec<JoinHandle<()>>,
}

fn execute_and_signal(shared: &Shared, index: usize, active_workers: usize) {
    if index < active_workers {
        // SAFETY: slot `index` is exclusively owned by this call between
        // the kickoff that populated it and the completion signal below.
        let payload = unsafe { shared.payloads[index].get() };
        if payload.node.is_some() {
            shared.registry.dispatch(payload);
        }
        payload.node = None;
    }
    let mut state = shared
        .mutex
        .lock()
        .unwrap_or_else(|_| error::lock_poisoned("execute_and_signal"));
    state.completed += 1;
    if state.completed == shared.num_allocated_workers {
        shared.condvar.notify_all();
    }
}

fn worker_loop(shared: Arc<Shared>, index: usize) {
    shared.online_count.fetch_add(1, Ordering::SeqCst);
    let mut local_phase = 0u64;
    loop {
        let (new_phase, active) = {
            let mut state = shared
                .mutex
                .lock()
                .unwrap_or_else(|_| error::lock_poisoned("worker wait"));
            while !(state.interrupt || state.phase > local_phase) {
                state = shared
                    .condvar
                    .wait(state)
                    .unwrap_or_else(|_| error::lock_poisoned("worker wait"));
            }
            if state.interrupt {
                break;
            }
            (state.phase, state.active_workers)
        };
        local_phase = new_phase;
        shared.worker_phases[index].store(local_phase, Ordering::Relaxed);
        execute_and_signal(&shared, index, active);
    }
    shared.online_count.fetch_sub(1, Ordering::SeqCst);
}

impl ThreadPool {
    /// Allocate `num_workers` workers (worker 0 is the caller; this spawns
    /// `num_workers - 1` OS threads) and block until all spawned threads
    /// have reached their wait loop.
    pub fn create(num_workers: usize, registry: Arc<KernelRegistry>, sched_prio: SchedPriority) -> Self {
        assert!(num_workers > 0, "tensorcpu: thread pool needs at least 1 worker");
        let shared = Arc::new(Shared {
            mutex: Mutex::new(PoolState {
                phase: 0,
                completed: 0,
                active_workers: num_workers,
                interrupt: false,
            }),
            condvar: Condvar::new(),
            num_allocated_workers: num_workers,
            online_count: AtomicUsize::new(0),
            registry,
            payloads: (0..num_workers).map(|i| PayloadSlot::new(i, num_workers)).collect(),
            worker_phases: (0..num_workers).map(|_| AtomicU64::new(0)).collect(),
            sched_prio,
        });

        let mut handles = Vec::with_capacity(num_workers - 1);
        for index in 1..num_workers {
            let shared = shared.clone();
            let handle = thread::Builder::new()
                .name(format!("tensorcpu-worker-{index}"))
                .spawn(move || worker_loop(shared, index))
                .expect("tensorcpu: failed to spawn worker thread");
            handles.push(handle);
        }

        while shared.online_count.load(Ordering::SeqCst) != num_workers - 1 {
            thread::yield_now();
        }
        log::debug!("tensorcpu: thread pool created with {num_workers} workers online");

        Self { shared, handles }
    }

    pub fn num_allocated_workers(&self) -> usize {
        self.shared.num_allocated_workers
    }

    pub fn phase(&self) -> u64 {
        self.shared
            .mutex
            .lock()
            .unwrap_or_else(|_| error::lock_poisoned("phase"))
            .phase
    }

    /// Last phase worker `index` observed. Used by tests to confirm
    /// inactive workers stay parked.
    pub fn worker_phase(&self, index: usize) -> u64 {
        self.shared.worker_phases[index].load(Ordering::Relaxed)
    }

    /// Kick off `node` across `active_workers` threads, run worker 0
    /// inline on the calling thread, then block until every allocated
    /// worker has completed this phase.
    pub fn parallel_compute(&self, node: Arc<dyn OperatorNode>, active_workers: usize) {
        assert!(
            active_workers >= 1 && active_workers <= self.shared.num_allocated_workers,
            "tensorcpu: active_workers out of range"
        );
        let phase = {
            let mut state = self
                .shared
                .mutex
                .lock()
                .unwrap_or_else(|_| error::lock_poisoned("kickoff"));
            state.active_workers = active_workers;
            for slot in &self.shared.payloads {
                // SAFETY: kickoff holds the pool mutex.
                let payload = unsafe { slot.get() };
                payload.node = Some(node.clone());
                payload.thread_count = active_workers;
            }
            state.phase += 1;
            state.completed = 0;
            state.phase
        };
        self.shared.condvar.notify_all();

        self.shared.worker_phases[0].store(phase, Ordering::Relaxed);
        execute_and_signal(&self.shared, 0, active_workers);

        self.barrier(phase);
    }

    fn barrier(&self, expected_phase: u64) {
        let mut state = self
            .shared
            .mutex
            .lock()
            .unwrap_or_else(|_| error::lock_poisoned("barrier"));
        while state.completed != self.shared.num_allocated_workers {
            state = self
                .shared
                .condvar
                .wait(state)
                .unwrap_or_else(|_| error::lock_poisoned("barrier"));
        }
        #[cfg(debug_assertions)]
        {
            for i in 0..self.shared.num_allocated_workers {
                debug_assert_eq!(
                    self.shared.worker_phases[i].load(Ordering::Relaxed),
                    expected_phase,
                    "tensorcpu: worker {i} did not advance to phase {expected_phase}"
                );
            }
        }
        #[cfg(not(debug_assertions))]
        let _ = expected_phase;
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        {
            let mut state = self
                .shared
                .mutex
                .lock()
                .unwrap_or_else(|_| error::lock_poisoned("destroy"));
            state.interrupt = true;
            state.phase += 1;
        }
        self.shared.condvar.notify_all();
        while self.shared.online_count.load(Ordering::SeqCst) != 0 {
            thread::yield_now();
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        log::debug!("tensorcpu: thread pool destroyed");
    }
}
