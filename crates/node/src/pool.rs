//! Bounded worker pool for proof-of-work execution.
//!
//! The pool owns `pool_size` OS threads blocking on a shared FIFO queue.
//! Proof-of-work is CPU-bound, so workers are real threads rather than async
//! tasks; they signal round completion back into async land through a
//! single-shot latch built on [`tokio::sync::Notify`], whose fire side is
//! callable from plain threads.

use crate::miner::Miner;
use crate::stats::TaskStatistics;
use parking_lot::{Condvar, Mutex};
use ringmine_metrics::pool::{
    POOL_QUEUE_DEPTH, POOL_TASKS_EXECUTED, POOL_TASK_SECONDS, POOL_WORKERS,
};
use ringmine_types::Task;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Notify;
use tracing::{debug, trace, warn};

/// Smallest allowed pool.
pub const MIN_POOL_SIZE: usize = 2;
/// Largest allowed pool.
pub const MAX_POOL_SIZE: usize = 16;

/// Thread-safe FIFO of tasks awaiting execution.
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    tasks: Mutex<VecDeque<Task>>,
    available: Condvar,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(QueueInner {
                tasks: Mutex::new(VecDeque::new()),
                available: Condvar::new(),
            }),
        }
    }

    /// Append tasks to the back of the queue and wake blocked workers.
    ///
    /// Callers guarantee no duplicates; the queue does not re-check identity.
    pub fn push_all(&self, tasks: impl IntoIterator<Item = Task>) {
        let mut queue = self.inner.tasks.lock();
        queue.extend(tasks);
        POOL_QUEUE_DEPTH.set(queue.len() as f64);
        drop(queue);
        self.inner.available.notify_all();
    }

    /// Block until a task is available and dequeue it.
    pub fn pop(&self) -> Task {
        let mut queue = self.inner.tasks.lock();
        loop {
            if let Some(task) = queue.pop_front() {
                POOL_QUEUE_DEPTH.set(queue.len() as f64);
                return task;
            }
            self.inner.available.wait(&mut queue);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.tasks.lock().is_empty()
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Single-shot round-completion signal.
///
/// Armed by the controller at the start of each round; the first worker to
/// drain the queue fires it, later observations are no-ops. Constructed
/// unarmed so a fire before the first round is absorbed.
pub struct RoundLatch {
    fired: AtomicBool,
    notify: Notify,
}

impl RoundLatch {
    pub fn new() -> Self {
        Self {
            fired: AtomicBool::new(true),
            notify: Notify::new(),
        }
    }

    /// Re-arm for a new round. Must happen before the round's tasks are
    /// enqueued, or a fast worker could fire the previous (spent) state.
    pub fn arm(&self) {
        self.fired.store(false, Ordering::Release);
    }

    /// Fire the latch. Returns true for the first caller since arming.
    pub fn try_fire(&self) -> bool {
        if !self.fired.swap(true, Ordering::AcqRel) {
            self.notify.notify_one();
            true
        } else {
            false
        }
    }

    /// Wait until the latch fires for the current round.
    pub async fn wait(&self) {
        loop {
            if self.fired.load(Ordering::Acquire) {
                return;
            }
            self.notify.notified().await;
        }
    }
}

impl Default for RoundLatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-size pool of proof-of-work worker threads.
pub struct WorkerPool {
    size: usize,
    queue: TaskQueue,
    latch: Arc<RoundLatch>,
    miner: Miner,
    stats: Arc<TaskStatistics>,
    started: AtomicBool,
}

impl WorkerPool {
    /// Create a pool. The size is clamped into `[MIN_POOL_SIZE, MAX_POOL_SIZE]`.
    pub fn new(size: usize, miner: Miner, stats: Arc<TaskStatistics>) -> Self {
        let clamped = size.clamp(MIN_POOL_SIZE, MAX_POOL_SIZE);
        if clamped != size {
            warn!(requested = size, using = clamped, "pool size out of range");
        }
        Self {
            size: clamped,
            queue: TaskQueue::new(),
            latch: Arc::new(RoundLatch::new()),
            miner,
            stats,
            started: AtomicBool::new(false),
        }
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn latch(&self) -> &Arc<RoundLatch> {
        &self.latch
    }

    /// Spawn the worker threads. Idempotent; only the first call spawns.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::AcqRel) {
            return;
        }
        POOL_WORKERS.set(self.size as f64);
        for worker_id in 0..self.size {
            let queue = self.queue.clone();
            let latch = Arc::clone(&self.latch);
            let miner = self.miner;
            let stats = Arc::clone(&self.stats);
            std::thread::Builder::new()
                .name(format!("pow-worker-{}", worker_id))
                .spawn(move || worker_loop(worker_id, queue, latch, miner, stats))
                .expect("worker thread can be spawned");
        }
        debug!(workers = self.size, "worker pool started");
    }
}

fn worker_loop(
    worker_id: usize,
    queue: TaskQueue,
    latch: Arc<RoundLatch>,
    miner: Miner,
    stats: Arc<TaskStatistics>,
) {
    loop {
        let task = queue.pop();
        let started = Instant::now();

        match miner.mine(&task) {
            Ok(solution) => {
                trace!(worker_id, %task, nonce = solution.nonce, "task mined");
            }
            Err(e) => {
                // deterministic computation, not a retry channel
                warn!(worker_id, %task, error = %e, "proof-of-work failed, counting as completed");
            }
        }

        stats.add_completed(1);
        POOL_TASKS_EXECUTED.inc();
        POOL_TASK_SECONDS.observe(started.elapsed().as_secs_f64());

        if queue.is_empty() && latch.try_fire() {
            debug!(worker_id, "queue drained, round complete");
        }
    }
}
