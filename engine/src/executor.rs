//! Executors decide where a continuation runs.
//!
//! A [`Future`](crate::Future) never runs a chained step on the thread that
//! resolved it; it hands a [`Job`] to the executor given to
//! [`then`](crate::Future::then). The engine ships two executors:
//!
//! - [`ThreadPool`] - a fixed set of worker threads fed from one channel.
//! - [`InlineExecutor`] - runs jobs on the calling thread, trampolining
//!   nested spawns so long continuation chains do not grow the stack.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::thread;

use tracing::{debug, error, warn};

/// A unit of work handed to an executor.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Something that can run jobs.
pub trait Executor: Send + Sync + 'static {
    /// Schedule `job` to run exactly once.
    ///
    /// An executor that can no longer run jobs (for example because its
    /// owner has shut down) drops the job instead.
    fn spawn(&self, job: Job);
}

impl<E: Executor + ?Sized> Executor for Arc<E> {
    fn spawn(&self, job: Job) {
        (**self).spawn(job);
    }
}

/// Fixed-size pool of worker threads.
///
/// Cloning is cheap; all clones feed the same workers. Workers exit once the
/// last clone is dropped and the queue has drained.
#[derive(Debug, Clone)]
pub struct ThreadPool {
    sender: mpsc::Sender<Job>,
    size: usize,
}

impl ThreadPool {
    /// Start a pool with `size` workers.
    ///
    /// # Panics
    /// If `size` is zero.
    pub fn new(size: usize) -> Self {
        Self::with_name(size, "lodge-worker")
    }

    /// Start a pool whose threads are named `{name}-{index}`.
    pub fn with_name(size: usize, name: &str) -> Self {
        assert!(size > 0, "thread pool needs at least one worker");

        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        for id in 0..size {
            let receiver = Arc::clone(&receiver);
            let spawned = thread::Builder::new()
                .name(format!("{name}-{id}"))
                .spawn(move || worker_loop(id, receiver));
            if let Err(e) = spawned {
                warn!(worker = id, "failed to spawn worker thread: {e}");
            }
        }

        Self { sender, size }
    }

    /// Number of workers in the pool.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Run a closure on one of the workers.
    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.spawn(Box::new(f));
    }
}

impl Executor for ThreadPool {
    fn spawn(&self, job: Job) {
        if self.sender.send(job).is_err() {
            warn!("thread pool is shut down, dropping job");
        }
    }
}

fn worker_loop(id: usize, receiver: Arc<Mutex<mpsc::Receiver<Job>>>) {
    loop {
        let msg = receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .recv();
        match msg {
            Ok(job) => {
                if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                    error!(worker = id, "job panicked");
                }
            }
            Err(_) => {
                debug!(worker = id, "worker disconnected");
                break;
            }
        }
    }
}

thread_local! {
    static INLINE_QUEUE: RefCell<Option<VecDeque<Job>>> = const { RefCell::new(None) };
}

/// Runs jobs on the calling thread.
///
/// The outermost `spawn` on a thread drains a thread-local queue; jobs
/// spawned while that drain is running are appended to the queue instead of
/// being called recursively.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn spawn(&self, job: Job) {
        let nested = INLINE_QUEUE.with(|queue| {
            let mut queue = queue.borrow_mut();
            match queue.as_mut() {
                Some(pending) => {
                    pending.push_back(job);
                    None
                }
                None => {
                    *queue = Some(VecDeque::new());
                    Some(job)
                }
            }
        });

        let Some(first) = nested else {
            return;
        };

        // Clears the queue marker even if a job panics.
        struct Drain;
        impl Drop for Drain {
            fn drop(&mut self) {
                INLINE_QUEUE.with(|queue| queue.borrow_mut().take());
            }
        }
        let _drain = Drain;

        first();
        while let Some(job) = INLINE_QUEUE.with(|queue| {
            queue
                .borrow_mut()
                .as_mut()
                .and_then(|pending| pending.pop_front())
        }) {
            job();
        }
    }
}
