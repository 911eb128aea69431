//! Elastic, bounded-concurrency execution of submitted work items.
//!
//! A [`Dispatcher`] owns two channels:
//!
//! - a rendezvous hand-off channel on which idle workers block waiting for
//!   their next item, and
//! - a bounded slot channel of capacity `capacity`; sending a token claims a
//!   worker slot, receiving one releases it.
//!
//! [`Dispatcher::submit`] selects over "hand off to an idle worker" and "claim
//! a slot and spawn a worker". When neither is ready the caller blocks, which
//! is how submitters are throttled once every worker is busy. Workers exit
//! after sitting idle for the configured timeout, releasing their slot.

use core::time::Duration;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, RecvTimeoutError, Select, Sender};

#[cfg(feature = "tracing")]
use tracing::instrument;

use super::pending::Pending;
use crate::{Error, Result};

/// How long a worker waits for its next item before exiting.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(500);

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Sizing for a [`Dispatcher`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Maximum number of concurrently live workers. Zero is treated as one.
    pub capacity: usize,
    /// Idle period after which a worker exits and frees its slot.
    pub idle_timeout: Duration,
}

impl Default for DispatcherConfig {
    /// One worker per available core, reaped after [`DEFAULT_IDLE_TIMEOUT`].
    fn default() -> Self {
        let capacity = thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(4);
        Self {
            capacity,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// Runs submitted closures on at most `capacity` worker threads.
///
/// Workers are spawned on demand and reaped when idle, so a burst of
/// submissions amortizes thread start-up while a quiet dispatcher holds no
/// threads at all. Items handed to the same worker run in the order they were
/// handed over; there is no ordering across workers.
///
/// A work item that panics is caught, counted in [`Dispatcher::panicked`] and
/// still counts as completed. Error handling and retries belong inside the
/// closure.
///
/// # Example
/// ```
/// use podsim::Dispatcher;
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// let dispatcher = Dispatcher::new(4);
/// let done = Arc::new(AtomicUsize::new(0));
///
/// for _ in 0..16 {
///     let done = Arc::clone(&done);
///     dispatcher
///         .submit(move || {
///             done.fetch_add(1, Ordering::Relaxed);
///         })
///         .unwrap();
/// }
///
/// dispatcher.wait();
/// assert_eq!(done.load(Ordering::Relaxed), 16);
/// ```
pub struct Dispatcher {
    config: DispatcherConfig,
    handoff_tx: Sender<Task>,
    handoff_rx: Receiver<Task>,
    slots_tx: Sender<()>,
    slots_rx: Receiver<()>,
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    pending: Pending,
    panicked: AtomicUsize,
    next_worker_id: AtomicUsize,
}

impl Shared {
    fn execute(&self, _worker_id: usize, task: Task) {
        if let Err(_payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
            self.panicked.fetch_add(1, Ordering::Relaxed);
            #[cfg(feature = "tracing")]
            tracing::error!(
                worker = _worker_id,
                "work item panicked: {}",
                panic_message(&*_payload)
            );
        }
        self.pending.done();
    }
}

/// Releases a worker slot when dropped, including when the worker thread
/// never got to run.
struct Slot(Receiver<()>);

impl Drop for Slot {
    fn drop(&mut self) {
        let _ = self.0.try_recv();
    }
}

impl Dispatcher {
    /// Creates a dispatcher running at most `capacity` workers with the
    /// default idle timeout.
    pub fn new(capacity: usize) -> Self {
        Self::with_config(DispatcherConfig {
            capacity,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        })
    }

    pub fn with_config(config: DispatcherConfig) -> Self {
        let config = DispatcherConfig {
            capacity: config.capacity.max(1),
            ..config
        };
        let (handoff_tx, handoff_rx) = crossbeam_channel::bounded(0);
        let (slots_tx, slots_rx) = crossbeam_channel::bounded(config.capacity);

        Self {
            config,
            handoff_tx,
            handoff_rx,
            slots_tx,
            slots_rx,
            shared: Arc::default(),
        }
    }

    /// Submits one work item.
    ///
    /// The item goes to whichever becomes available first: an idle worker, or
    /// a free slot for a new worker. If both are taken this call blocks until
    /// one frees up.
    ///
    /// # Errors
    /// Returns [`Error::Dispatch`] if a worker thread could not be spawned. The
    /// item is dropped without running and does not count as pending.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip_all))]
    pub fn submit<F>(&self, work: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let task: Task = Box::new(work);
        self.shared.pending.add();

        let mut select = Select::new();
        let handoff = select.send(&self.handoff_tx);
        let spawn = select.send(&self.slots_tx);

        let oper = select.select();
        let index = oper.index();

        if index == handoff {
            // Both channel ends live in `self`, so the channel is never
            // disconnected here.
            if oper.send(&self.handoff_tx, task).is_err() {
                self.shared.pending.done();
                return Err(Error::Dispatch {
                    reason: "hand-off channel closed".to_owned(),
                });
            }
            Ok(())
        } else {
            debug_assert_eq!(index, spawn);
            if oper.send(&self.slots_tx, ()).is_err() {
                self.shared.pending.done();
                return Err(Error::Dispatch {
                    reason: "slot channel closed".to_owned(),
                });
            }
            self.spawn_worker(task)
        }
    }

    /// Blocks until every item submitted so far has finished.
    pub fn wait(&self) {
        self.shared.pending.wait();
    }

    pub const fn capacity(&self) -> usize {
        self.config.capacity
    }

    pub const fn idle_timeout(&self) -> Duration {
        self.config.idle_timeout
    }

    /// Number of submitted items that have not finished yet.
    pub fn pending(&self) -> usize {
        self.shared.pending.get()
    }

    /// Number of workers currently holding a slot.
    pub fn live_workers(&self) -> usize {
        self.slots_tx.len()
    }

    /// Number of work items that panicked.
    pub fn panicked(&self) -> usize {
        self.shared.panicked.load(Ordering::Relaxed)
    }

    /// Starts a worker holding an already claimed slot, with `first` as its
    /// initial item.
    fn spawn_worker(&self, first: Task) -> Result<()> {
        let worker_id = self.shared.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let slot = Slot(self.slots_rx.clone());
        let handoff = self.handoff_rx.clone();
        let shared = Arc::clone(&self.shared);
        let idle_timeout = self.config.idle_timeout;

        let spawned = thread::Builder::new()
            .name(format!("podsim-worker-{worker_id}"))
            .spawn(move || worker_loop(worker_id, first, &handoff, &shared, idle_timeout, slot));

        // On failure the closure, and with it the slot, has already been
        // dropped.
        if let Err(e) = spawned {
            self.shared.pending.done();
            return Err(Error::Dispatch {
                reason: format!("spawn worker {worker_id}: {e}"),
            });
        }
        Ok(())
    }
}

fn worker_loop(
    worker_id: usize,
    first: Task,
    handoff: &Receiver<Task>,
    shared: &Shared,
    idle_timeout: Duration,
    slot: Slot,
) {
    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} started");

    shared.execute(worker_id, first);
    loop {
        match handoff.recv_timeout(idle_timeout) {
            Ok(task) => shared.execute(worker_id, task),
            Err(RecvTimeoutError::Timeout) => {
                #[cfg(feature = "tracing")]
                tracing::trace!("Worker {worker_id} idle, exiting");
                break;
            }
            Err(RecvTimeoutError::Disconnected) => {
                #[cfg(feature = "tracing")]
                tracing::trace!("Worker {worker_id} dispatcher dropped, exiting");
                break;
            }
        }
    }

    drop(slot);
}

#[cfg(feature = "tracing")]
fn panic_message(payload: &(dyn core::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}
