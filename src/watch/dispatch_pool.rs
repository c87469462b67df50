//! Listener dispatch pool
//!
//! Runs subscriber callbacks off the session event stream so that a slow or
//! blocking listener never stalls demultiplexing of later raw events.
//!
//! ```text
//! WatchEngine::dispatch(affinity_key, listener, event)
//!        │ hash(affinity_key) % workers
//!        ▼
//! ┌──────────────┐   ┌──────────────┐
//! │ worker 0     │   │ worker 1     │  (OS threads, crossbeam queues)
//! │ FIFO of jobs │   │ FIFO of jobs │
//! └──────────────┘   └──────────────┘
//! ```
//!
//! Events sharing an affinity key (the subscribed path) always reach the same
//! worker and therefore run in submission order. No ordering holds across keys.

use std::collections::hash_map::DefaultHasher;
use std::hash::Hash;
use std::hash::Hasher;
use std::panic::catch_unwind;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::bounded;
use crossbeam_channel::unbounded;
use crossbeam_channel::Receiver;
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::debug;
use tracing::error;
use tracing::trace;

use super::Listener;
use super::WatchEvent;
use crate::metrics::WATCH_EVENTS_DISPATCHED;

struct Job {
    listener: Arc<dyn Listener>,
    event: WatchEvent,
}

struct Worker {
    jobs: Sender<Job>,
    shutdown_tx: Mutex<Option<Sender<()>>>,
    thread_handle: Mutex<Option<JoinHandle<()>>>,
}

/// Fixed-size pool of callback workers with per-key affinity
pub struct ListenerPool {
    workers: Vec<Worker>,
}

impl std::fmt::Debug for ListenerPool {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ListenerPool").field("workers", &self.workers.len()).finish()
    }
}

impl ListenerPool {
    /// Spawn `size` worker threads (at least one).
    pub fn new(size: usize) -> Self {
        let workers = (0..size.max(1)).map(Self::spawn_worker).collect();
        Self { workers }
    }

    fn spawn_worker(index: usize) -> Worker {
        let (jobs_tx, jobs_rx) = unbounded::<Job>();
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);

        let handle = std::thread::Builder::new()
            .name(format!("listener-pool-{index}"))
            .spawn(move || Self::run_worker(index, jobs_rx, shutdown_rx));

        let thread_handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!(worker = index, "Listener worker thread could not be spawned: {:?}", e);
                None
            }
        };

        Worker {
            jobs: jobs_tx,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            thread_handle: Mutex::new(thread_handle),
        }
    }

    fn run_worker(
        index: usize,
        jobs: Receiver<Job>,
        shutdown_rx: Receiver<()>,
    ) {
        debug!(worker = index, "Listener worker started");

        loop {
            crossbeam_channel::select! {
                recv(jobs) -> result => {
                    match result {
                        Ok(job) => Self::invoke(index, job),
                        Err(_) => break,
                    }
                }
                recv(shutdown_rx) -> _ => {
                    debug!(worker = index, "Listener worker received shutdown signal");
                    break;
                }
            }
        }

        debug!(worker = index, "Listener worker stopped");
    }

    fn invoke(
        index: usize,
        job: Job,
    ) {
        let Job { listener, event } = job;
        trace!(worker = index, path = %event.path, kind = ?event.kind, "Invoking listener");

        if catch_unwind(AssertUnwindSafe(|| listener.on_event(&event))).is_err() {
            error!(
                worker = index,
                path = %event.path,
                kind = ?event.kind,
                "Listener panicked while handling event"
            );
        }
    }

    /// Queue `event` for `listener` on the worker owning `affinity_key`.
    pub fn submit(
        &self,
        affinity_key: &str,
        listener: Arc<dyn Listener>,
        event: WatchEvent,
    ) {
        let worker = &self.workers[self.worker_index(affinity_key)];
        WATCH_EVENTS_DISPATCHED.with_label_values(&[event.kind.as_str()]).inc();

        if let Err(e) = worker.jobs.send(Job { listener, event }) {
            debug!(
                path = %e.0.event.path,
                "Listener pool stopped, event dropped"
            );
        }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    pub(crate) fn worker_index(
        &self,
        affinity_key: &str,
    ) -> usize {
        let mut hasher = DefaultHasher::new();
        affinity_key.hash(&mut hasher);
        (hasher.finish() % self.workers.len() as u64) as usize
    }

    /// Signal every worker to exit and join them.
    ///
    /// Idempotent. A worker calling `stop` on its own pool is not joined.
    pub fn stop(&self) {
        for worker in &self.workers {
            if let Some(tx) = worker.shutdown_tx.lock().take() {
                let _ = tx.send(());
            }
        }

        let current = std::thread::current().id();
        for worker in &self.workers {
            if let Some(handle) = worker.thread_handle.lock().take() {
                if handle.thread().id() == current {
                    continue;
                }
                let _ = handle.join();
            }
        }
    }
}

impl Drop for ListenerPool {
    fn drop(&mut self) {
        self.stop();
    }
}
