//! Fixed-size worker pool for off-audio-thread jobs.
//!
//! The hot path must never block on WAV encoding or event fan-out, so when
//! `use_workers` is enabled those jobs are pushed onto this pool instead.
//! Workers pull from a shared mpsc channel; a panicking job is caught and
//! logged, the worker keeps running.  `shutdown()` closes the channel and
//! joins every thread, and is safe to call twice.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::error::EngineError;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed pool of named worker threads over one shared job channel.
pub struct WorkerPool {
    /// `None` after shutdown; dropping the sender closes the channel.
    tx: Option<Sender<Job>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `threads` workers (clamped to at least 1).
    pub fn new(threads: usize) -> Self {
        let threads = threads.max(1);
        let (tx, rx) = mpsc::channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));

        let handles = (0..threads)
            .map(|i| {
                let rx = Arc::clone(&rx);
                std::thread::Builder::new()
                    .name(format!("denoise-worker-{i}"))
                    .spawn(move || worker_loop(i, rx))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self {
            tx: Some(tx),
            handles,
        }
    }

    /// Queue a job.  Fails only after shutdown.
    pub fn execute<F>(&self, job: F) -> Result<(), EngineError>
    where
        F: FnOnce() + Send + 'static,
    {
        let tx = self.tx.as_ref().ok_or_else(|| EngineError::Worker {
            reason: "pool is shut down".into(),
        })?;
        tx.send(Box::new(job)).map_err(|_| EngineError::Worker {
            reason: "all workers exited".into(),
        })
    }

    /// Number of worker threads.
    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// `true` until [`WorkerPool::shutdown`] runs.
    pub fn is_running(&self) -> bool {
        self.tx.is_some()
    }

    /// Close the channel, drain remaining jobs and join every worker.
    /// Idempotent.
    pub fn shutdown(&mut self) {
        if self.tx.take().is_none() {
            return;
        }
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                log::error!("worker thread exited by panic");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(index: usize, rx: Arc<Mutex<Receiver<Job>>>) {
    loop {
        // Hold the lock only while waiting, not while the job runs.
        let job = match rx.lock().unwrap().recv() {
            Ok(job) => job,
            Err(_) => break, // channel closed
        };
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            log::error!("worker {index}: job panicked, worker continues");
        }
    }
    log::debug!("worker {index} exiting");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
