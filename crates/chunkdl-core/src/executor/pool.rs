//! Fixed-size pool of worker threads fed through an mpsc channel.

use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use super::{Executor, Job};

#[derive(Default)]
struct Pending {
    count: Mutex<usize>,
    idle: Condvar,
}

/// Decrements the pending count when a job finishes, even if it panicked.
struct PendingGuard<'a>(&'a Pending);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut n = self.0.count.lock().unwrap();
        *n = n.saturating_sub(1);
        if *n == 0 {
            self.0.idle.notify_all();
        }
    }
}

pub struct WorkerPool {
    tx: Mutex<Option<mpsc::Sender<Job>>>,
    pending: Arc<Pending>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `workers` threads (at least one).
    pub fn new(workers: usize) -> io::Result<Self> {
        let (tx, rx) = mpsc::channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));
        let pending = Arc::new(Pending::default());
        let handles = (0..workers.max(1))
            .map(|i| {
                let rx = Arc::clone(&rx);
                let pending = Arc::clone(&pending);
                std::thread::Builder::new()
                    .name(format!("chunkdl-fetch-{i}"))
                    .spawn(move || worker_loop(&rx, &pending))
            })
            .collect::<io::Result<Vec<_>>>()?;
        Ok(Self {
            tx: Mutex::new(Some(tx)),
            pending,
            handles,
        })
    }

    pub fn workers(&self) -> usize {
        self.handles.len()
    }
}

fn worker_loop(rx: &Mutex<mpsc::Receiver<Job>>, pending: &Pending) {
    loop {
        let job = match rx.lock().unwrap().recv() {
            Ok(job) => job,
            Err(_) => break,
        };
        let _guard = PendingGuard(pending);
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            tracing::error!("fetch job panicked");
        }
    }
}

impl Executor for WorkerPool {
    fn execute(&self, job: Job) {
        let tx = self.tx.lock().unwrap();
        let Some(tx) = tx.as_ref() else {
            tracing::warn!("worker pool is shut down; dropping job");
            return;
        };
        *self.pending.count.lock().unwrap() += 1;
        if tx.send(job).is_err() {
            // All workers are gone; undo the count so wait_idle cannot hang.
            drop(PendingGuard(&self.pending));
        }
    }

    fn wait_idle(&self) {
        let mut n = self.pending.count.lock().unwrap();
        while *n > 0 {
            n = self.pending.idle.wait(n).unwrap();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.tx.lock().unwrap().take();
        for h in self.handles.drain(..) {
            let _ = h.join();
        }
    }
}
