//! Task executor seam for chunk fetchers.
//!
//! Fetch jobs are fire-and-forget closures. `WorkerPool` runs them on a
//! fixed set of OS threads; `InlineExecutor` runs them on the submitting
//! thread, which keeps tests deterministic.

mod pool;

pub use pool::WorkerPool;

/// A unit of work submitted by the dispatcher.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

pub trait Executor: Send + Sync {
    /// Schedule `job`; never blocks on the job itself.
    fn execute(&self, job: Job);

    /// Block until every job submitted so far has finished.
    fn wait_idle(&self);
}

/// Runs each job to completion inside `execute`.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute(&self, job: Job) {
        job();
    }

    fn wait_idle(&self) {}
}
