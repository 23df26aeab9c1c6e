//! Fixed-size worker pool draining a shared job channel.

use crossbeam::channel::Receiver;

/// A pool of N workers consuming jobs from a single channel until it is
/// closed. There is no per-job error channel; the worker function handles
/// its own failures.
pub struct WorkerPool {
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run the pool against the given job stream. Returns only after every
    /// worker has observed the channel close and finished its last job.
    pub fn run<T, F>(&self, jobs: Receiver<T>, work: F)
    where
        T: Send,
        F: Fn(T) + Sync,
    {
        std::thread::scope(|scope| {
            for _ in 0..self.workers {
                let jobs = jobs.clone();
                let work = &work;
                scope.spawn(move || {
                    for job in jobs.iter() {
                        work(job);
                    }
                });
            }
        });
    }
}
