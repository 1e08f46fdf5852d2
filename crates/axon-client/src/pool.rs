//! `ProbePool`: a fixed set of worker threads fed by a bounded job queue.
//! The channel bound *is* the admission semaphore: `submit` blocks once
//! every worker is already busy, producing the backpressure the dispatch
//! task relies on.
//!
//! Built on `std::thread::Builder`-spawned worker loops, one thread per
//! pool slot, all sharing a single job queue rather than each owning an
//! independent backend.

use crossbeam_channel::{bounded, Sender};

/// Default number of probes allowed in flight at once.
pub const DEFAULT_POOL_SIZE: usize = 10;

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct ProbePool {
    job_tx: Sender<Job>,
    workers: Vec<std::thread::JoinHandle<()>>,
}

impl ProbePool {
    /// `size` workers, fed by a rendezvous (zero-capacity) channel: a
    /// `submit` only returns once a worker has actually picked up the job,
    /// so at most `size` jobs are ever running concurrently.
    pub fn new(size: usize) -> Self {
        let (job_tx, job_rx) = bounded::<Job>(0);

        let workers = (0..size)
            .map(|id| {
                let job_rx = job_rx.clone();
                std::thread::Builder::new()
                    .name(format!("axon-probe-{id}"))
                    .spawn(move || {
                        while let Ok(job) = job_rx.recv() {
                            job();
                        }
                    })
                    .expect("failed to spawn probe pool worker")
            })
            .collect();

        Self { job_tx, workers }
    }

    /// Submit a job, blocking until a worker is free to take it.
    pub fn submit<F: FnOnce() + Send + 'static>(&self, job: F) {
        let _ = self.job_tx.send(Box::new(job));
    }

    /// Close the job queue and wait for every worker to finish its current
    /// job and exit.
    pub fn shutdown_wait(self) {
        drop(self.job_tx);
        for worker in self.workers {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn submitted_jobs_all_run() {
        let pool = ProbePool::new(4);
        let completed = Arc::new(AtomicUsize::new(0));

        for _ in 0..20 {
            let completed = Arc::clone(&completed);
            pool.submit(move || {
                completed.fetch_add(1, Ordering::SeqCst);
            });
        }

        pool.shutdown_wait();
        assert_eq!(completed.load(Ordering::SeqCst), 20);
    }
}
