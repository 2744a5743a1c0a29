//! Fixed pool of long-lived worker threads draining a bounded FIFO queue.
//!
//! The driver submits a batch and blocks on a condition variable until every
//! job of the batch has finished. Results come back in submission order. A
//! panic inside a job is re-raised on the driver once the batch completes.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, trace};
use parking_lot::{Condvar, Mutex};

type Handler<J, R> = Arc<dyn Fn(J) -> R + Send + Sync>;

struct State<J, R> {
    queue: VecDeque<(usize, J)>,
    results: Vec<Option<thread::Result<R>>>,
    outstanding: usize,
    shutdown: bool,
}

struct Shared<J, R> {
    state: Mutex<State<J, R>>,
    job_ready: Condvar,
    slot_free: Condvar,
    all_done: Condvar,
    capacity: usize,
}

pub struct WorkerPool<J, R> {
    shared: Arc<Shared<J, R>>,
    workers: Vec<JoinHandle<()>>,
    batch: Mutex<()>,
}

impl<J: Send + 'static, R: Send + 'static> WorkerPool<J, R> {
    pub fn new<F>(threads: usize, capacity: usize, handler: F) -> WorkerPool<J, R>
    where
        F: Fn(J) -> R + Send + Sync + 'static,
    {
        let handler: Handler<J, R> = Arc::new(handler);
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                queue: VecDeque::with_capacity(capacity),
                results: Vec::new(),
                outstanding: 0,
                shutdown: false,
            }),
            job_ready: Condvar::new(),
            slot_free: Condvar::new(),
            all_done: Condvar::new(),
            capacity: capacity.max(1),
        });
        let workers = (0..threads.max(1))
            .map(|id| {
                let shared = Arc::clone(&shared);
                let handler = Arc::clone(&handler);
                thread::Builder::new()
                    .name(format!("cfr-worker-{}", id))
                    .spawn(move || worker_loop(id, &shared, &handler))
                    .unwrap_or_else(|e| panic!("cannot spawn worker thread: {}", e))
            })
            .collect();
        debug!("worker pool: {} threads, queue capacity {}", threads.max(1), capacity.max(1));
        WorkerPool {
            shared,
            workers,
            batch: Mutex::new(()),
        }
    }

    pub fn num_threads(&self) -> usize {
        self.workers.len()
    }

    /// Runs every job and returns the results in submission order.
    pub fn run_batch(&self, jobs: Vec<J>) -> Vec<R> {
        let _driver = self.batch.lock();
        let n = jobs.len();
        let shared = &self.shared;
        let mut state = shared.state.lock();
        state.results = (0..n).map(|_| None).collect();
        state.outstanding = n;
        for (i, job) in jobs.into_iter().enumerate() {
            while state.queue.len() >= shared.capacity {
                shared.slot_free.wait(&mut state);
            }
            state.queue.push_back((i, job));
            shared.job_ready.notify_one();
        }
        while state.outstanding > 0 {
            shared.all_done.wait(&mut state);
        }
        let results = std::mem::take(&mut state.results);
        drop(state);

        let mut out = Vec::with_capacity(n);
        for r in results {
            match r {
                Some(Ok(r)) => out.push(r),
                Some(Err(payload)) => panic::resume_unwind(payload),
                None => panic!("worker pool lost a job result"),
            }
        }
        out
    }
}

fn worker_loop<J, R>(id: usize, shared: &Shared<J, R>, handler: &Handler<J, R>) {
    loop {
        let (slot, job) = {
            let mut state = shared.state.lock();
            loop {
                if let Some(item) = state.queue.pop_front() {
                    shared.slot_free.notify_one();
                    break item;
                }
                if state.shutdown {
                    trace!("worker {} exiting", id);
                    return;
                }
                shared.job_ready.wait(&mut state);
            }
        };
        trace!("worker {} took job {}", id, slot);
        let result = panic::catch_unwind(AssertUnwindSafe(|| handler(job)));
        let mut state = shared.state.lock();
        state.results[slot] = Some(result);
        state.outstanding -= 1;
        if state.outstanding == 0 {
            shared.all_done.notify_all();
        }
    }
}

impl<J, R> Drop for WorkerPool<J, R> {
    fn drop(&mut self) {
        self.shared.state.lock().shutdown = true;
        self.shared.job_ready.notify_all();
        for w in self.workers.drain(..) {
            let _ = w.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn results_keep_submission_order() {
        let pool = WorkerPool::new(4, 2, |x: u64| {
            thread::sleep(Duration::from_millis(x % 3));
            x * x
        });
        let out = pool.run_batch((0..50).collect());
        assert_eq!(out, (0..50u64).map(|x| x * x).collect::<Vec<_>>());
    }

    #[test]
    fn pool_is_reusable_across_batches() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let pool = WorkerPool::new(3, 1, move |_: ()| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        for _ in 0..5 {
            pool.run_batch(vec![(); 7]);
        }
        assert_eq!(count.load(Ordering::SeqCst), 35);
    }

    #[test]
    fn empty_batch_returns_immediately() {
        let pool: WorkerPool<u8, u8> = WorkerPool::new(2, 4, |x| x);
        assert!(pool.run_batch(Vec::new()).is_empty());
    }

    #[test]
    #[should_panic(expected = "bad job")]
    fn job_panic_reaches_driver() {
        let pool = WorkerPool::new(2, 4, |x: u32| {
            if x == 3 {
                panic!("bad job");
            }
            x
        });
        pool.run_batch((0..6).collect());
    }

    #[test]
    fn pool_recovers_after_a_panicking_batch() {
        let pool = WorkerPool::new(2, 2, |x: u32| {
            if x == 1 {
                panic!("bad job");
            }
            x + 1
        });
        let failed = panic::catch_unwind(AssertUnwindSafe(|| pool.run_batch(vec![0, 1, 2])));
        assert!(failed.is_err());
        assert_eq!(pool.run_batch(vec![2, 3, 4]), vec![3, 4, 5]);
    }
}
