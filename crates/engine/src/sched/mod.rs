//! Bounded asynchronous work queue.
//!
//! A single producer (the main thread) writes jobs into a fixed ring of slots.
//! Worker threads sleep on a counting semaphore, claim the next slot with a
//! compare-and-swap on the read cursor, run the job and push its output onto
//! a completion list. The main thread drains that list once per frame with
//! [`AsyncScheduler::run_callbacks`], so every completion handler runs on the
//! thread that owns the world.

mod semaphore;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

use semaphore::Semaphore;

/// A unit of work executed on a worker thread.
pub trait Task: Send + 'static {
    type Output: Send + 'static;

    fn run(self) -> Self::Output;
}

/// The ring had no free slot. Carries the rejected task back to the caller.
#[derive(Error)]
#[error("work queue is full")]
pub struct QueueFull<T>(pub T);

impl<T> std::fmt::Debug for QueueFull<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("QueueFull(..)")
    }
}

struct Shared<T: Task> {
    slots: Box<[Mutex<Option<T>>]>,
    read: AtomicUsize,
    write: AtomicUsize,
    available: Semaphore,
    completed: Mutex<Vec<T::Output>>,
    completed_cond: Condvar,
}

impl<T: Task> Shared<T> {
    /// Claim the next queued task. The caller must hold a semaphore permit.
    fn claim(&self) -> Option<T> {
        let n = self.slots.len();
        loop {
            let r = self.read.load(Ordering::Acquire);
            if r == self.write.load(Ordering::Acquire) {
                return None;
            }
            if self
                .read
                .compare_exchange_weak(r, (r + 1) % n, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return self.slots[r].lock().take();
            }
        }
    }

    fn execute(&self, task: T) {
        let output = task.run();
        self.completed.lock().push(output);
        self.completed_cond.notify_all();
    }
}

pub struct AsyncScheduler<T: Task> {
    shared: Arc<Shared<T>>,
    workers: Vec<JoinHandle<()>>,
    /// Queued or running tasks whose output has not been drained yet.
    outstanding: usize,
}

impl<T: Task> AsyncScheduler<T> {
    /// Start `worker_count` threads over a ring of `capacity` slots. The ring
    /// holds at most `capacity - 1` jobs.
    ///
    /// With zero workers nothing runs until [`AsyncScheduler::run_one`] is
    /// called.
    pub fn new(capacity: usize, worker_count: usize) -> std::io::Result<Self> {
        assert!(capacity >= 2, "queue capacity must be at least 2");
        let shared = Arc::new(Shared {
            slots: (0..capacity).map(|_| Mutex::new(None)).collect(),
            read: AtomicUsize::new(0),
            write: AtomicUsize::new(0),
            available: Semaphore::new(),
            completed: Mutex::new(Vec::new()),
            completed_cond: Condvar::new(),
        });

        let mut workers = Vec::with_capacity(worker_count);
        for i in 0..worker_count {
            let shared = Arc::clone(&shared);
            let handle = std::thread::Builder::new()
                .name(format!("strata-worker-{i}"))
                .spawn(move || {
                    while shared.available.acquire() {
                        if let Some(task) = shared.claim() {
                            shared.execute(task);
                        }
                    }
                    tracing::trace!("worker {} exiting", i);
                })?;
            workers.push(handle);
        }
        tracing::debug!("scheduler started: {} slots, {} workers", capacity, worker_count);

        Ok(Self { shared, workers, outstanding: 0 })
    }

    pub fn capacity(&self) -> usize {
        self.shared.slots.len()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Queue a task without blocking. A full ring hands the task back.
    pub fn queue(&mut self, task: T) -> Result<(), QueueFull<T>> {
        let n = self.shared.slots.len();
        let w = self.shared.write.load(Ordering::Relaxed);
        let next = (w + 1) % n;
        if next == self.shared.read.load(Ordering::Acquire) {
            return Err(QueueFull(task));
        }
        {
            // A consumer that claimed this slot on a previous lap may not
            // have taken its task yet.
            let mut slot = self.shared.slots[w].lock();
            if slot.is_some() {
                return Err(QueueFull(task));
            }
            *slot = Some(task);
        }
        self.shared.write.store(next, Ordering::Release);
        self.outstanding += 1;
        self.shared.available.release();
        Ok(())
    }

    /// Run one queued task on the calling thread. Returns `false` if none was
    /// waiting.
    pub fn run_one(&self) -> bool {
        if !self.shared.available.try_acquire() {
            return false;
        }
        match self.shared.claim() {
            Some(task) => {
                self.shared.execute(task);
                true
            }
            None => false,
        }
    }

    /// Hand every finished output to `callback`, in completion order.
    /// Returns how many were delivered.
    pub fn run_callbacks(&mut self, mut callback: impl FnMut(T::Output)) -> usize {
        let done = std::mem::take(&mut *self.shared.completed.lock());
        let count = done.len();
        self.outstanding -= count;
        for output in done {
            callback(output);
        }
        count
    }

    /// Block until at least one output is ready or `timeout` passes.
    pub fn wait_for_completion(&self, timeout: Duration) -> bool {
        let mut done = self.shared.completed.lock();
        if done.is_empty() {
            self.shared.completed_cond.wait_for(&mut done, timeout);
        }
        !done.is_empty()
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub fn is_idle(&self) -> bool {
        self.outstanding == 0
    }
}

impl<T: Task> Drop for AsyncScheduler<T> {
    fn drop(&mut self) {
        self.shared.available.close();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::error!("worker thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Square(u64);

    impl Task for Square {
        type Output = u64;

        fn run(self) -> u64 {
            self.0 * self.0
        }
    }

    #[test]
    fn inline_run_preserves_fifo_order() {
        let mut sched = AsyncScheduler::new(4, 0).unwrap();
        for i in 1..=3 {
            sched.queue(Square(i)).unwrap();
        }
        while sched.run_one() {}
        let mut out = Vec::new();
        sched.run_callbacks(|v| out.push(v));
        assert_eq!(out, vec![1, 4, 9]);
        assert!(sched.is_idle());
    }

    #[test]
    fn full_queue_returns_task() {
        let mut sched = AsyncScheduler::new(3, 0).unwrap();
        sched.queue(Square(1)).unwrap();
        sched.queue(Square(2)).unwrap();
        let QueueFull(task) = sched.queue(Square(3)).unwrap_err();
        assert_eq!(task.0, 3);
        assert_eq!(sched.outstanding(), 2);
    }
}
