//! The event loop's task queue: a bounded MPSC ring buffer with a
//! reject-on-full policy.

use crossbeam_queue::ArrayQueue;

use crate::error::CoreError;

/// A boxed, one-shot unit of loop-local work.
pub type Task = Box<dyn FnOnce() + Send>;

/// Bounded multi-producer single-consumer queue of tasks awaiting the
/// owning event loop thread. Grounded on `crossbeam_queue::ArrayQueue`
/// (already depended on for the recycler's handoff queues) — a lock-free
/// bounded MPMC ring, reused here rather than hand-rolling one.
pub struct TaskQueue {
    queue: ArrayQueue<Task>,
}

impl TaskQueue {
    pub fn new(capacity: usize) -> TaskQueue {
        TaskQueue {
            queue: ArrayQueue::new(capacity),
        }
    }

    /// Enqueues `task`. Fails with [`CoreError::Registration`] if the queue
    /// is at capacity — corvid's reject policy is "fail fast", leaving
    /// retry/backoff decisions to the caller.
    pub fn push(&self, task: Task) -> Result<(), CoreError> {
        self.queue
            .push(task)
            .map_err(|_| CoreError::registration("task queue is full"))
    }

    /// Pops one task if available. Only the owning loop thread calls this.
    pub fn pop(&self) -> Option<Task> {
        self.queue.pop()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn fifo_per_producer() {
        let q = TaskQueue::new(4);
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            q.push(Box::new(move || order.lock().unwrap().push(i))).unwrap();
        }
        while let Some(task) = q.pop() {
            task();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn push_fails_when_full() {
        let q = TaskQueue::new(1);
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();
        q.push(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
        let c2 = counter.clone();
        assert!(q.push(Box::new(move || {
            c2.fetch_add(1, Ordering::SeqCst);
        }))
        .is_err());
    }
}
