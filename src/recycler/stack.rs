//! Per-owner-thread pool state: a local LIFO plus the foreign-thread
//! handoff queues that return values recycled from elsewhere.
//!
//! Netty's `Recycler.Stack` links handoff items through hand-rolled,
//! fixed-size `Link` chunks connected by a singly-linked list, each
//! published with a release-ordered write index. corvid reaches for
//! [`crossbeam_queue::ArrayQueue`] instead — the same bounded, multi-producer
//! lock-free structure that design is itself building
//! towards — rather than hand-rolling the chunk list; see `DESIGN.md` for
//! the trade-off. Each new foreign queue still reserves its capacity from a
//! shared, per-owner-stack counter, and the
//! recycle-ratio throttle still applies during transfer into the local
//! stack.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::thread::ThreadId;

use crossbeam_queue::ArrayQueue;

#[derive(Clone, Copy, Debug)]
pub(crate) struct RecyclerConfig {
    pub max_capacity_per_thread: usize,
    pub max_shared_capacity_factor: usize,
    pub ratio: u32,
    pub link_capacity: usize,
}

impl Default for RecyclerConfig {
    fn default() -> RecyclerConfig {
        RecyclerConfig {
            max_capacity_per_thread: 4096,
            max_shared_capacity_factor: 2,
            ratio: 8,
            link_capacity: 16,
        }
    }
}

pub(crate) struct StackInner<T> {
    owner: ThreadId,
    local: Mutex<Vec<T>>,
    queues_by_thread: Mutex<HashMap<ThreadId, std::sync::Arc<ArrayQueue<T>>>>,
    queues_in_order: Mutex<Vec<std::sync::Arc<ArrayQueue<T>>>>,
    shared_capacity: AtomicI64,
    config: RecyclerConfig,
    transfer_count: AtomicI64,
}

impl<T> StackInner<T> {
    pub(crate) fn new(config: RecyclerConfig) -> StackInner<T> {
        let max_shared = (config.max_capacity_per_thread / config.max_shared_capacity_factor.max(1))
            .max(config.link_capacity) as i64;
        StackInner {
            owner: std::thread::current().id(),
            local: Mutex::new(Vec::new()),
            queues_by_thread: Mutex::new(HashMap::new()),
            queues_in_order: Mutex::new(Vec::new()),
            shared_capacity: AtomicI64::new(max_shared),
            config,
            transfer_count: AtomicI64::new(0),
        }
    }

    pub(crate) fn acquire(&self, factory: &(dyn Fn() -> T + Send + Sync)) -> T {
        if let Some(value) = self.local.lock().unwrap().pop() {
            return value;
        }
        if let Some(value) = self.transfer_from_foreign_queues() {
            return value;
        }
        factory()
    }

    /// Pushes `value` back to the pool. Called by [`super::handle::Handle::recycle`];
    /// routes to the local stack on the owner thread, or this thread's
    /// handoff queue for this stack otherwise.
    pub(crate) fn recycle(&self, value: T) {
        if std::thread::current().id() == self.owner {
            let mut local = self.local.lock().unwrap();
            if local.len() < self.config.max_capacity_per_thread {
                local.push(value);
            }
            // else: pool is at capacity, drop the value.
            return;
        }

        let queue = self.foreign_queue_for_current_thread();
        match queue {
            Some(queue) => {
                let _ = queue.push(value);
                // A full queue silently drops `value` (ArrayQueue::push
                // returns it back on `Err`), matching "if no room, the
                // handle is dropped".
            }
            None => {
                // No shared capacity left to open a new handoff queue.
            }
        }
    }

    fn foreign_queue_for_current_thread(&self) -> Option<std::sync::Arc<ArrayQueue<T>>> {
        let tid = std::thread::current().id();
        if let Some(queue) = self.queues_by_thread.lock().unwrap().get(&tid) {
            return Some(queue.clone());
        }

        let reserved = self
            .shared_capacity
            .fetch_sub(self.config.link_capacity as i64, Ordering::AcqRel);
        if reserved < self.config.link_capacity as i64 {
            self.shared_capacity
                .fetch_add(self.config.link_capacity as i64, Ordering::AcqRel);
            return None;
        }

        let queue = std::sync::Arc::new(ArrayQueue::new(self.config.link_capacity));
        self.queues_by_thread.lock().unwrap().insert(tid, queue.clone());
        self.queues_in_order.lock().unwrap().push(queue.clone());
        Some(queue)
    }

    /// Drains queued foreign returns into the local stack, applying the
    /// recycle-ratio throttle (keep one in every `ratio`), and pops one
    /// value to satisfy the triggering `acquire`.
    fn transfer_from_foreign_queues(&self) -> Option<T> {
        let queues = self.queues_in_order.lock().unwrap().clone();
        if queues.is_empty() {
            return None;
        }

        let mut local = self.local.lock().unwrap();
        'queues: for queue in &queues {
            if local.len() >= self.config.max_capacity_per_thread {
                break 'queues;
            }
            while let Some(value) = queue.pop() {
                let count = self.transfer_count.fetch_add(1, Ordering::Relaxed);
                if self.config.ratio <= 1 || count % self.config.ratio as i64 == 0 {
                    local.push(value);
                }
                if local.len() >= self.config.max_capacity_per_thread {
                    break 'queues;
                }
            }
        }
        local.pop()
    }
}
