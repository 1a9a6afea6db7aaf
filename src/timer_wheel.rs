//! The event loop's scheduled-task heap: a min-heap keyed by absolute
//! deadline, touched only from the owning loop thread.
//!
//! Despite the name, this is a binary heap rather than an actual wheel:
//! a loop typically has at most a few hundred live
//! timeouts (connect deadlines, user-scheduled tasks), far below the
//! count at which a wheel's O(1) insert starts to matter over a heap's
//! O(log n), and a heap needs no bucket-width tuning.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::task_queue::Task;

static NEXT_SEQ: AtomicU64 = AtomicU64::new(0);

/// A handle to a scheduled task, returned by [`TimerWheel::schedule`].
/// Dropping it does not cancel the task; call [`ScheduledHandle::cancel`]
/// explicitly.
#[derive(Clone)]
pub struct ScheduledHandle {
    cancelled: Arc<AtomicBool>,
}

impl ScheduledHandle {
    /// Marks the task cancelled. A running task is not interrupted; this
    /// only prevents a not-yet-dequeued task from running.
    pub fn cancel(&self) {
        self.cancelled.store(true, AtomicOrdering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(AtomicOrdering::Relaxed)
    }
}

struct Entry {
    deadline: Instant,
    seq: u64,
    cancelled: Arc<AtomicBool>,
    task: Task,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}
impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so `BinaryHeap` (a max-heap) pops the earliest deadline.
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// A min-heap of pending scheduled tasks keyed by absolute deadline.
#[derive(Default)]
pub struct TimerWheel {
    heap: BinaryHeap<Entry>,
}

impl TimerWheel {
    pub fn new() -> TimerWheel {
        TimerWheel { heap: BinaryHeap::new() }
    }

    /// Schedules `task` to run no earlier than `delay` from now.
    pub fn schedule(&mut self, delay: Duration, task: Task) -> ScheduledHandle {
        self.schedule_at(Instant::now() + delay, task)
    }

    pub fn schedule_at(&mut self, deadline: Instant, task: Task) -> ScheduledHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let handle = ScheduledHandle { cancelled: cancelled.clone() };
        self.heap.push(Entry {
            deadline,
            seq: NEXT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            cancelled,
            task,
        });
        handle
    }

    /// Pops and returns every task whose deadline has passed, in deadline
    /// order, skipping (but discarding) cancelled ones.
    pub fn drain_ready(&mut self, now: Instant) -> Vec<Task> {
        let mut ready = Vec::new();
        while let Some(top) = self.heap.peek() {
            if top.deadline > now {
                break;
            }
            let entry = self.heap.pop().unwrap();
            if !entry.cancelled.load(AtomicOrdering::Relaxed) {
                ready.push(entry.task);
            }
        }
        ready
    }

    /// The earliest live deadline, or `None` if the heap is empty. Cancelled
    /// entries at the top are skipped (and discarded) so a cancelled timer
    /// doesn't hold the reactor's wait deadline down unnecessarily.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(top) = self.heap.peek() {
            if top.cancelled.load(AtomicOrdering::Relaxed) {
                self.heap.pop();
                continue;
            }
            return Some(top.deadline);
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn drains_in_deadline_order() {
        let mut wheel = TimerWheel::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let now = Instant::now();

        for (i, ms) in [30u64, 10, 20].into_iter().enumerate() {
            let order = order.clone();
            wheel.schedule_at(now + Duration::from_millis(ms), Box::new(move || order.lock().unwrap().push(i)));
        }

        for task in wheel.drain_ready(now + Duration::from_millis(100)) {
            task();
        }
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 0]);
    }

    #[test]
    fn cancelled_task_is_skipped() {
        let mut wheel = TimerWheel::new();
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = ran.clone();
        let now = Instant::now();
        let handle = wheel.schedule_at(now, Box::new(move || ran2.store(true, AtomicOrdering::SeqCst)));
        handle.cancel();
        for task in wheel.drain_ready(now) {
            task();
        }
        assert!(!ran.load(AtomicOrdering::SeqCst));
    }
}
