//! A fixed pool of event loops with round-robin selection.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::CoreError;
use crate::event_loop::{EventLoop, EventLoopConfig};
use crate::promise::{ImmediateExecutor, Promise};

/// `N` single-threaded [`EventLoop`]s, handed out round-robin. Once a
/// channel is registered to a loop it is pinned there for its lifetime;
/// this is not a work-stealing runtime.
#[derive(Clone)]
pub struct EventLoopGroup {
    loops: Arc<Vec<EventLoop>>,
    next: Arc<AtomicUsize>,
}

impl std::fmt::Debug for EventLoopGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoopGroup")
            .field("size", &self.loops.len())
            .finish()
    }
}

impl EventLoopGroup {
    /// Builds a group of `size` loops, each configured from `config`. Use
    /// [`EventLoopGroup::with_default_size`] for the conventional
    /// `max(1, 2 * cpu_count)` sizing.
    pub fn new(size: usize, config: EventLoopConfig) -> std::io::Result<EventLoopGroup> {
        let size = size.max(1);
        let mut loops = Vec::with_capacity(size);
        for _ in 0..size {
            loops.push(EventLoop::new(config)?);
        }
        Ok(EventLoopGroup {
            loops: Arc::new(loops),
            next: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn with_default_size() -> std::io::Result<EventLoopGroup> {
        let cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        EventLoopGroup::new((2 * cpus).max(1), EventLoopConfig::default())
    }

    pub fn size(&self) -> usize {
        self.loops.len()
    }

    /// Returns the next loop in round-robin order. Uses a cheap
    /// power-of-two mask when `size()` is a power of two, otherwise modulo.
    pub fn next(&self) -> EventLoop {
        let i = self.next.fetch_add(1, Ordering::Relaxed);
        let len = self.loops.len();
        let idx = if len.is_power_of_two() {
            i & (len - 1)
        } else {
            i % len
        };
        self.loops[idx].clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventLoop> {
        self.loops.iter()
    }

    /// Fans `shutdown_gracefully` out to every loop and returns a future
    /// that completes once all of them have terminated.
    pub fn shutdown_gracefully(&self, quiet: Duration, timeout: Duration) -> Promise<(), Arc<CoreError>> {
        let aggregate = Promise::new(Arc::new(ImmediateExecutor));
        let remaining = Arc::new(AtomicUsize::new(self.loops.len()));

        if self.loops.is_empty() {
            let _ = aggregate.set_success(());
            return aggregate;
        }

        for event_loop in self.loops.iter() {
            let per_loop = event_loop.shutdown_gracefully(quiet, timeout);
            let aggregate = aggregate.clone();
            let remaining = remaining.clone();
            per_loop.add_listener(move |_result| {
                if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    let _ = aggregate.set_success(());
                }
            });
        }
        aggregate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn round_robin_cycles_through_every_loop() {
        let group = EventLoopGroup::new(4, EventLoopConfig::default()).unwrap();
        let ids: Vec<_> = (0..8).map(|_| group.next().id()).collect();
        assert_eq!(&ids[0..4], &ids[4..8]);
        group
            .shutdown_gracefully(Duration::from_millis(1), Duration::from_secs(1))
            .sync(Some(Duration::from_secs(5)))
            .unwrap();
    }

    #[test]
    fn group_shutdown_completes_when_all_loops_terminate() {
        let group = EventLoopGroup::new(2, EventLoopConfig::default()).unwrap();
        group
            .shutdown_gracefully(Duration::from_millis(1), Duration::from_secs(1))
            .sync(Some(Duration::from_secs(5)))
            .unwrap();
    }
}
