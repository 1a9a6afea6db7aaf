//! Public wakeup handle, letting a handler interrupt its own (or another)
//! blocked reactor from an arbitrary thread without routing through a task
//! queue. Mirrors `mio::Waker`.

use std::io;
use std::sync::Arc;

use crate::reactor::{Reactor, ReactorWaker};

/// A `Send + Sync` handle that wakes a blocked [`EventLoop`](crate::event_loop::EventLoop).
#[derive(Clone)]
pub struct Waker {
    inner: Arc<ReactorWaker>,
}

impl Waker {
    pub(crate) fn new(reactor: &Arc<Reactor>) -> io::Result<Waker> {
        Ok(Waker {
            inner: Arc::new(reactor.waker()?),
        })
    }

    /// Wakes the loop blocked on this waker's reactor. Safe to call from any
    /// thread, including the loop's own.
    pub fn wake(&self) -> io::Result<()> {
        self.inner.wake()
    }
}

impl std::fmt::Debug for Waker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waker").finish_non_exhaustive()
    }
}
