//! The per-event-loop reactor: owns exactly one kernel selector, dispatches
//! readiness to registered handles, and survives the occasional spurious
//! wakeup storm by rebuilding its kernel state from scratch.
//!
//! Grounded directly on `mio`'s `Poll`/`Registry` split (`src/poll.rs`) and
//! its per-platform `sys::unix::selector` backends: `Reactor` plays the role
//! of `Poll`, a [`Registration`] the role of a registered `Token`, and the
//! rebuild workaround mirrors mio's own selector-id generation guard, made
//! explicit here as actual kernel-state reconstruction rather than a single
//! debug assertion.

pub mod select_strategy;
mod sys;

use std::cell::RefCell;
use std::io;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Hands out a process-wide unique id to each [`Reactor`] so a
/// [`Registration`] can refuse to be used against a different reactor than
/// the one that created it — mio's own `SelectorId` guard (`src/poll.rs`),
/// made explicit rather than relying on generation-tagged raw fds.
static NEXT_REACTOR_ID: AtomicU64 = AtomicU64::new(0);

use slab::Slab;

use crate::error::{CoreError, CoreResult};
use crate::interest::Interest;
use crate::token::Token;

pub use select_strategy::{DefaultSelectStrategy, SelectDecision, SelectStrategy};

const REBUILD_THRESHOLD: usize = 512;

/// Readiness bits for one dispatched event, decoded from the backend's
/// native event representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadyOps {
    pub readable: bool,
    pub writable: bool,
    pub error: bool,
    pub read_closed: bool,
    pub write_closed: bool,
    pub priority: bool,
}

impl ReadyOps {
    fn from_native(event: &sys::Event) -> ReadyOps {
        ReadyOps {
            readable: sys::event::is_readable(event),
            writable: sys::event::is_writable(event),
            error: sys::event::is_error(event),
            read_closed: sys::event::is_read_closed(event),
            write_closed: sys::event::is_write_closed(event),
            priority: sys::event::is_priority(event),
        }
    }
}

/// A stable handle returned by [`Reactor::register`]. Carries the fd and
/// interest set purely so a selector rebuild can replay the registration;
/// callers only need its [`Token`].
///
/// `reactor_id` ties the handle to the reactor that produced it: passing it
/// to a different `Reactor`'s `modify`/`cancel` is a caller bug (a channel
/// migrating reactors without re-registering), not a condition that should
/// silently touch the wrong selector's state.
#[derive(Debug, Clone, Copy)]
pub struct Registration {
    token: Token,
    reactor_id: u64,
}

impl Registration {
    pub fn token(&self) -> Token {
        self.token
    }
}

struct Entry {
    fd: RawFd,
    interests: Interest,
    cancelled: bool,
}

/// `AWAKE` is a sentinel meaning "a wakeup is already pending, don't write
/// again"; `NONE` means "no deadline armed, write unconditionally".
const DEADLINE_AWAKE: u64 = u64::MAX;
const DEADLINE_NONE: u64 = u64::MAX - 1;

/// Owns one kernel selector for the lifetime of one event loop thread.
///
/// `register`/`modify`/`cancel`/`run` are only ever called from the owning
/// loop thread (per the single-thread invariant); only [`Reactor::waker`]
/// produces a handle safe to call from other threads.
pub struct Reactor {
    id: u64,
    selector: RefCell<sys::Selector>,
    entries: RefCell<Slab<Entry>>,
    events: RefCell<sys::Events>,
    consecutive_empty_waits: RefCell<usize>,
    next_wakeup_deadline: AtomicU64,
    waker_token: Token,
}

impl Reactor {
    /// Creates a new reactor with `events_capacity` pre-allocated event slots
    /// and a dedicated wakeup registration at `waker_token`.
    pub fn new(events_capacity: usize, waker_token: Token) -> io::Result<Reactor> {
        let selector = sys::Selector::new()?;
        Ok(Reactor {
            id: NEXT_REACTOR_ID.fetch_add(1, Ordering::Relaxed),
            selector: RefCell::new(selector),
            entries: RefCell::new(Slab::new()),
            events: RefCell::new(sys::Events::with_capacity(events_capacity)),
            consecutive_empty_waits: RefCell::new(0),
            next_wakeup_deadline: AtomicU64::new(DEADLINE_NONE),
            waker_token,
        })
    }

    /// Registers `fd` for `interests`, returning a stable [`Registration`].
    pub fn register(&self, fd: RawFd, interests: Interest) -> io::Result<Registration> {
        let mut entries = self.entries.borrow_mut();
        let key = entries.insert(Entry {
            fd,
            interests,
            cancelled: false,
        });
        let token = Token(key);
        if let Err(e) = self.selector.borrow().register(fd, token, interests) {
            entries.remove(key);
            return Err(e);
        }
        Ok(Registration {
            token,
            reactor_id: self.id,
        })
    }

    /// Updates the interest set of a live registration.
    ///
    /// Fails with `NotFound` if `registration` was never issued by this
    /// reactor (the `SelectorId` guard, see [`Registration`]'s doc comment).
    pub fn modify(&self, registration: Registration, interests: Interest) -> io::Result<()> {
        if registration.reactor_id != self.id {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "registration belongs to a different reactor",
            ));
        }
        let mut entries = self.entries.borrow_mut();
        let entry = entries
            .get_mut(registration.token.0)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "unknown registration"))?;
        entry.interests = interests;
        self.selector
            .borrow()
            .reregister(entry.fd, registration.token, interests)
    }

    /// Marks a registration cancelled and removes it from kernel state.
    /// Cancellation never fails the caller: an already-gone fd, or a
    /// registration belonging to a different reactor entirely, is treated as
    /// already cancelled.
    pub fn cancel(&self, registration: Registration) {
        if registration.reactor_id != self.id {
            log_warn!("ignoring cancel() for a registration from a different reactor");
            return;
        }
        let mut entries = self.entries.borrow_mut();
        if let Some(entry) = entries.get_mut(registration.token.0) {
            if !entry.cancelled {
                entry.cancelled = true;
                let _ = self.selector.borrow().deregister(entry.fd);
            }
        }
        entries.remove(registration.token.0);
    }

    /// Runs one pass: waits up to `deadline` (relative) for events, then
    /// invokes `dispatch` for each ready registration found.
    ///
    /// Returns the number of events dispatched (not counting the wakeup
    /// registration itself, which is swallowed here).
    pub fn run(
        &self,
        deadline: Option<Duration>,
        mut dispatch: impl FnMut(Token, ReadyOps),
    ) -> CoreResult<usize> {
        self.next_wakeup_deadline.store(
            deadline.map_or(DEADLINE_NONE, |d| d.as_nanos() as u64),
            Ordering::SeqCst,
        );

        let wait_result = {
            let mut events = self.events.borrow_mut();
            self.selector.borrow().select(&mut events, deadline)
        };

        self.next_wakeup_deadline
            .store(DEADLINE_AWAKE, Ordering::SeqCst);

        if let Err(e) = wait_result {
            log_warn!("reactor wait failed, rebuilding selector: {e}");
            self.rebuild()?;
            std::thread::sleep(Duration::from_secs(1));
            return Ok(0);
        }

        let events = self.events.borrow();
        if events.is_empty() {
            *self.consecutive_empty_waits.borrow_mut() += 1;
            if *self.consecutive_empty_waits.borrow() > REBUILD_THRESHOLD {
                log_warn!(
                    "reactor saw {REBUILD_THRESHOLD} consecutive spurious wakeups, rebuilding selector"
                );
                drop(events);
                self.rebuild()?;
                *self.consecutive_empty_waits.borrow_mut() = 0;
                return Ok(0);
            }
            return Ok(0);
        }
        *self.consecutive_empty_waits.borrow_mut() = 0;

        let mut dispatched = 0;
        for event in events.iter() {
            let token = sys::event::token(event);
            if token == self.waker_token {
                continue;
            }
            let cancelled = self
                .entries
                .borrow()
                .get(token.0)
                .map(|e| e.cancelled)
                .unwrap_or(true);
            if cancelled {
                continue;
            }
            dispatch(token, ReadyOps::from_native(event));
            dispatched += 1;
        }
        Ok(dispatched)
    }

    /// Recreates the kernel selector and re-registers every live, non
    /// cancelled handle onto it, preserving interest masks.
    fn rebuild(&self) -> CoreResult<()> {
        let new_selector = sys::Selector::new().map_err(CoreError::Io)?;
        let entries = self.entries.borrow();
        for (key, entry) in entries.iter() {
            if entry.cancelled {
                continue;
            }
            new_selector
                .register(entry.fd, Token(key), entry.interests)
                .map_err(CoreError::Io)?;
        }
        drop(entries);
        *self.selector.borrow_mut() = new_selector;
        Ok(())
    }

    /// Produces a `Send + Sync` handle that can wake a blocked [`Reactor::run`]
    /// from any thread. The handle suppresses redundant wakeup syscalls via
    /// the `next_wakeup_deadline` sentinel, swapping away any non-`AWAKE`
    /// value before it writes.
    pub fn waker(self: &Arc<Self>) -> io::Result<ReactorWaker> {
        let inner = sys::Waker::new(&self.selector.borrow(), self.waker_token)?;
        Ok(ReactorWaker {
            inner,
            reactor: self.clone(),
        })
    }
}

/// A cross-thread handle that can interrupt a blocked [`Reactor::run`].
pub struct ReactorWaker {
    inner: sys::Waker,
    reactor: Arc<Reactor>,
}



// SAFETY: the inner platform waker is backed by a dedicated fd (or, for
// kqueue, a cloned selector handle) and only ever writes; it does not touch
// the `RefCell`-protected fields the owning thread mutates.
unsafe impl Send for ReactorWaker {}
unsafe impl Sync for ReactorWaker {}

impl ReactorWaker {
    pub fn wake(&self) -> io::Result<()> {
        let prior = self
            .reactor
            .next_wakeup_deadline
            .swap(DEADLINE_AWAKE, Ordering::SeqCst);
        if prior == DEADLINE_AWAKE {
            return Ok(());
        }
        self.inner.wake()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipe() -> (RawFd, RawFd) {
        let mut fds = [0; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        (fds[0], fds[1])
    }

    /// Drives `run` past `REBUILD_THRESHOLD` consecutive empty waits with a
    /// registered-but-silent pipe read end, then confirms the rebuilt
    /// selector still delivers readiness for that same registration — the
    /// thing scenario 5 actually cares about isn't that a rebuild happened,
    /// it's that the reactor keeps working afterward.
    #[test]
    fn selector_rebuild_after_sustained_spurious_empty_waits_preserves_registrations() {
        let (read_fd, write_fd) = pipe();
        let reactor = Reactor::new(16, Token(usize::MAX)).unwrap();
        let registration = reactor.register(read_fd, Interest::READABLE).unwrap();

        for _ in 0..=REBUILD_THRESHOLD {
            let dispatched = reactor.run(Some(Duration::from_millis(0)), |_, _| {}).unwrap();
            assert_eq!(dispatched, 0);
        }
        assert_eq!(*reactor.consecutive_empty_waits.borrow(), 0, "rebuild must reset the counter");

        assert_eq!(unsafe { libc::write(write_fd, b"x".as_ptr() as *const _, 1) }, 1);

        let mut saw = None;
        for _ in 0..50 {
            let mut found = None;
            reactor
                .run(Some(Duration::from_millis(50)), |token, ready| {
                    if token == registration.token() && ready.readable {
                        found = Some(token);
                    }
                })
                .unwrap();
            if found.is_some() {
                saw = found;
                break;
            }
        }
        assert_eq!(saw, Some(registration.token()), "rebuilt selector must still report readiness for pre-existing registrations");

        unsafe {
            libc::close(read_fd);
            libc::close(write_fd);
        }
    }
}
