//! epoll-backed selector: Linux and Android.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

use crate::interest::Interest;
use crate::token::Token;

#[derive(Debug)]
pub struct Selector {
    ep: OwnedFd,
}

impl Selector {
    pub fn new() -> io::Result<Selector> {
        syscall!(epoll_create1(libc::EPOLL_CLOEXEC))
            .map(|ep| Selector {
                // SAFETY: epoll_create1 returns a valid owned fd on success.
                ep: unsafe { OwnedFd::from_raw_fd(ep) },
            })
    }

    pub fn try_clone(&self) -> io::Result<Selector> {
        self.ep.try_clone().map(|ep| Selector { ep })
    }

    pub fn select(&self, events: &mut Events, timeout: Option<Duration>) -> io::Result<()> {
        let timeout_ms = timeout.map_or(-1, |to| {
            let to = to
                .checked_add(Duration::from_nanos(999_999))
                .unwrap_or(to);
            to.as_millis().try_into().unwrap_or(i32::MAX)
        });

        events.clear();
        syscall!(epoll_wait(
            self.ep.as_raw_fd(),
            events.as_mut_ptr(),
            events.capacity() as i32,
            timeout_ms,
        ))
        .map(|n_events| {
            // SAFETY: `epoll_wait` initialized `n_events` entries.
            unsafe { events.set_len(n_events as usize) };
        })
    }

    pub fn register(&self, fd: RawFd, token: Token, interests: Interest) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events: interests_to_epoll(interests),
            u64: usize::from(token) as u64,
        };
        syscall!(epoll_ctl(
            self.ep.as_raw_fd(),
            libc::EPOLL_CTL_ADD,
            fd,
            &mut event,
        ))
        .map(|_| ())
    }

    pub fn reregister(&self, fd: RawFd, token: Token, interests: Interest) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events: interests_to_epoll(interests),
            u64: usize::from(token) as u64,
        };
        syscall!(epoll_ctl(
            self.ep.as_raw_fd(),
            libc::EPOLL_CTL_MOD,
            fd,
            &mut event,
        ))
        .map(|_| ())
    }

    pub fn deregister(&self, fd: RawFd) -> io::Result<()> {
        syscall!(epoll_ctl(
            self.ep.as_raw_fd(),
            libc::EPOLL_CTL_DEL,
            fd,
            std::ptr::null_mut(),
        ))
        .map(|_| ())
    }
}

fn interests_to_epoll(interests: Interest) -> u32 {
    let mut kind = libc::EPOLLET;

    if interests.is_readable() {
        kind |= libc::EPOLLIN | libc::EPOLLRDHUP;
    }
    if interests.is_writable() {
        kind |= libc::EPOLLOUT;
    }
    if interests.is_priority() {
        kind |= libc::EPOLLPRI;
    }

    kind as u32
}

pub type Event = libc::epoll_event;
pub type Events = Vec<Event>;

pub mod event {
    use super::Event;
    use crate::token::Token;

    pub fn token(event: &Event) -> Token {
        Token(event.u64 as usize)
    }

    pub fn is_readable(event: &Event) -> bool {
        (event.events as i32 & libc::EPOLLIN) != 0 || (event.events as i32 & libc::EPOLLPRI) != 0
    }

    pub fn is_writable(event: &Event) -> bool {
        (event.events as i32 & libc::EPOLLOUT) != 0
    }

    pub fn is_error(event: &Event) -> bool {
        (event.events as i32 & libc::EPOLLERR) != 0
    }

    pub fn is_read_closed(event: &Event) -> bool {
        event.events as i32 & libc::EPOLLHUP != 0
            || (event.events as i32 & libc::EPOLLIN != 0
                && event.events as i32 & libc::EPOLLRDHUP != 0)
    }

    pub fn is_write_closed(event: &Event) -> bool {
        event.events as i32 & libc::EPOLLHUP != 0
            || (event.events as i32 & libc::EPOLLOUT != 0
                && event.events as i32 & libc::EPOLLERR != 0)
    }

    pub fn is_priority(event: &Event) -> bool {
        event.events as i32 & libc::EPOLLPRI != 0
    }
}
