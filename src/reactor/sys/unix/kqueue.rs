//! kqueue-backed selector: the BSDs and macOS.

use std::io;
use std::mem::MaybeUninit;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::ptr;
use std::slice;
use std::time::Duration;

use crate::interest::Interest;
use crate::token::Token;

#[cfg(any(target_os = "netbsd", target_os = "openbsd"))]
type Count = libc::size_t;
#[cfg(not(any(target_os = "netbsd", target_os = "openbsd")))]
type Count = libc::c_int;

#[cfg(target_os = "netbsd")]
type Data = i64;
#[cfg(not(target_os = "netbsd"))]
type Data = libc::intptr_t;

macro_rules! kevent {
    ($id: expr, $filter: expr, $flags: expr, $data: expr) => {
        libc::kevent {
            ident: $id as libc::uintptr_t,
            filter: $filter as libc::c_short,
            flags: $flags,
            fflags: 0,
            data: 0,
            udata: $data as *mut libc::c_void,
        }
    };
}

#[derive(Debug)]
pub struct Selector {
    kq: OwnedFd,
}

impl Selector {
    pub fn new() -> io::Result<Selector> {
        let kq = syscall!(kqueue())?;
        syscall!(fcntl(kq, libc::F_SETFD, libc::FD_CLOEXEC))?;
        // SAFETY: `kqueue()` returns a valid owned fd on success.
        Ok(Selector {
            kq: unsafe { OwnedFd::from_raw_fd(kq) },
        })
    }

    pub fn try_clone(&self) -> io::Result<Selector> {
        self.kq.try_clone().map(|kq| Selector { kq })
    }

    pub fn select(&self, events: &mut Events, timeout: Option<Duration>) -> io::Result<()> {
        let timeout = timeout.map(|to| libc::timespec {
            tv_sec: to.as_secs() as libc::time_t,
            tv_nsec: libc::c_long::from(to.subsec_nanos()),
        });
        let timeout = timeout
            .as_ref()
            .map(|ts| ts as *const libc::timespec)
            .unwrap_or(ptr::null());

        events.clear();
        syscall!(kevent(
            self.kq.as_raw_fd(),
            ptr::null(),
            0,
            events.as_mut_ptr(),
            events.capacity() as Count,
            timeout,
        ))
        .map(|n_events| {
            // SAFETY: the kernel initialized `n_events` entries.
            unsafe { events.set_len(n_events as usize) };
        })
    }

    pub fn register(&self, fd: RawFd, token: Token, interests: Interest) -> io::Result<()> {
        let flags = libc::EV_CLEAR | libc::EV_RECEIPT | libc::EV_ADD;
        let mut changes: [MaybeUninit<libc::kevent>; 2] =
            [MaybeUninit::uninit(), MaybeUninit::uninit()];
        let mut n = 0;

        if interests.is_writable() {
            changes[n] = MaybeUninit::new(kevent!(fd, libc::EVFILT_WRITE, flags, token.0));
            n += 1;
        }
        if interests.is_readable() {
            changes[n] = MaybeUninit::new(kevent!(fd, libc::EVFILT_READ, flags, token.0));
            n += 1;
        }

        let changes = unsafe { slice::from_raw_parts_mut(changes[0].as_mut_ptr(), n) };
        kevent_register(self.kq.as_raw_fd(), changes, &[libc::EPIPE as Data])
    }

    pub fn reregister(&self, fd: RawFd, token: Token, interests: Interest) -> io::Result<()> {
        let flags = libc::EV_CLEAR | libc::EV_RECEIPT;
        let write_flags = if interests.is_writable() {
            flags | libc::EV_ADD
        } else {
            flags | libc::EV_DELETE
        };
        let read_flags = if interests.is_readable() {
            flags | libc::EV_ADD
        } else {
            flags | libc::EV_DELETE
        };

        let mut changes: [libc::kevent; 2] = [
            kevent!(fd, libc::EVFILT_WRITE, write_flags, token.0),
            kevent!(fd, libc::EVFILT_READ, read_flags, token.0),
        ];

        kevent_register(
            self.kq.as_raw_fd(),
            &mut changes,
            &[libc::ENOENT as Data, libc::EPIPE as Data],
        )
    }

    pub fn deregister(&self, fd: RawFd) -> io::Result<()> {
        let flags = libc::EV_DELETE | libc::EV_RECEIPT;
        let mut changes: [libc::kevent; 2] = [
            kevent!(fd, libc::EVFILT_WRITE, flags, 0),
            kevent!(fd, libc::EVFILT_READ, flags, 0),
        ];

        kevent_register(self.kq.as_raw_fd(), &mut changes, &[libc::ENOENT as Data])
    }

    pub fn setup_waker(&self, token: Token) -> io::Result<()> {
        let mut kevent = kevent!(
            0,
            libc::EVFILT_USER,
            libc::EV_ADD | libc::EV_CLEAR | libc::EV_RECEIPT,
            token.0
        );
        syscall!(kevent(self.kq.as_raw_fd(), &kevent, 1, &mut kevent, 1, ptr::null()))
            .and_then(|_| check_kevent_error(&kevent))
    }

    pub fn wake(&self, token: Token) -> io::Result<()> {
        let mut kevent = kevent!(0, libc::EVFILT_USER, libc::EV_ADD | libc::EV_RECEIPT, token.0);
        kevent.fflags = libc::NOTE_TRIGGER;
        syscall!(kevent(self.kq.as_raw_fd(), &kevent, 1, &mut kevent, 1, ptr::null()))
            .and_then(|_| check_kevent_error(&kevent))
    }
}

fn check_kevent_error(kevent: &libc::kevent) -> io::Result<()> {
    if (kevent.flags & libc::EV_ERROR) != 0 && kevent.data != 0 {
        Err(io::Error::from_raw_os_error(kevent.data as i32))
    } else {
        Ok(())
    }
}

/// `EPIPE`, `ENOENT` and `EINTR` are all survivable per-change failures that
/// kqueue reports via `EV_ERROR` entries rather than a failed syscall; only a
/// truly unexpected `data` code is propagated.
fn kevent_register(kq: RawFd, changes: &mut [libc::kevent], ignored_errors: &[Data]) -> io::Result<()> {
    syscall!(kevent(
        kq,
        changes.as_ptr(),
        changes.len() as Count,
        changes.as_mut_ptr(),
        changes.len() as Count,
        ptr::null(),
    ))
    .map(|_| ())
    .or_else(|err| {
        if err.raw_os_error() == Some(libc::EINTR) {
            return Ok(());
        }
        Err(err)
    })?;

    for change in changes.iter() {
        if (change.flags & libc::EV_ERROR) != 0
            && change.data != 0
            && !ignored_errors.contains(&(change.data as Data))
        {
            return Err(io::Error::from_raw_os_error(change.data as i32));
        }
    }
    Ok(())
}

pub type Event = libc::kevent;
pub type Events = Vec<Event>;

pub mod event {
    use super::Event;
    use crate::token::Token;

    pub fn token(event: &Event) -> Token {
        Token(event.udata as usize)
    }

    pub fn is_readable(event: &Event) -> bool {
        event.filter == libc::EVFILT_READ
    }

    pub fn is_writable(event: &Event) -> bool {
        event.filter == libc::EVFILT_WRITE
    }

    pub fn is_error(event: &Event) -> bool {
        (event.flags & libc::EV_ERROR) != 0
    }

    pub fn is_read_closed(event: &Event) -> bool {
        event.filter == libc::EVFILT_READ && (event.flags & libc::EV_EOF) != 0
    }

    pub fn is_write_closed(event: &Event) -> bool {
        event.filter == libc::EVFILT_WRITE && (event.flags & libc::EV_EOF) != 0
    }

    pub fn is_priority(_event: &Event) -> bool {
        false
    }
}
