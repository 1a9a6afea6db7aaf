//! Portable `poll(2)` selector used where no edge-triggered backend is
//! available (or forced via `RUST_CORVID_FORCE_POLL`). Readiness is
//! level-triggered, so [`Event`] mirrors raw `revents` bits rather than
//! any kqueue/epoll-specific flags.

use std::collections::HashMap;
use std::io;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::interest::Interest;
use crate::token::Token;

#[derive(Debug)]
pub struct Selector {
    state: std::sync::Arc<State>,
}

#[derive(Debug)]
struct State {
    fds: Mutex<Fds>,
    pending_removal: Mutex<Vec<RawFd>>,
    notify_read: RawFd,
    notify_write: RawFd,
    waiting_operations: AtomicUsize,
    operations_complete: Condvar,
}

#[derive(Debug)]
struct Fds {
    poll_fds: Vec<libc::pollfd>,
    fd_data: HashMap<RawFd, FdData>,
}

#[derive(Debug, Clone, Copy)]
struct FdData {
    poll_fds_index: usize,
    token: Token,
}

impl Selector {
    pub fn new() -> io::Result<Selector> {
        let mut fds = [0; 2];
        syscall!(pipe(fds.as_mut_ptr()))?;
        let flags = syscall!(fcntl(fds[0], libc::F_GETFL))?;
        syscall!(fcntl(fds[0], libc::F_SETFL, flags | libc::O_NONBLOCK))?;

        Ok(Selector {
            state: std::sync::Arc::new(State {
                fds: Mutex::new(Fds {
                    poll_fds: vec![libc::pollfd {
                        fd: fds[0],
                        events: libc::POLLIN,
                        revents: 0,
                    }],
                    fd_data: HashMap::new(),
                }),
                pending_removal: Mutex::new(Vec::new()),
                notify_read: fds[0],
                notify_write: fds[1],
                waiting_operations: AtomicUsize::new(0),
                operations_complete: Condvar::new(),
            }),
        })
    }

    pub fn try_clone(&self) -> io::Result<Selector> {
        Ok(Selector {
            state: self.state.clone(),
        })
    }

    pub fn select(&self, events: &mut Events, timeout: Option<Duration>) -> io::Result<()> {
        let deadline = timeout.map(|d| Instant::now() + d);
        events.clear();

        let mut fds = self.state.fds.lock().unwrap();
        loop {
            while self.state.waiting_operations.load(Ordering::SeqCst) != 0 {
                fds = self.state.operations_complete.wait(fds).unwrap();
            }

            let timeout_ms = deadline.map_or(-1, |deadline| {
                let remaining = deadline.saturating_duration_since(Instant::now());
                remaining.as_millis().try_into().unwrap_or(i32::MAX)
            });

            let n = loop {
                match syscall!(poll(
                    fds.poll_fds.as_mut_ptr(),
                    fds.poll_fds.len() as libc::nfds_t,
                    timeout_ms,
                )) {
                    Ok(n) => break n as usize,
                    Err(e) if e.raw_os_error() == Some(libc::EINTR) => continue,
                    Err(e) => return Err(e),
                }
            };

            if n == 0 {
                return Ok(());
            }

            let notified = fds.poll_fds[0].revents != 0;
            if notified {
                let mut buf = [0u8; 64];
                while syscall!(read(
                    self.state.notify_read,
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                ))
                .is_ok()
                {}
            }

            let pending_removal = std::mem::take(&mut *self.state.pending_removal.lock().unwrap());

            let mut produced = 0;
            let expected = if notified { n - 1 } else { n };
            if expected == 0 {
                continue;
            }

            for data in fds.fd_data.values() {
                let pollfd = &fds.poll_fds[data.poll_fds_index];
                if pending_removal.contains(&pollfd.fd) {
                    continue;
                }
                if pollfd.revents != 0 {
                    events.push(Event {
                        token: data.token,
                        revents: pollfd.revents,
                    });
                    produced += 1;
                    if produced == expected {
                        break;
                    }
                }
            }
            return Ok(());
        }
    }

    pub fn register(&self, fd: RawFd, token: Token, interests: Interest) -> io::Result<()> {
        let mut pending_removal = self.state.pending_removal.lock().unwrap();
        if let Some(idx) = pending_removal.iter().position(|&p| p == fd) {
            pending_removal.remove(idx);
        }
        drop(pending_removal);

        self.modify(|fds| {
            if fds.fd_data.contains_key(&fd) {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "fd registered twice",
                ));
            }
            let idx = fds.poll_fds.len();
            fds.fd_data.insert(
                fd,
                FdData {
                    poll_fds_index: idx,
                    token,
                },
            );
            fds.poll_fds.push(libc::pollfd {
                fd,
                events: interests_to_poll(interests),
                revents: 0,
            });
            Ok(())
        })
    }

    pub fn reregister(&self, fd: RawFd, token: Token, interests: Interest) -> io::Result<()> {
        self.modify(|fds| {
            let data = fds.fd_data.get_mut(&fd).ok_or(io::ErrorKind::NotFound)?;
            data.token = token;
            fds.poll_fds[data.poll_fds_index].events = interests_to_poll(interests);
            Ok(())
        })
    }

    pub fn deregister(&self, fd: RawFd) -> io::Result<()> {
        self.state.pending_removal.lock().unwrap().push(fd);
        self.modify(|fds| {
            let data = fds.fd_data.remove(&fd).ok_or(io::ErrorKind::NotFound)?;
            fds.poll_fds.swap_remove(data.poll_fds_index);
            if let Some(swapped) = fds.poll_fds.get(data.poll_fds_index) {
                fds.fd_data.get_mut(&swapped.fd).unwrap().poll_fds_index = data.poll_fds_index;
            }
            Ok(())
        })
    }

    pub fn wake(&self, _token: Token) -> io::Result<()> {
        syscall!(write(
            self.state.notify_write,
            &1u8 as *const u8 as *const libc::c_void,
            1,
        ))
        .map(|_| ())
    }

    fn modify<T>(&self, f: impl FnOnce(&mut Fds) -> io::Result<T>) -> io::Result<T> {
        self.state.waiting_operations.fetch_add(1, Ordering::SeqCst);
        let woke = self.wake(Token(0)).is_ok();
        let mut fds = self.state.fds.lock().unwrap();
        if woke {
            let mut buf = [0u8; 1];
            let _ = syscall!(read(
                self.state.notify_read,
                buf.as_mut_ptr() as *mut libc::c_void,
                1,
            ));
        }
        let result = f(&mut fds);
        if self.state.waiting_operations.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.state.operations_complete.notify_one();
        }
        result
    }
}

impl Drop for State {
    fn drop(&mut self) {
        let _ = syscall!(close(self.notify_read));
        let _ = syscall!(close(self.notify_write));
    }
}

fn interests_to_poll(interests: Interest) -> libc::c_short {
    let mut kind = 0;
    if interests.is_readable() {
        kind |= libc::POLLIN;
    }
    if interests.is_writable() {
        kind |= libc::POLLOUT;
    }
    kind
}

#[derive(Debug, Clone)]
pub struct Event {
    token: Token,
    revents: libc::c_short,
}

pub type Events = Vec<Event>;

pub mod event {
    use super::Event;
    use crate::token::Token;

    pub fn token(event: &Event) -> Token {
        event.token
    }

    pub fn is_readable(event: &Event) -> bool {
        (event.revents & libc::POLLIN) != 0 || (event.revents & libc::POLLPRI) != 0
    }

    pub fn is_writable(event: &Event) -> bool {
        (event.revents & libc::POLLOUT) != 0
    }

    pub fn is_error(event: &Event) -> bool {
        (event.revents & libc::POLLERR) != 0
    }

    pub fn is_read_closed(event: &Event) -> bool {
        (event.revents & libc::POLLHUP) != 0
    }

    pub fn is_write_closed(event: &Event) -> bool {
        (event.revents & libc::POLLHUP) != 0
            || ((event.revents & libc::POLLOUT) != 0 && (event.revents & libc::POLLERR) != 0)
    }

    pub fn is_priority(event: &Event) -> bool {
        (event.revents & libc::POLLPRI) != 0
    }
}
