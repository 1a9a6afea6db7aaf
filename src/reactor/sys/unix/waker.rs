//! Cross-thread wakeup for the reactor. Each backend provides the cheapest
//! mechanism its kernel interface supports: `eventfd` on Linux, kqueue's
//! `EVFILT_USER` on the BSDs/macOS (no extra fd needed), and a self-pipe for
//! the portable poll(2) fallback.

use std::io;

use crate::token::Token;

#[cfg(any(target_os = "android", target_os = "linux"))]
mod imp {
    use std::fs::File;
    use std::io::{self, Read, Write};
    use std::os::fd::AsRawFd;

    use super::super::Selector;
    use crate::interest::Interest;
    use crate::token::Token;

    #[derive(Debug)]
    pub(crate) struct WakerImpl {
        fd: File,
    }

    impl WakerImpl {
        pub(crate) fn new(selector: &Selector, token: Token) -> io::Result<WakerImpl> {
            let fd = syscall!(eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK))?;
            // SAFETY: eventfd() returned a valid owned fd.
            let fd = unsafe { <File as std::os::fd::FromRawFd>::from_raw_fd(fd) };
            selector.register(fd.as_raw_fd(), token, Interest::READABLE)?;
            Ok(WakerImpl { fd })
        }

        pub(crate) fn wake(&self) -> io::Result<()> {
            let buf: [u8; 8] = 1u64.to_ne_bytes();
            match (&self.fd).write(&buf) {
                Ok(_) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.reset()?;
                    self.wake()
                }
                Err(e) => Err(e),
            }
        }

        fn reset(&self) -> io::Result<()> {
            let mut buf: [u8; 8] = [0; 8];
            match (&self.fd).read(&mut buf) {
                Ok(_) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
                Err(e) => Err(e),
            }
        }
    }
}

#[cfg(any(
    target_os = "dragonfly",
    target_os = "freebsd",
    target_os = "ios",
    target_os = "macos",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "tvos",
    target_os = "watchos",
))]
mod imp {
    use std::io;

    use super::super::Selector;
    use crate::token::Token;

    #[derive(Debug)]
    pub(crate) struct WakerImpl {
        selector: Selector,
        token: Token,
    }

    impl WakerImpl {
        pub(crate) fn new(selector: &Selector, token: Token) -> io::Result<WakerImpl> {
            let selector = selector.try_clone()?;
            selector.setup_waker(token)?;
            Ok(WakerImpl { selector, token })
        }

        pub(crate) fn wake(&self) -> io::Result<()> {
            self.selector.wake(self.token)
        }
    }
}

#[cfg(corvid_unsupported_force_poll_fallback)]
mod imp {
    use std::io;

    use super::super::Selector;
    use crate::token::Token;

    #[derive(Debug)]
    pub(crate) struct WakerImpl {
        selector: Selector,
        token: Token,
    }

    impl WakerImpl {
        pub(crate) fn new(selector: &Selector, token: Token) -> io::Result<WakerImpl> {
            Ok(WakerImpl {
                selector: selector.try_clone()?,
                token,
            })
        }

        pub(crate) fn wake(&self) -> io::Result<()> {
            self.selector.wake(self.token)
        }
    }
}

use imp::WakerImpl;

use super::Selector;

#[derive(Debug)]
pub(crate) struct Waker {
    inner: WakerImpl,
}

impl Waker {
    pub(crate) fn new(selector: &Selector, token: Token) -> io::Result<Waker> {
        WakerImpl::new(selector, token).map(|inner| Waker { inner })
    }

    pub(crate) fn wake(&self) -> io::Result<()> {
        self.inner.wake()
    }
}
