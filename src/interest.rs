//! Interest mask: which readiness conditions a registration wants
//! notifications for.
//!
//! Mirrors `mio::Interest` closely, including its central design choice: an
//! `Interest` can never be empty. A zero-bit epoll/kqueue registration is
//! meaningless (kernels either reject it or silently mask every wakeup), so
//! rather than accept an empty set at the type boundary and fail later at
//! the syscall, corvid backs `Interest` with a `NonZeroU8` the same way mio
//! backs `Interests` with a `NonZeroU8`, making "no interest" a
//! non-representable state instead of a runtime error.

use std::fmt;
use std::num::NonZeroU8;
use std::ops::BitOr;

const READABLE: u8 = 0b0001;
const WRITABLE: u8 = 0b0010;
const PRIORITY: u8 = 0b0100;
const AIO: u8 = 0b1000;

/// A non-empty set of readiness conditions to watch for on a registration.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interest(NonZeroU8);

impl Interest {
    pub const READABLE: Interest = Interest(unsafe { NonZeroU8::new_unchecked(READABLE) });
    pub const WRITABLE: Interest = Interest(unsafe { NonZeroU8::new_unchecked(WRITABLE) });
    /// Out-of-band/urgent data, e.g. `EPOLLPRI`/`POLLPRI`. Unix-only in
    /// practice; kept as a plain variant rather than cfg-gated so callers
    /// don't need conditional compilation just to express "I also want
    /// priority events where the platform supports them".
    pub const PRIORITY: Interest = Interest(unsafe { NonZeroU8::new_unchecked(PRIORITY) });
    /// Reserved for a future AIO-backed backend; accepted today but ignored
    /// by every shipping selector.
    pub const AIO: Interest = Interest(unsafe { NonZeroU8::new_unchecked(AIO) });

    pub fn is_readable(self) -> bool {
        self.0.get() & READABLE != 0
    }

    pub fn is_writable(self) -> bool {
        self.0.get() & WRITABLE != 0
    }

    pub fn is_priority(self) -> bool {
        self.0.get() & PRIORITY != 0
    }

    pub fn is_aio(self) -> bool {
        self.0.get() & AIO != 0
    }

    /// Combines two interest sets. Prefer the `|` operator; this is the
    /// named form for use where operator syntax would read awkwardly.
    pub fn add(self, other: Interest) -> Interest {
        self | other
    }

    /// Removes `other`'s bits, returning `None` if doing so would leave an
    /// empty (therefore unrepresentable) set.
    pub fn remove(self, other: Interest) -> Option<Interest> {
        NonZeroU8::new(self.0.get() & !other.0.get()).map(Interest)
    }
}

impl BitOr for Interest {
    type Output = Interest;

    fn bitor(self, rhs: Interest) -> Interest {
        // SAFETY: the OR of two non-zero values is non-zero.
        Interest(unsafe { NonZeroU8::new_unchecked(self.0.get() | rhs.0.get()) })
    }
}

impl fmt::Debug for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        let mut flag = |f: &mut fmt::Formatter<'_>, set: bool, name: &str| -> fmt::Result {
            if set {
                if !first {
                    write!(f, " | ")?;
                }
                first = false;
                write!(f, "{name}")?;
            }
            Ok(())
        };
        flag(f, self.is_readable(), "READABLE")?;
        flag(f, self.is_writable(), "WRITABLE")?;
        flag(f, self.is_priority(), "PRIORITY")?;
        flag(f, self.is_aio(), "AIO")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combines_readable_and_writable() {
        let both = Interest::READABLE | Interest::WRITABLE;
        assert!(both.is_readable());
        assert!(both.is_writable());
        assert!(!both.is_priority());
    }

    #[test]
    fn remove_to_empty_yields_none() {
        assert_eq!(Interest::READABLE.remove(Interest::READABLE), None);
        let both = Interest::READABLE | Interest::WRITABLE;
        assert_eq!(both.remove(Interest::READABLE), Some(Interest::WRITABLE));
    }
}
