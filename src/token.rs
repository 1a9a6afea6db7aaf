//! The opaque id a reactor hands back for a registration and stamps on
//! every dispatched event so it can be routed back to its owner.
//!
//! Mirrors `mio::Token` exactly: a thin `usize` newtype with no behavior of
//! its own. corvid's own [`crate::reactor::Registration`] wraps one; callers
//! never construct a `Token` directly.

use std::fmt;

/// A readiness-event identifier, unique among the registrations live on one
/// reactor at any given time (ids may be reused once a registration is
/// cancelled and its slot reclaimed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(pub usize);

impl From<Token> for usize {
    fn from(token: Token) -> usize {
        token.0
    }
}

impl From<usize> for Token {
    fn from(value: usize) -> Token {
        Token(value)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
