//! Channel identity and lifecycle state.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(0);

/// A process-unique channel identifier, assigned at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(u64);

impl ChannelId {
    pub(crate) fn next() -> ChannelId {
        ChannelId(NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel-{:#x}", self.0)
    }
}

/// A channel's lifecycle state, advanced monotonically except for the
/// `Active -> Registered` transition a half-closed channel can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChannelState {
    /// Constructed, not yet registered with an event loop.
    Unregistered = 0,
    /// Registered with an event loop's reactor, but not yet connected/bound.
    Registered = 1,
    /// Connected (client) or bound and listening (server acceptor).
    Active = 2,
    /// Deregistered and closed; terminal.
    Closed = 3,
}

impl From<u8> for ChannelState {
    fn from(v: u8) -> ChannelState {
        match v {
            0 => ChannelState::Unregistered,
            1 => ChannelState::Registered,
            2 => ChannelState::Active,
            _ => ChannelState::Closed,
        }
    }
}
