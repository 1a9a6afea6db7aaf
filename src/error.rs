//! The error taxonomy shared across every corvid subsystem.
//!
//! Netty's equivalent is a scattered hierarchy of checked and unchecked
//! exceptions; corvid collapses it into one enum so callers can
//! match on a specific failure mode instead of string-sniffing a message.

use std::fmt;
use std::io;

/// Errors raised by the core runtime (reactor, event loop, channel,
/// pipeline, bootstrap, promise, recycler).
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    /// A `Bootstrap` was missing a required field (group, channel factory,
    /// or handler) when `bind`/`connect` was called.
    #[error("bootstrap is not configured: {0}")]
    Configuration(&'static str),

    /// The event loop (or group) rejected a channel registration, usually
    /// because it has already shut down.
    #[error("registration rejected: {0}")]
    Registration(&'static str),

    /// A syscall made by the reactor or channel failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An operation was attempted on a channel that has already closed.
    #[error("channel is closed")]
    ChannelClosed,

    /// A connect or user-scheduled deadline elapsed before completion.
    #[error("operation timed out")]
    Timeout,

    /// A promise's outcome was set a second time.
    #[error("promise already completed")]
    AlreadyComplete,

    /// `sync`/`await` was called from the thread that would have to
    /// complete the very promise being waited on.
    #[error("sync/await called on the completing event loop thread")]
    BlockingOnEventLoop,

    /// A user handler threw while processing an event; wrapped and refired
    /// as `exceptionCaught` starting at the next context.
    #[error("handler raised an exception: {0}")]
    Handler(Box<dyn std::error::Error + Send + Sync>),

    /// The promise (or its channel) was cancelled before completion.
    #[error("operation was cancelled")]
    Cancelled,
}

impl CoreError {
    pub fn configuration(reason: &'static str) -> Self {
        CoreError::Configuration(reason)
    }

    pub fn registration(reason: &'static str) -> Self {
        CoreError::Registration(reason)
    }

    pub fn handler<E>(cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        CoreError::Handler(Box::new(cause))
    }
}

/// Result alias used throughout the crate.
pub type CoreResult<T> = Result<T, CoreError>;

/// Not a true error: `ChannelConfig::set_option` returns this for an option
/// it doesn't recognize. Spec §7 calls this out explicitly as a warning, not
/// a failure, so it is typed separately from [`CoreError`] rather than
/// folded into it — a caller can `if let Err(OptionUnknown(name)) = ...`
/// without treating a no-op as a hard failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionUnknown(pub &'static str);

impl fmt::Display for OptionUnknown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown channel option: {}", self.0)
    }
}

impl std::error::Error for OptionUnknown {}

/// Recycler-specific failures (double-recycle, foreign handle misuse).
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecycleError {
    #[error("value was already recycled")]
    DoubleRecycle,
    #[error("handle does not belong to this recycler")]
    ForeignHandle,
}
