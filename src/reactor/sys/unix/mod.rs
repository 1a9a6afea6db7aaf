// The io_uring backend, when enabled, *replaces* epoll as the `Selector`
// alias on Linux rather than coexisting with it — corvid picks one kernel
// interface per build, not per event loop, so the two are mutually
// exclusive `cfg`s over the same `event`/`Event`/`Events`/`Selector` names.
cfg_io_uring! {
    mod uring;
    pub use self::uring::{event, Event, Events, Selector};
}

#[cfg(any(
    target_os = "android",
    all(target_os = "linux", not(feature = "io-uring"))
))]
mod epoll;
#[cfg(any(
    target_os = "android",
    all(target_os = "linux", not(feature = "io-uring"))
))]
pub use self::epoll::{event, Event, Events, Selector};

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
mod kqueue;
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
pub use self::kqueue::{event, Event, Events, Selector};

#[cfg(any(
    corvid_unsupported_force_poll_fallback,
    not(any(
        target_os = "android",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "ios",
        target_os = "linux",
        target_os = "macos",
        target_os = "netbsd",
        target_os = "openbsd",
        target_os = "tvos",
        target_os = "watchos",
    ))
))]
mod poll_fallback;
#[cfg(any(
    corvid_unsupported_force_poll_fallback,
    not(any(
        target_os = "android",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "ios",
        target_os = "linux",
        target_os = "macos",
        target_os = "netbsd",
        target_os = "openbsd",
        target_os = "tvos",
        target_os = "watchos",
    ))
))]
pub use self::poll_fallback::{event, Event, Events, Selector};

mod waker;
pub use self::waker::Waker;
