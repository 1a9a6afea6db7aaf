#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use self::unix::{event, Event, Events, Selector, Waker};

#[cfg(not(unix))]
compile_error!("corvid's reactor currently only implements a Unix backend (epoll/kqueue/poll)");
