//! Small macros shared by the `sys` backends.

#![allow(unused_macros)]

/// Call a libc function, turning a `-1` return into the last OS error.
macro_rules! syscall {
    ($fn: ident ( $($arg: expr),* $(,)* ) ) => {{
        #[allow(unused_unsafe)]
        let res = unsafe { libc::$fn($($arg, )*) };
        if res == -1 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(res)
        }
    }};
}

/// The `io-uring` feature is enabled and we're building for Linux.
macro_rules! cfg_io_uring {
    ($($item:item)*) => {
        $(
            #[cfg(all(target_os = "linux", feature = "io-uring"))]
            #[cfg_attr(docsrs, doc(cfg(feature = "io-uring")))]
            $item
        )*
    }
}

/// Logs a recovered/retried internal condition at `warn` level. Compiles to
/// nothing with the `log` feature disabled, exactly as `mio` gates its own
/// `log::trace!` calls around `Poll::poll` — so disabling the feature drops
/// the dependency entirely instead of merely silencing a no-op logger.
macro_rules! log_warn {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        { log::warn!($($arg)*); }
    };
}
