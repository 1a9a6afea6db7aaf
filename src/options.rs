//! The typed channel configuration surface.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::buffer::BufferAllocator;
use crate::error::OptionUnknown;

/// Sizes the next receive buffer, given how much the previous read filled.
/// An external collaborator; corvid's TCP transport reads into
/// a fixed-size recycled buffer regardless (see `crate::channel`'s
/// `READ_BUFFER_SIZE`), so this slot is accepted and stored for codecs or
/// future transports that want adaptive sizing, but the stock transport
/// does not yet consult it.
pub trait RecvBufferAllocator: Send + Sync {
    fn next_size(&self, last_read: usize) -> usize;
}

/// Always returns the same capacity. corvid's implicit default when no
/// allocator is configured is the fixed-size read buffer already built into
/// `crate::channel`, so this type mainly exists so callers that *do* set
/// `RECVBUF_ALLOCATOR` have an obvious, simple implementation to reach for.
#[derive(Debug, Clone, Copy)]
pub struct FixedRecvBufferAllocator(pub usize);

impl RecvBufferAllocator for FixedRecvBufferAllocator {
    fn next_size(&self, _last_read: usize) -> usize {
        self.0
    }
}

/// Estimates a message's outbound byte size for watermark accounting. The
/// stock TCP transport only ever writes `Vec<u8>` messages, whose size is
/// exact (`Vec::len`), so this is consulted only by codec handlers ahead of
/// the transport that write richer message types into the pipeline.
pub trait MessageSizeEstimator: Send + Sync {
    fn estimate(&self, message: &dyn Any) -> usize;
}

/// Low/high pending-byte thresholds that drive `Channel::is_writable`
/// hysteresis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteBufferWaterMark {
    pub low: u32,
    pub high: u32,
}

impl WriteBufferWaterMark {
    pub const fn new(low: u32, high: u32) -> WriteBufferWaterMark {
        WriteBufferWaterMark { low, high }
    }
}

impl Default for WriteBufferWaterMark {
    fn default() -> Self {
        WriteBufferWaterMark::new(32 * 1024, 64 * 1024)
    }
}

/// One entry in the canonical configuration set. Each variant
/// carries its value inline rather than splitting a `ChannelOption<T>` key
/// type from a loosely-typed value, since corvid's option set is closed
/// (unlike Netty's extensible `ChannelOption` registry).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOption {
    /// Connect deadline in milliseconds; `0` disables the deadline.
    ConnectTimeoutMillis(u32),
    /// Max non-blocking write attempts per flush before yielding.
    WriteSpinCount(u32),
    AutoRead(bool),
    /// Close the channel on a write failure.
    AutoClose(bool),
    WriteBufferWaterMark(WriteBufferWaterMark),
    TcpNodelay(bool),
    SoKeepalive(bool),
    SoReuseaddr(bool),
    /// `None` disables `SO_LINGER`; `Some(secs)` sets it.
    SoLinger(Option<u32>),
    SoSndbuf(u32),
    SoRcvbuf(u32),
    IpTos(u32),
    AllowHalfClosure(bool),
}

/// Per-channel configuration, applied at bootstrap init time and mutable
/// afterward via [`ChannelConfig::set_option`].
///
/// `allocator`/`recvbuf_allocator`/`message_size_estimator` are reference
/// types, so unlike
/// every other entry they can't live in the `Copy` [`ChannelOption`] enum;
/// they're set directly via their own setters instead.
#[derive(Clone)]
pub struct ChannelConfig {
    pub connect_timeout_millis: u32,
    pub write_spin_count: u32,
    pub auto_read: bool,
    pub auto_close: bool,
    pub write_buffer_water_mark: WriteBufferWaterMark,
    pub tcp_nodelay: bool,
    pub so_keepalive: bool,
    pub so_reuseaddr: bool,
    pub so_linger: Option<u32>,
    pub so_sndbuf: Option<u32>,
    pub so_rcvbuf: Option<u32>,
    pub ip_tos: Option<u32>,
    pub allow_half_closure: bool,
    pub allocator: Option<Arc<dyn BufferAllocator>>,
    pub recvbuf_allocator: Option<Arc<dyn RecvBufferAllocator>>,
    pub message_size_estimator: Option<Arc<dyn MessageSizeEstimator>>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig {
            connect_timeout_millis: 30_000,
            write_spin_count: 16,
            auto_read: true,
            auto_close: true,
            write_buffer_water_mark: WriteBufferWaterMark::default(),
            tcp_nodelay: false,
            so_keepalive: false,
            so_reuseaddr: false,
            so_linger: None,
            so_sndbuf: None,
            so_rcvbuf: None,
            ip_tos: None,
            allow_half_closure: false,
            allocator: None,
            recvbuf_allocator: None,
            message_size_estimator: None,
        }
    }
}

impl fmt::Debug for ChannelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelConfig")
            .field("connect_timeout_millis", &self.connect_timeout_millis)
            .field("write_spin_count", &self.write_spin_count)
            .field("auto_read", &self.auto_read)
            .field("auto_close", &self.auto_close)
            .field("write_buffer_water_mark", &self.write_buffer_water_mark)
            .field("tcp_nodelay", &self.tcp_nodelay)
            .field("so_keepalive", &self.so_keepalive)
            .field("so_reuseaddr", &self.so_reuseaddr)
            .field("so_linger", &self.so_linger)
            .field("so_sndbuf", &self.so_sndbuf)
            .field("so_rcvbuf", &self.so_rcvbuf)
            .field("ip_tos", &self.ip_tos)
            .field("allow_half_closure", &self.allow_half_closure)
            .field("allocator", &self.allocator.is_some())
            .field("recvbuf_allocator", &self.recvbuf_allocator.is_some())
            .field("message_size_estimator", &self.message_size_estimator.is_some())
            .finish()
    }
}

impl ChannelConfig {
    pub fn new() -> ChannelConfig {
        ChannelConfig::default()
    }

    /// Applies one option. Returns `Err(OptionUnknown)` only for options
    /// corvid doesn't model at all; since corvid's option set is a closed
    /// enum (unlike Netty's extensible registry) this currently never
    /// triggers, but the typed error is kept so callers applying options
    /// sourced from user configuration can handle an unrecognized request
    /// by logging a warning and reporting failure, rather than panicking.
    pub fn set_option(&mut self, option: ChannelOption) -> Result<(), OptionUnknown> {
        match option {
            ChannelOption::ConnectTimeoutMillis(v) => self.connect_timeout_millis = v,
            ChannelOption::WriteSpinCount(v) => self.write_spin_count = v,
            ChannelOption::AutoRead(v) => self.auto_read = v,
            ChannelOption::AutoClose(v) => self.auto_close = v,
            ChannelOption::WriteBufferWaterMark(v) => self.write_buffer_water_mark = v,
            ChannelOption::TcpNodelay(v) => self.tcp_nodelay = v,
            ChannelOption::SoKeepalive(v) => self.so_keepalive = v,
            ChannelOption::SoReuseaddr(v) => self.so_reuseaddr = v,
            ChannelOption::SoLinger(v) => self.so_linger = v,
            ChannelOption::SoSndbuf(v) => self.so_sndbuf = Some(v),
            ChannelOption::SoRcvbuf(v) => self.so_rcvbuf = Some(v),
            ChannelOption::IpTos(v) => self.ip_tos = Some(v),
            ChannelOption::AllowHalfClosure(v) => self.allow_half_closure = v,
        }
        Ok(())
    }

    pub fn set_allocator(&mut self, allocator: Arc<dyn BufferAllocator>) {
        self.allocator = Some(allocator);
    }

    pub fn set_recvbuf_allocator(&mut self, allocator: Arc<dyn RecvBufferAllocator>) {
        self.recvbuf_allocator = Some(allocator);
    }

    pub fn set_message_size_estimator(&mut self, estimator: Arc<dyn MessageSizeEstimator>) {
        self.message_size_estimator = Some(estimator);
    }
}

impl fmt::Display for ChannelOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_buffer_water_mark_defaults_are_ordered() {
        let wm = WriteBufferWaterMark::default();
        assert!(wm.low < wm.high);
    }

    #[test]
    fn set_option_updates_config() {
        let mut cfg = ChannelConfig::new();
        cfg.set_option(ChannelOption::TcpNodelay(true)).unwrap();
        assert!(cfg.tcp_nodelay);
    }
}
