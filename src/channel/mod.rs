//! The `Channel` type: identity, lifecycle, pipeline wiring, and the
//! concrete TCP transport.
//!
//! Grounded on mio's `net::{TcpStream, TcpListener}` wrapping std sockets set
//! non-blocking and registered by raw fd (`sys/unix/tcp.rs` in mio),
//! generalized into the full channel lifecycle/pipeline/outbound-buffer
//! machinery layered on top. The socket-option *values* live in
//! [`crate::options::ChannelConfig`]; this module is the "sys layer" that
//! actually calls `setsockopt` for them.

pub mod context;
pub mod handler;
pub mod outbound_buffer;
pub mod pipeline;
pub mod state;

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, RawFd};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use parking_lot::Mutex as PlMutex;

use crate::attributes::AttributeMap;
use crate::error::CoreError;
use crate::event_loop::{EventLoop, IoHandler};
use crate::interest::Interest;
use crate::options::ChannelConfig;
use crate::promise::{Executor, ImmediateExecutor, Promise};
use crate::reactor::{ReadyOps, Registration};
use crate::recycler::Recycler;

pub use context::HandlerContext;
pub use handler::{Handler, HandlerFlags, Message, UserEvent};
pub use pipeline::Pipeline;
pub use state::{ChannelId, ChannelState};

use outbound_buffer::OutboundBuffer;
use pipeline::ChannelUnsafe;

const READ_BUFFER_SIZE: usize = 64 * 1024;

static READ_BUFFER_RECYCLER: OnceLock<Recycler<Vec<u8>>> = OnceLock::new();

fn read_buffer_recycler() -> Recycler<Vec<u8>> {
    READ_BUFFER_RECYCLER
        .get_or_init(|| Recycler::new(|| vec![0u8; READ_BUFFER_SIZE]))
        .clone()
}

/// The interest mask a [`Channel`] registers with when it first gets an
/// event loop (or re-arms after an explicit [`Channel::read`] cycle ends):
/// `WRITABLE` is always present (needed for outbound flush and the
/// nonblocking-connect completion protocol regardless of auto-read), and
/// `READABLE` is only present when `auto_read` is on. Spec §4.G: with
/// auto-read off, the application must call `read()` to arm one read cycle,
/// providing per-channel admission control.
pub(crate) fn initial_interest(auto_read: bool) -> Interest {
    if auto_read {
        Interest::READABLE | Interest::WRITABLE
    } else {
        Interest::WRITABLE
    }
}

enum Socket {
    Unbound,
    Stream(TcpStream),
    Listener(TcpListener),
}

impl Socket {
    fn raw_fd(&self) -> Option<RawFd> {
        match self {
            Socket::Unbound => None,
            Socket::Stream(s) => Some(s.as_raw_fd()),
            Socket::Listener(s) => Some(s.as_raw_fd()),
        }
    }
}

/// The non-`pub` state backing a [`Channel`] handle. `Channel` itself is a
/// thin `Arc` wrapper so cloning a channel is cheap and every clone observes
/// the same lifecycle.
struct ChannelInner {
    id: ChannelId,
    state: AtomicU8,
    pipeline: Pipeline,
    config: PlMutex<ChannelConfig>,
    attributes: AttributeMap,
    event_loop: PlMutex<Option<EventLoop>>,
    registration: PlMutex<Option<Registration>>,
    socket: PlMutex<Socket>,
    outbound: PlMutex<OutboundBuffer>,
    local_addr: PlMutex<Option<SocketAddr>>,
    remote_addr: PlMutex<Option<SocketAddr>>,
    reading: std::sync::atomic::AtomicBool,
    /// Set by an explicit [`Channel::read`] call while `auto_read` is off;
    /// consumed (and cleared) by the next `handle_io` readable event so a
    /// one-shot `read()` yields exactly one read cycle instead of silently
    /// re-enabling continuous reads.
    explicit_read_requested: std::sync::atomic::AtomicBool,
    /// The promise for an in-flight nonblocking connect, resolved on the
    /// first writable readiness event per the standard
    /// connect-then-poll-writable-then-check-SO_ERROR protocol.
    pending_connect_slot: PlMutex<Option<Promise<(), Arc<CoreError>>>>,
}

/// A single network connection (or listening acceptor), owning exactly one
/// pipeline and, once registered, exactly one event loop. Cheap to clone.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish()
    }
}

impl Channel {
    /// Constructs a fresh, unregistered channel with no underlying socket
    /// yet — the shape a `Bootstrap` starts from before `bind`/`connect`.
    pub fn new() -> Channel {
        let inner = Arc::new_cyclic(|weak: &Weak<ChannelInner>| {
            let unsafe_ops: Weak<dyn ChannelUnsafe> = weak.clone() as Weak<dyn ChannelUnsafe>;
            ChannelInner {
                id: ChannelId::next(),
                state: AtomicU8::new(ChannelState::Unregistered as u8),
                pipeline: Pipeline::new(unsafe_ops),
                config: PlMutex::new(ChannelConfig::default()),
                attributes: AttributeMap::new(),
                event_loop: PlMutex::new(None),
                registration: PlMutex::new(None),
                socket: PlMutex::new(Socket::Unbound),
                outbound: PlMutex::new(OutboundBuffer::new(ChannelConfig::default().write_buffer_water_mark)),
                local_addr: PlMutex::new(None),
                remote_addr: PlMutex::new(None),
                reading: std::sync::atomic::AtomicBool::new(false),
                explicit_read_requested: std::sync::atomic::AtomicBool::new(false),
                pending_connect_slot: PlMutex::new(None),
            }
        });
        Channel { inner }
    }

    /// Wraps an already-connected stream, e.g. one just returned by
    /// `TcpListener::accept` on a server channel. Used by [`crate::bootstrap`]
    /// when spawning a child channel.
    pub(crate) fn from_accepted_stream(stream: TcpStream, local: SocketAddr, remote: SocketAddr) -> Channel {
        let channel = Channel::new();
        let _ = stream.set_nonblocking(true);
        *channel.inner.socket.lock() = Socket::Stream(stream);
        *channel.inner.local_addr.lock() = Some(local);
        *channel.inner.remote_addr.lock() = Some(remote);
        channel
    }

    pub fn id(&self) -> ChannelId {
        self.inner.id
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.inner.pipeline
    }

    pub fn attributes(&self) -> &AttributeMap {
        &self.inner.attributes
    }

    pub fn config(&self) -> ChannelConfig {
        self.inner.config.lock().clone()
    }

    pub fn set_config(&self, config: ChannelConfig) {
        self.inner.outbound.lock().set_water_mark(config.write_buffer_water_mark);
        if let Some(fd) = self.inner.socket.lock().raw_fd() {
            apply_socket_options(fd, &config);
        }
        *self.inner.config.lock() = config;
    }

    pub fn state(&self) -> ChannelState {
        ChannelState::from(self.inner.state.load(Ordering::Acquire))
    }

    pub fn is_active(&self) -> bool {
        self.state() == ChannelState::Active
    }

    pub fn is_writable(&self) -> bool {
        self.inner.outbound.lock().is_writable()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.inner.local_addr.lock()
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        *self.inner.remote_addr.lock()
    }

    pub fn event_loop(&self) -> Option<EventLoop> {
        self.inner.event_loop.lock().clone()
    }

    fn new_promise(&self) -> Promise<(), Arc<CoreError>> {
        let executor: Arc<dyn Executor> = match self.event_loop() {
            Some(lp) => Arc::new(lp),
            None => Arc::new(ImmediateExecutor),
        };
        Promise::new(executor)
    }

    // ---- public outbound operations: enter the pipeline at Tail ----

    pub fn bind(&self, local: SocketAddr) -> Promise<(), Arc<CoreError>> {
        let promise = self.new_promise();
        self.inner.pipeline.bind(local, promise.clone());
        promise
    }

    pub fn connect(&self, remote: SocketAddr) -> Promise<(), Arc<CoreError>> {
        self.connect_from(remote, None)
    }

    /// As [`Channel::connect`], binding the local side to `local` first.
    /// [`crate::bootstrap::Bootstrap`] is the only caller that ever supplies
    /// `local`; everyday users reach for `connect`.
    pub fn connect_from(&self, remote: SocketAddr, local: Option<SocketAddr>) -> Promise<(), Arc<CoreError>> {
        let promise = self.new_promise();
        self.inner.pipeline.connect(remote, local, promise.clone());
        promise
    }

    pub fn close(&self) -> Promise<(), Arc<CoreError>> {
        let promise = self.new_promise();
        self.inner.pipeline.close(promise.clone());
        promise
    }

    pub fn deregister(&self) -> Promise<(), Arc<CoreError>> {
        let promise = self.new_promise();
        self.inner.pipeline.deregister(promise.clone());
        promise
    }

    /// Re-arms interest in `READABLE`. Only meaningful when `auto_read` is
    /// disabled; auto-read channels re-arm themselves after every
    /// `channelReadComplete`.
    pub fn read(&self) {
        self.inner.pipeline.read();
    }

    pub fn write<T: std::any::Any + Send>(&self, msg: T) -> Promise<(), Arc<CoreError>> {
        let promise = self.new_promise();
        self.inner.pipeline.write(Box::new(msg), promise.clone());
        promise
    }

    pub fn write_and_flush<T: std::any::Any + Send>(&self, msg: T) -> Promise<(), Arc<CoreError>> {
        let promise = self.write(msg);
        self.flush();
        promise
    }

    pub fn flush(&self) {
        self.inner.pipeline.flush();
    }

    /// Registers this channel with an event loop and fires the
    /// `channelRegistered` lifecycle event. Called once by a `Bootstrap`,
    /// after the transport-level `bind`/`connect` has already produced a
    /// real file descriptor (an accepted child channel has one the moment
    /// `accept()` returns it; a client/listener channel gets one from the
    /// synchronous `bind`/nonblocking-`connect` call that precedes this).
    pub(crate) fn register(&self, event_loop: EventLoop, interests: Interest) -> Result<(), Arc<CoreError>> {
        let fd = self
            .inner
            .socket
            .lock()
            .raw_fd()
            .ok_or_else(|| Arc::new(CoreError::registration("channel has no underlying fd to register")))?;

        let handler: Arc<dyn IoHandler> = self.inner.clone();
        let registration = event_loop
            .register_io(fd, interests, handler)
            .map_err(Arc::new)?;

        *self.inner.registration.lock() = Some(registration);
        self.inner.pipeline.set_executor(Arc::new(event_loop.clone()));
        *self.inner.event_loop.lock() = Some(event_loop);
        self.inner
            .state
            .store(ChannelState::Registered as u8, Ordering::Release);
        self.inner.pipeline.fire_channel_registered();
        Ok(())
    }

    /// Fires `channelActive` and, if auto-read, arms the first read. Called
    /// internally after a synchronous `bind`/`connect` transport completion,
    /// and by [`crate::bootstrap`] for a freshly accepted child channel,
    /// which is already connected the moment it is registered.
    pub(crate) fn mark_active(&self) {
        self.inner.state.store(ChannelState::Active as u8, Ordering::Release);
        self.inner.pipeline.fire_channel_active();
        if self.inner.config.lock().auto_read {
            self.begin_read();
        }
    }

    fn begin_read(&self) {
        if self.inner.reading.swap(true, Ordering::AcqRel) {
            return;
        }
        if let (Some(registration), Some(event_loop)) =
            (*self.inner.registration.lock(), self.event_loop())
        {
            let _ = event_loop.reregister_io(registration, Interest::READABLE | Interest::WRITABLE);
        }
    }
}

impl Default for Channel {
    fn default() -> Channel {
        Channel::new()
    }
}

// ---- the low-level operations Head actually executes ----

impl ChannelUnsafe for ChannelInner {
    fn bind(&self, local: SocketAddr, promise: Promise<(), Arc<CoreError>>) {
        let listener = match TcpListener::bind(local) {
            Ok(l) => l,
            Err(e) => {
                let _ = promise.set_failure(Arc::new(CoreError::Io(e)));
                return;
            }
        };
        if let Err(e) = listener.set_nonblocking(true) {
            let _ = promise.set_failure(Arc::new(CoreError::Io(e)));
            return;
        }
        apply_socket_options(listener.as_raw_fd(), &self.config.lock());
        *self.local_addr.lock() = listener.local_addr().ok();
        *self.socket.lock() = Socket::Listener(listener);
        self.state.store(ChannelState::Active as u8, Ordering::Release);
        self.pipeline.fire_channel_active();
        let _ = promise.set_success(());
        // A listening channel starts accepting immediately; driven by
        // `handle_io` readable events once the caller registers it.
    }

    fn connect(&self, remote: SocketAddr, local: Option<SocketAddr>, promise: Promise<(), Arc<CoreError>>) {
        let connect_result = connect_nonblocking(remote, local, &self.config.lock());
        match connect_result {
            Ok(stream) => {
                *self.remote_addr.lock() = Some(remote);
                *self.local_addr.lock() = stream.local_addr().ok();
                *self.socket.lock() = Socket::Stream(stream);
                // Completion (or failure) is observed on the next writable
                // readiness event via `SO_ERROR`, per the standard
                // nonblocking-connect protocol; stash the promise until then.
                self.pending_connect().replace(promise);
            }
            Err(e) => {
                let _ = promise.set_failure(Arc::new(CoreError::Io(e)));
            }
        }
    }

    fn disconnect(&self, promise: Promise<(), Arc<CoreError>>) {
        self.close(promise);
    }

    fn close(&self, promise: Promise<(), Arc<CoreError>>) {
        self.close_internal();
        let _ = promise.try_success(());
    }

    fn deregister(&self, promise: Promise<(), Arc<CoreError>>) {
        if let (Some(registration), Some(event_loop)) = (self.registration.lock().take(), self.event_loop_clone()) {
            event_loop.deregister_io(registration);
        }
        let _ = promise.set_success(());
    }

    fn read(&self) {
        self.explicit_read_requested.store(true, Ordering::Release);
        if let (Some(registration), Some(event_loop)) = (*self.registration.lock(), self.event_loop_clone()) {
            let _ = event_loop.reregister_io(registration, Interest::READABLE | Interest::WRITABLE);
        }
    }

    fn write(&self, msg: Message, promise: Promise<(), Arc<CoreError>>) {
        let bytes = match msg.downcast::<Vec<u8>>() {
            Ok(bytes) => *bytes,
            Err(_) => {
                let _ = promise.set_failure(Arc::new(CoreError::configuration(
                    "corvid's TCP transport only accepts Vec<u8> outbound messages",
                )));
                return;
            }
        };
        let became_unwritable = self.outbound.lock().push(bytes, promise);
        if became_unwritable {
            self.pipeline.fire_channel_writability_changed();
        }
    }

    fn flush(&self) {
        self.do_flush();
    }
}

impl ChannelInner {
    fn event_loop_clone(&self) -> Option<EventLoop> {
        self.event_loop.lock().clone()
    }

    fn pending_connect(&self) -> parking_lot::MutexGuard<'_, Option<Promise<(), Arc<CoreError>>>> {
        self.pending_connect_slot.lock()
    }

    fn do_flush(&self) {
        let spin_count = self.config.lock().write_spin_count;
        let mut socket = self.socket.lock();
        let result = match &mut *socket {
            Socket::Stream(stream) => Some(self.outbound.lock().flush(spin_count, |buf| stream.write(buf))),
            _ => None,
        };
        drop(socket);
        if let Some((_, flipped_writable, error)) = result {
            if flipped_writable {
                self.pipeline.fire_channel_writability_changed();
            }
            if let Some(err) = error {
                if self.config.lock().auto_close {
                    self.pipeline.fire_exception_caught((*err).clone_for_pipeline());
                    self.close(Promise::new(Arc::new(ImmediateExecutor)));
                } else {
                    self.pipeline.fire_exception_caught((*err).clone_for_pipeline());
                }
            }
        }
    }
}

fn connect_nonblocking(remote: SocketAddr, local: Option<SocketAddr>, config: &ChannelConfig) -> io::Result<TcpStream> {
    use socket2::{Domain, Socket as Socket2, Type};

    let domain = match remote {
        SocketAddr::V4(_) => Domain::IPV4,
        SocketAddr::V6(_) => Domain::IPV6,
    };
    let socket = Socket2::new(domain, Type::STREAM, None)?;
    socket.set_nonblocking(true)?;
    apply_socket2_options(&socket, config);
    if let Some(local) = local {
        socket.bind(&local.into())?;
    }
    match socket.connect(&remote.into()) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::WouldBlock || e.raw_os_error() == Some(libc::EINPROGRESS) => {}
        Err(e) => return Err(e),
    }
    Ok(unsafe { TcpStream::from_raw_fd(socket.into_raw_fd()) })
}

/// Applies the backend socket options
/// (`TCP_NODELAY`, `SO_KEEPALIVE`, `SO_REUSEADDR`, `SO_SNDBUF`, `SO_RCVBUF`,
/// `SO_LINGER`) to an already-open fd, e.g. the listener `bind` creates or a
/// stream `accept` hands back. `IP_TOS` and `ALLOW_HALF_CLOSURE` are stored
/// in [`ChannelConfig`] but have no portable `socket2` setter corvid's TCP
/// transport applies at this layer; codec/transport authors that need them
/// read the value back off `Channel::config()` directly.
fn apply_socket_options(fd: RawFd, config: &ChannelConfig) {
    let socket = unsafe { socket2::Socket::from_raw_fd(fd) };
    apply_socket2_options(&socket, config);
    std::mem::forget(socket); // `fd` is still owned by the caller's std type.
}

fn apply_socket2_options(socket: &socket2::Socket, config: &ChannelConfig) {
    if let Err(e) = socket.set_nodelay(config.tcp_nodelay) {
        log_warn!("failed to apply TCP_NODELAY: {e}");
    }
    if let Err(e) = socket.set_keepalive(config.so_keepalive) {
        log_warn!("failed to apply SO_KEEPALIVE: {e}");
    }
    if let Err(e) = socket.set_reuse_address(config.so_reuseaddr) {
        log_warn!("failed to apply SO_REUSEADDR: {e}");
    }
    if let Some(secs) = config.so_linger {
        if let Err(e) = socket.set_linger(Some(Duration::from_secs(secs as u64))) {
            log_warn!("failed to apply SO_LINGER: {e}");
        }
    }
    if let Some(sndbuf) = config.so_sndbuf {
        if let Err(e) = socket.set_send_buffer_size(sndbuf as usize) {
            log_warn!("failed to apply SO_SNDBUF: {e}");
        }
    }
    if let Some(rcvbuf) = config.so_rcvbuf {
        if let Err(e) = socket.set_recv_buffer_size(rcvbuf as usize) {
            log_warn!("failed to apply SO_RCVBUF: {e}");
        }
    }
}

// ---- readiness dispatch: invoked by the owning event loop's reactor ----

impl IoHandler for ChannelInner {
    fn handle_io(&self, ready: ReadyOps) {
        if ready.error || ready.read_closed {
            self.handle_stream_close();
            return;
        }

        // A pending nonblocking connect completes on the first writable
        // event; check and resolve it before treating the event as a
        // regular data-writable signal.
        if let Some(promise) = self.take_completed_connect(ready) {
            return self.finish_connect(promise);
        }

        let auto_read = self.config.lock().auto_read;
        let is_listener = matches!(&*self.socket.lock(), Socket::Listener(_));
        if ready.readable {
            // With auto-read off, a readable event only proceeds if it was
            // explicitly requested by `read()`; otherwise the interest mask
            // itself already omits `READABLE`, so this only guards a stray
            // wakeup from an interest that hasn't been disarmed yet.
            let should_read = auto_read || self.explicit_read_requested.swap(false, Ordering::AcqRel);
            if should_read && is_listener {
                self.accept_loop();
            } else if should_read {
                self.read_loop();
            }
        }
        if ready.writable {
            self.do_flush();
        }
    }

    fn on_loop_shutdown(&self) {
        self.close_internal();
    }
}

impl ChannelInner {
    /// The one teardown path every close trigger funnels through: a user
    /// `close()`/`disconnect()`, a write failure under `auto_close`, or this
    /// module's own detection of peer EOF/error. Idempotent — a second call
    /// after the channel is already `Closed` is a no-op — and always
    /// deregisters from the reactor so a closed fd never lingers in the
    /// event loop's handler map or kernel interest set.
    fn close_internal(&self) {
        let prior = self.state.swap(ChannelState::Closed as u8, Ordering::AcqRel);
        if prior == ChannelState::Closed as u8 {
            return;
        }
        self.outbound.lock().fail_all(Arc::new(CoreError::ChannelClosed));
        if let (Some(registration), Some(event_loop)) = (self.registration.lock().take(), self.event_loop_clone()) {
            event_loop.deregister_io(registration);
        }
        *self.socket.lock() = Socket::Unbound;
        if prior == ChannelState::Active as u8 {
            self.pipeline.fire_channel_inactive();
        }
        self.pipeline.fire_channel_unregistered();
    }

    fn handle_stream_close(&self) {
        self.close_internal();
    }

    fn take_completed_connect(&self, ready: ReadyOps) -> Option<Promise<(), Arc<CoreError>>> {
        if !ready.writable {
            return None;
        }
        let pending = self.pending_connect_slot.lock().take();
        pending
    }

    fn finish_connect(&self, promise: Promise<(), Arc<CoreError>>) {
        let error = match &*self.socket.lock() {
            Socket::Stream(stream) => socket_error(stream),
            _ => None,
        };
        match error {
            Some(e) => {
                let err = Arc::new(CoreError::Io(e));
                let _ = promise.set_failure(err.clone());
                self.pipeline.fire_exception_caught((*err).clone_for_pipeline());
            }
            None => {
                let _ = promise.set_success(());
                self.state.store(ChannelState::Active as u8, Ordering::Release);
                self.pipeline.fire_channel_active();
            }
        }
    }

    fn read_loop(&self) {
        let recycler = read_buffer_recycler();
        loop {
            let mut handle = recycler.acquire();
            let read = {
                let mut socket = self.socket.lock();
                match &mut *socket {
                    Socket::Stream(stream) => stream.read(&mut handle[..]),
                    _ => return,
                }
            };
            match read {
                Ok(0) => {
                    self.handle_stream_close();
                    break;
                }
                Ok(n) => {
                    let chunk = handle[..n].to_vec();
                    let _ = handle.recycle();
                    self.pipeline.fire_channel_read(Box::new(chunk));
                    if n < READ_BUFFER_SIZE {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    let _ = handle.recycle();
                    break;
                }
                Err(e) => {
                    let _ = handle.recycle();
                    self.pipeline.fire_exception_caught(CoreError::Io(e));
                    self.handle_stream_close();
                    break;
                }
            }
        }
        self.pipeline.fire_channel_read_complete();
        self.rearm_or_disarm_read();
    }

    fn accept_loop(&self) {
        loop {
            let accepted = {
                let socket = self.socket.lock();
                match &*socket {
                    Socket::Listener(listener) => listener.accept(),
                    _ => return,
                }
            };
            match accepted {
                Ok((stream, remote)) => {
                    let local = self.local_addr.lock().unwrap_or(remote);
                    let _ = stream.set_nonblocking(true);
                    let child = Channel::from_accepted_stream(stream, local, remote);
                    self.pipeline.fire_channel_read(Box::new(child));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    self.pipeline.fire_exception_caught(CoreError::Io(e));
                    break;
                }
            }
        }
        self.pipeline.fire_channel_read_complete();
        self.rearm_or_disarm_read();
    }

    /// Called after every read/accept cycle completes. A continuously
    /// auto-reading channel leaves its interest alone (already armed for
    /// `READABLE`); one armed by an explicit `read()` drops back to
    /// `WRITABLE`-only so the next batch of data needs another explicit
    /// `read()` call instead of arriving on its own.
    fn rearm_or_disarm_read(&self) {
        if self.config.lock().auto_read {
            return;
        }
        if let (Some(registration), Some(event_loop)) = (*self.registration.lock(), self.event_loop_clone()) {
            let _ = event_loop.reregister_io(registration, Interest::WRITABLE);
        }
    }
}

fn socket_error(stream: &TcpStream) -> Option<io::Error> {
    stream.take_error().ok().flatten()
}

/// `CoreError` is deliberately not `Clone` (it wraps `io::Error` and a boxed
/// `dyn Error`); pipeline dispatch of `exceptionCaught` only ever needs a
/// same-shaped copy for logging/handler purposes, so this renders the
/// original into an equivalent, cloneable `Handler` variant instead of
/// threading `Clone` through the whole error enum.
trait ClonableForPipeline {
    fn clone_for_pipeline(&self) -> CoreError;
}

impl ClonableForPipeline for CoreError {
    fn clone_for_pipeline(&self) -> CoreError {
        CoreError::handler(io::Error::new(io::ErrorKind::Other, self.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ChannelOption;

    #[test]
    fn unregistered_channel_starts_inactive_and_writable() {
        let channel = Channel::new();
        assert_eq!(channel.state(), ChannelState::Unregistered);
        assert!(!channel.is_active());
        assert!(channel.is_writable());
    }

    #[test]
    fn bind_without_event_loop_still_binds_synchronously() {
        let channel = Channel::new();
        let promise = channel.bind("127.0.0.1:0".parse().unwrap());
        promise.sync(None).unwrap();
        assert!(channel.is_active());
        assert!(channel.local_addr().is_some());
    }

    #[test]
    fn set_config_updates_water_mark() {
        let channel = Channel::new();
        let mut cfg = channel.config();
        cfg.set_option(ChannelOption::TcpNodelay(true)).unwrap();
        channel.set_config(cfg);
        assert!(channel.config().tcp_nodelay);
    }

    #[test]
    fn handler_added_sees_registered_channel_through_pipeline() {
        struct Seen {
            flag: Arc<std::sync::atomic::AtomicBool>,
        }
        impl Handler for Seen {
            fn channel_active(&mut self, ctx: &HandlerContext) {
                self.flag.store(true, Ordering::SeqCst);
                ctx.fire_channel_active();
            }
        }

        let channel = Channel::new();
        let flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
        channel.pipeline().add_last(None, Seen { flag: flag.clone() });
        let promise = channel.bind("127.0.0.1:0".parse().unwrap());
        promise.sync(None).unwrap();
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn write_rejects_non_byte_messages() {
        let channel = Channel::new();
        let promise = channel.bind("127.0.0.1:0".parse().unwrap());
        promise.sync(None).unwrap();
        let write_promise = channel.write(42u32);
        let result = write_promise.sync(None).unwrap();
        assert!(!result.is_success());
    }

}
