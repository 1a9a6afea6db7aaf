//! The async create -> init -> register -> bind/connect choreography.
//!
//! Grounded on Netty's `Bootstrap`/`ServerBootstrap` pair; corvid keeps the
//! two as genuinely separate types rather than Netty's single type
//! that tolerates a `null` handler on the server-only path — [`Bootstrap`]
//! always requires a handler, and [`ServerBootstrap`] always requires a
//! *child* handler, with a separate, optional acceptor-side handler for the
//! listening channel itself. See `DESIGN.md` for the full writeup of this
//! decision, and for why `bind`/`connect` return a [`ChannelFuture`] rather
//! than a bare promise (mirroring Netty's own `ChannelFuture.channel()`).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::attributes::{AttributeKey, AttributeMap};
use crate::channel::{initial_interest, Channel, Handler, HandlerContext, Message};
use crate::error::CoreError;
use crate::event_loop_group::EventLoopGroup;
use crate::options::{ChannelConfig, ChannelOption};
use crate::promise::{ImmediateExecutor, PendingRegistrationExecutor, Promise, PromiseResult};
use crate::resolver::NameResolver;

type ChannelFactory = Arc<dyn Fn() -> Channel + Send + Sync>;
type HandlerFactory = Arc<dyn Fn() -> Box<dyn Handler> + Send + Sync>;
type AttributeSetter = Arc<dyn Fn(&AttributeMap) + Send + Sync>;

/// The result of a `Bootstrap`/`ServerBootstrap` `connect`/`bind` call: the
/// channel it acted on, paired with the promise tracking that specific
/// operation's completion. Netty's `ChannelFuture.channel()` plays the same
/// role — callers that only care about success/failure use this exactly
/// like a plain promise; callers that need the channel itself (to hold onto
/// a listening socket, inspect `local_addr()`, or close it later) have it
/// without digging through a listener closure.
#[derive(Clone)]
pub struct ChannelFuture {
    channel: Channel,
    promise: Promise<(), Arc<CoreError>>,
}

impl ChannelFuture {
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn promise(&self) -> &Promise<(), Arc<CoreError>> {
        &self.promise
    }

    pub fn is_done(&self) -> bool {
        self.promise.is_done()
    }

    pub fn sync(&self, timeout: Option<Duration>) -> crate::error::CoreResult<PromiseResult<(), Arc<CoreError>>> {
        self.promise.sync(timeout)
    }

    pub fn add_listener<F>(&self, listener: F)
    where
        F: FnOnce(PromiseResult<(), Arc<CoreError>>) + Send + 'static,
    {
        self.promise.add_listener(listener);
    }
}

fn close_on_failure(channel: Channel, outer: Promise<(), Arc<CoreError>>) -> impl FnOnce(PromiseResult<(), Arc<CoreError>>) {
    move |result| match result {
        PromiseResult::Success(()) => {
            let _ = outer.set_success(());
        }
        PromiseResult::Failure(e) => {
            channel.close();
            let _ = outer.set_failure(e);
        }
        PromiseResult::Cancelled => {
            channel.close();
            let _ = outer.set_failure(Arc::new(CoreError::Cancelled));
        }
    }
}

fn apply_options_and_attributes(channel: &Channel, options: &[ChannelOption], attributes: &[AttributeSetter]) {
    let mut config = channel.config();
    for option in options {
        if config.set_option(*option).is_err() {
            log_warn!("bootstrap applied an option {option} the channel config rejected");
        }
    }
    channel.set_config(config);
    for setter in attributes {
        (**setter)(channel.attributes());
    }
}

/// Arms [`CoreError::Timeout`] on `promise` after `config.connect_timeout_millis`,
/// unless the connect has already resolved by then. Spec §5 "Connect
/// operations honor the `CONNECT_TIMEOUT_MILLIS` option".
fn arm_connect_timeout(channel: &Channel, promise: &Promise<(), Arc<CoreError>>) {
    let timeout_millis = channel.config().connect_timeout_millis;
    if timeout_millis == 0 {
        return;
    }
    if let Some(event_loop) = channel.event_loop() {
        let promise = promise.clone();
        let _ = event_loop.schedule(Duration::from_millis(timeout_millis as u64), move || {
            let _ = promise.try_failure(Arc::new(CoreError::Timeout));
        });
    }
}

/// Builder for a client-side channel: construct, configure, register with
/// an [`EventLoopGroup`], then `connect`. Spec §4.H "Client flow".
#[derive(Clone, Default)]
pub struct Bootstrap {
    group: Option<EventLoopGroup>,
    channel_factory: Option<ChannelFactory>,
    options: Vec<ChannelOption>,
    attributes: Vec<AttributeSetter>,
    handler: Option<HandlerFactory>,
    resolver: Option<Arc<dyn NameResolver>>,
}

impl Bootstrap {
    pub fn new() -> Bootstrap {
        Bootstrap::default()
    }

    pub fn group(mut self, group: EventLoopGroup) -> Self {
        self.group = Some(group);
        self
    }

    /// Supplies the factory that constructs a fresh, unregistered [`Channel`]
    /// for every `connect` call. corvid's core has one concrete transport
    /// (TCP), so most callers pass `Channel::new`.
    pub fn channel_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Channel + Send + Sync + 'static,
    {
        self.channel_factory = Some(Arc::new(factory));
        self
    }

    pub fn option(mut self, option: ChannelOption) -> Self {
        self.options.push(option);
        self
    }

    /// Writes `value` into the channel's attribute map at init time. Spec
    /// §4.H "Per-attribute: write into the channel's attribute map."
    pub fn attr<T>(mut self, key: AttributeKey<T>, value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        self.attributes.push(Arc::new(move |map: &AttributeMap| {
            map.attr(key).set(value.clone());
        }));
        self
    }

    /// The handler factory invoked once per channel (every `connect` gets
    /// its own handler instance, matching Netty's `ChannelInitializer`
    /// semantics of "one initializer, fresh handlers per channel").
    pub fn handler<H, F>(mut self, factory: F) -> Self
    where
        H: Handler,
        F: Fn() -> H + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(move || Box::new(factory()) as Box<dyn Handler>));
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn NameResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    fn validate(&self) -> Result<(EventLoopGroup, ChannelFactory, HandlerFactory), Arc<CoreError>> {
        let group = self
            .group
            .clone()
            .ok_or_else(|| Arc::new(CoreError::configuration("bootstrap has no event loop group")))?;
        let factory = self
            .channel_factory
            .clone()
            .ok_or_else(|| Arc::new(CoreError::configuration("bootstrap has no channel factory")))?;
        let handler = self
            .handler
            .clone()
            .ok_or_else(|| Arc::new(CoreError::configuration("bootstrap has no handler")))?;
        Ok((group, factory, handler))
    }

    pub fn connect(&self, remote: SocketAddr) -> ChannelFuture {
        self.connect_from(remote, None)
    }

    /// Spec §4.H "Client flow for `connect(remote)`", steps 1-7.
    pub fn connect_from(&self, remote: SocketAddr, local: Option<SocketAddr>) -> ChannelFuture {
        let (group, factory, handler) = match self.validate() {
            Ok(v) => v,
            Err(e) => {
                let channel = Channel::new();
                let outer = Promise::new(Arc::new(ImmediateExecutor));
                let _ = outer.set_failure(e);
                return ChannelFuture { channel, promise: outer };
            }
        };

        // Steps 2-3: create the channel, apply options/attributes/handler.
        let channel = (*factory)();
        apply_options_and_attributes(&channel, &self.options, &self.attributes);
        channel.pipeline().add_last_boxed(None, (*handler)());

        // `outer` is returned to the caller before the channel has an event
        // loop: its executor starts as a `PendingRegistrationExecutor`
        // (spec §4.C) and is pointed at the real loop the moment registration
        // below succeeds, so a later `sync()` from a handler running on that
        // loop still deadlock-detects instead of snapshotting "no loop yet".
        let pending_executor = PendingRegistrationExecutor::new();
        let outer = Promise::new(pending_executor.clone());

        // Steps 4-7: resolve the remote address if a resolver is configured
        // and it claims this address needs resolving, then connect (which
        // opens the real socket) and register it with the group.
        match &self.resolver {
            Some(resolver) if resolver.should_resolve(&remote) => {
                let channel_for_resolve = channel.clone();
                let outer_for_resolve = outer.clone();
                let group = group.clone();
                let pending_executor = pending_executor.clone();
                resolver.resolve(remote).add_listener(move |result| match result {
                    PromiseResult::Success(resolved) => {
                        connect_and_register(channel_for_resolve, resolved, local, group, pending_executor, outer_for_resolve);
                    }
                    PromiseResult::Failure(e) => {
                        channel_for_resolve.close();
                        let _ = outer_for_resolve.set_failure(e);
                    }
                    PromiseResult::Cancelled => {
                        channel_for_resolve.close();
                        let _ = outer_for_resolve.set_failure(Arc::new(CoreError::Cancelled));
                    }
                });
            }
            _ => connect_and_register(channel.clone(), remote, local, group, pending_executor, outer.clone()),
        }

        ChannelFuture { channel, promise: outer }
    }
}

/// Steps 4-7: open the nonblocking socket (so a real fd exists to hand the
/// reactor), register it with a loop from `group` using an interest mask
/// that respects `AUTO_READ`, then arm the `CONNECT_TIMEOUT_MILLIS` deadline
/// and a `CloseOnFailure` listener on the connect's own completion.
fn connect_and_register(
    channel: Channel,
    remote: SocketAddr,
    local: Option<SocketAddr>,
    group: EventLoopGroup,
    pending_executor: Arc<PendingRegistrationExecutor>,
    outer: Promise<(), Arc<CoreError>>,
) {
    let connect_promise = channel.connect_from(remote, local);
    if connect_promise.is_done() {
        // The nonblocking connect failed synchronously (e.g. rejected before
        // reaching `EINPROGRESS`) — there is no fd to register.
        channel.close();
        let cause = match connect_promise.sync(None) {
            Ok(PromiseResult::Failure(e)) => e,
            _ => Arc::new(CoreError::ChannelClosed),
        };
        let _ = outer.set_failure(cause);
        return;
    }

    let event_loop = group.next();
    let interests = initial_interest(channel.config().auto_read);
    if let Err(e) = channel.register(event_loop.clone(), interests) {
        channel.close();
        let _ = outer.set_failure(e);
        return;
    }
    pending_executor.registered(Arc::new(event_loop));

    arm_connect_timeout(&channel, &connect_promise);
    connect_promise.add_listener(close_on_failure(channel, outer));
}

/// Builder for a listening channel plus its accepted children. Spec §4.H
/// "Server flow for `bind(local)`": identical to the client flow through
/// registration, then `bind` instead of `connect` (no resolution step), with
/// a dedicated acceptor handler that applies child options/attributes/handler
/// and registers each accepted channel with the child group.
#[derive(Clone, Default)]
pub struct ServerBootstrap {
    group: Option<EventLoopGroup>,
    child_group: Option<EventLoopGroup>,
    channel_factory: Option<ChannelFactory>,
    options: Vec<ChannelOption>,
    attributes: Vec<AttributeSetter>,
    /// Optional handler installed on the listening channel itself, ahead of
    /// the acceptor. Most servers have none; corvid still requires the
    /// *child* handler unconditionally.
    handler: Option<HandlerFactory>,
    child_options: Vec<ChannelOption>,
    child_attributes: Vec<AttributeSetter>,
    child_handler: Option<HandlerFactory>,
}

impl ServerBootstrap {
    pub fn new() -> ServerBootstrap {
        ServerBootstrap::default()
    }

    pub fn group(mut self, group: EventLoopGroup) -> Self {
        self.group = Some(group);
        self
    }

    /// Sets both the parent (acceptor) and child group to the same group,
    /// the common single-group server topology.
    pub fn group_shared(mut self, group: EventLoopGroup) -> Self {
        self.group = Some(group.clone());
        self.child_group = Some(group);
        self
    }

    pub fn child_group(mut self, group: EventLoopGroup) -> Self {
        self.child_group = Some(group);
        self
    }

    pub fn channel_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Channel + Send + Sync + 'static,
    {
        self.channel_factory = Some(Arc::new(factory));
        self
    }

    pub fn option(mut self, option: ChannelOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn attr<T>(mut self, key: AttributeKey<T>, value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        self.attributes.push(Arc::new(move |map: &AttributeMap| {
            map.attr(key).set(value.clone());
        }));
        self
    }

    pub fn handler<H, F>(mut self, factory: F) -> Self
    where
        H: Handler,
        F: Fn() -> H + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(move || Box::new(factory()) as Box<dyn Handler>));
        self
    }

    pub fn child_option(mut self, option: ChannelOption) -> Self {
        self.child_options.push(option);
        self
    }

    pub fn child_attr<T>(mut self, key: AttributeKey<T>, value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        self.child_attributes.push(Arc::new(move |map: &AttributeMap| {
            map.attr(key).set(value.clone());
        }));
        self
    }

    pub fn child_handler<H, F>(mut self, factory: F) -> Self
    where
        H: Handler,
        F: Fn() -> H + Send + Sync + 'static,
    {
        self.child_handler = Some(Arc::new(move || Box::new(factory()) as Box<dyn Handler>));
        self
    }

    fn validate(&self) -> Result<(EventLoopGroup, EventLoopGroup, ChannelFactory, HandlerFactory), Arc<CoreError>> {
        let group = self
            .group
            .clone()
            .ok_or_else(|| Arc::new(CoreError::configuration("server bootstrap has no event loop group")))?;
        let child_group = self.child_group.clone().unwrap_or_else(|| group.clone());
        let factory = self
            .channel_factory
            .clone()
            .ok_or_else(|| Arc::new(CoreError::configuration("server bootstrap has no channel factory")))?;
        let child_handler = self
            .child_handler
            .clone()
            .ok_or_else(|| Arc::new(CoreError::configuration("server bootstrap has no child handler")))?;
        Ok((group, child_group, factory, child_handler))
    }

    /// Spec §4.H "Server flow for `bind(local)`".
    pub fn bind(&self, local: SocketAddr) -> ChannelFuture {
        let (group, child_group, factory, child_handler) = match self.validate() {
            Ok(v) => v,
            Err(e) => {
                let channel = Channel::new();
                let outer = Promise::new(Arc::new(ImmediateExecutor));
                let _ = outer.set_failure(e);
                return ChannelFuture { channel, promise: outer };
            }
        };

        let channel = (*factory)();
        apply_options_and_attributes(&channel, &self.options, &self.attributes);
        channel.pipeline().add_last(
            None,
            Acceptor {
                child_group,
                child_options: self.child_options.clone(),
                child_attributes: self.child_attributes.clone(),
                child_handler,
            },
        );
        if let Some(handler) = &self.handler {
            channel.pipeline().add_last_boxed(None, (**handler)());
        }

        // `outer`'s executor starts pending the same way a client connect's
        // does: `bind` itself is fully synchronous, so the window is brief,
        // but a handler on the now-known loop must still deadlock-detect a
        // `sync()` on this exact future rather than see a stale snapshot.
        let pending_executor = PendingRegistrationExecutor::new();
        let outer = Promise::new(pending_executor.clone());

        // Open the listening socket first, so a real fd exists to register.
        let bind_promise = channel.bind(local);
        match bind_promise.sync(None) {
            Ok(PromiseResult::Success(())) => {}
            Ok(PromiseResult::Failure(e)) => {
                channel.close();
                let _ = outer.set_failure(e);
                return ChannelFuture { channel, promise: outer };
            }
            _ => {
                channel.close();
                let _ = outer.set_failure(Arc::new(CoreError::ChannelClosed));
                return ChannelFuture { channel, promise: outer };
            }
        }

        let event_loop = group.next();
        let interests = initial_interest(channel.config().auto_read);
        if let Err(e) = channel.register(event_loop.clone(), interests) {
            channel.close();
            let _ = outer.set_failure(e);
            return ChannelFuture { channel, promise: outer };
        }
        pending_executor.registered(Arc::new(event_loop));

        let _ = outer.set_success(());
        ChannelFuture { channel, promise: outer }
    }
}

/// Installed at the tail of a listening channel's pipeline by
/// [`ServerBootstrap::bind`]. `crate::channel`'s `accept_loop` fires each
/// accepted connection into the pipeline as a `channelRead(Channel)` event;
/// this handler is the only thing that knows to intercept that shape and
/// turn it into a fully configured, registered child instead of letting it
/// reach the tail as an unrecognized message.
struct Acceptor {
    child_group: EventLoopGroup,
    child_options: Vec<ChannelOption>,
    child_attributes: Vec<AttributeSetter>,
    child_handler: HandlerFactory,
}

impl Handler for Acceptor {
    fn channel_read(&mut self, ctx: &HandlerContext, msg: Message) {
        let child = match msg.downcast::<Channel>() {
            Ok(child) => *child,
            Err(other) => {
                ctx.fire_channel_read(other);
                return;
            }
        };

        apply_options_and_attributes(&child, &self.child_options, &self.child_attributes);
        child.pipeline().add_last_boxed(None, (*self.child_handler)());

        let event_loop = self.child_group.next();
        let interests = initial_interest(child.config().auto_read);
        match child.register(event_loop, interests) {
            Ok(()) => child.mark_active(),
            Err(e) => log_warn!("failed to register an accepted channel: {e}"),
        }
    }

    fn channel_read_complete(&mut self, ctx: &HandlerContext) {
        ctx.fire_channel_read_complete();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_loop::EventLoopConfig;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;

    #[test]
    fn bootstrap_without_group_fails_configuration() {
        let bootstrap = Bootstrap::new().channel_factory(Channel::new).handler(|| NoopHandler);
        let future = bootstrap.connect("127.0.0.1:1".parse().unwrap());
        let result = future.sync(None).unwrap();
        assert!(!result.is_success());
    }

    #[test]
    fn bootstrap_without_handler_fails_configuration() {
        let group = EventLoopGroup::new(1, EventLoopConfig::default()).unwrap();
        let bootstrap = Bootstrap::new().group(group.clone()).channel_factory(Channel::new);
        let future = bootstrap.connect("127.0.0.1:1".parse().unwrap());
        let result = future.sync(None).unwrap();
        assert!(!result.is_success());
        group
            .shutdown_gracefully(Duration::from_millis(1), Duration::from_secs(1))
            .sync(Some(Duration::from_secs(5)))
            .unwrap();
    }

    struct NoopHandler;
    impl Handler for NoopHandler {}

    #[test]
    fn server_bootstrap_without_child_handler_fails_configuration() {
        let group = EventLoopGroup::new(1, EventLoopConfig::default()).unwrap();
        let server = ServerBootstrap::new().group(group.clone()).channel_factory(Channel::new);
        let future = server.bind("127.0.0.1:0".parse().unwrap());
        let result = future.sync(None).unwrap();
        assert!(!result.is_success());
        group
            .shutdown_gracefully(Duration::from_millis(1), Duration::from_secs(1))
            .sync(Some(Duration::from_secs(5)))
            .unwrap();
    }

    #[test]
    fn client_connects_to_bound_server_and_exchanges_bytes() {
        let server_group = EventLoopGroup::new(1, EventLoopConfig::default()).unwrap();
        let client_group = EventLoopGroup::new(1, EventLoopConfig::default()).unwrap();

        struct Echo;
        impl Handler for Echo {
            fn channel_read(&mut self, ctx: &HandlerContext, msg: Message) {
                if let Ok(bytes) = msg.downcast::<Vec<u8>>() {
                    ctx.write(bytes, Promise::new(Arc::new(ImmediateExecutor)));
                    ctx.flush();
                }
            }
        }

        let server = ServerBootstrap::new()
            .group_shared(server_group.clone())
            .channel_factory(Channel::new)
            .child_handler(|| Echo);

        let bound = server.bind("127.0.0.1:0".parse().unwrap());
        bound.sync(Some(Duration::from_secs(5))).unwrap();
        let server_addr = bound.channel().local_addr().expect("bound channel has a local address");

        let received = Arc::new(StdMutex::new(Vec::new()));
        let got_reply = Arc::new(AtomicBool::new(false));

        struct Capture {
            received: Arc<StdMutex<Vec<u8>>>,
            got_reply: Arc<AtomicBool>,
        }
        impl Handler for Capture {
            fn channel_active(&mut self, ctx: &HandlerContext) {
                ctx.write(Box::new(b"ping".to_vec()), Promise::new(Arc::new(ImmediateExecutor)));
                ctx.flush();
            }
            fn channel_read(&mut self, _ctx: &HandlerContext, msg: Message) {
                if let Ok(bytes) = msg.downcast::<Vec<u8>>() {
                    self.received.lock().unwrap().extend_from_slice(&bytes);
                    self.got_reply.store(true, Ordering::SeqCst);
                }
            }
        }

        let client = Bootstrap::new().group(client_group.clone()).channel_factory(Channel::new).handler({
            let received = received.clone();
            let got_reply = got_reply.clone();
            move || Capture { received: received.clone(), got_reply: got_reply.clone() }
        });

        let connected = client.connect(server_addr);
        connected.sync(Some(Duration::from_secs(5))).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !got_reply.load(Ordering::SeqCst) && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(got_reply.load(Ordering::SeqCst));
        assert_eq!(&*received.lock().unwrap(), b"ping");

        server_group
            .shutdown_gracefully(Duration::from_millis(1), Duration::from_secs(1))
            .sync(Some(Duration::from_secs(5)))
            .unwrap();
        client_group
            .shutdown_gracefully(Duration::from_millis(1), Duration::from_secs(1))
            .sync(Some(Duration::from_secs(5)))
            .unwrap();
    }

    #[test]
    fn auto_read_false_gates_reads_until_explicit_read_is_called() {
        let server_group = EventLoopGroup::new(1, EventLoopConfig::default()).unwrap();
        let client_group = EventLoopGroup::new(1, EventLoopConfig::default()).unwrap();

        struct Greeter;
        impl Handler for Greeter {
            fn channel_active(&mut self, ctx: &HandlerContext) {
                ctx.write(Box::new(b"hello".to_vec()), Promise::new(Arc::new(ImmediateExecutor)));
                ctx.flush();
            }
        }

        let server = ServerBootstrap::new()
            .group_shared(server_group.clone())
            .channel_factory(Channel::new)
            .child_handler(|| Greeter);

        let bound = server.bind("127.0.0.1:0".parse().unwrap());
        bound.sync(Some(Duration::from_secs(5))).unwrap();
        let server_addr = bound.channel().local_addr().expect("bound channel has a local address");

        let received = Arc::new(StdMutex::new(Vec::new()));

        struct Capture {
            received: Arc<StdMutex<Vec<u8>>>,
        }
        impl Handler for Capture {
            fn channel_read(&mut self, _ctx: &HandlerContext, msg: Message) {
                if let Ok(bytes) = msg.downcast::<Vec<u8>>() {
                    self.received.lock().unwrap().extend_from_slice(&bytes);
                }
            }
        }

        let client = Bootstrap::new()
            .group(client_group.clone())
            .channel_factory(Channel::new)
            .option(ChannelOption::AutoRead(false))
            .handler({
                let received = received.clone();
                move || Capture { received: received.clone() }
            });

        let connected = client.connect(server_addr);
        connected.sync(Some(Duration::from_secs(5))).unwrap();
        let channel = connected.channel().clone();

        // The server already wrote and flushed "hello" the moment the child
        // channel went active; give it ample time to land in the client's
        // socket buffer before asserting nothing was delivered.
        std::thread::sleep(Duration::from_millis(300));
        assert!(
            received.lock().unwrap().is_empty(),
            "auto_read=false must not deliver a read before an explicit Channel::read() call"
        );

        channel.read();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while received.lock().unwrap().is_empty() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(&*received.lock().unwrap(), b"hello");

        server_group
            .shutdown_gracefully(Duration::from_millis(1), Duration::from_secs(1))
            .sync(Some(Duration::from_secs(5)))
            .unwrap();
        client_group
            .shutdown_gracefully(Duration::from_millis(1), Duration::from_secs(1))
            .sync(Some(Duration::from_secs(5)))
            .unwrap();
    }

    #[test]
    fn connect_to_refused_port_fails_the_channel_future() {
        let group = EventLoopGroup::new(1, EventLoopConfig::default()).unwrap();

        // Bind and immediately drop a listener to get a port nothing is
        // listening on anymore, then connect to it: the kernel answers with
        // `ECONNREFUSED` on the first writable readiness event, which
        // `ChannelInner::finish_connect` must turn into a failed promise
        // rather than a silent hang.
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let refused_addr = probe.local_addr().unwrap();
        drop(probe);

        let client = Bootstrap::new().group(group.clone()).channel_factory(Channel::new).handler(|| NoopHandler);
        let future = client.connect(refused_addr);
        let result = future.sync(Some(Duration::from_secs(5))).unwrap();
        assert!(!result.is_success());

        group
            .shutdown_gracefully(Duration::from_millis(1), Duration::from_secs(1))
            .sync(Some(Duration::from_secs(5)))
            .unwrap();
    }
}
