//! Several concurrent clients against one `ServerBootstrap`, exercising
//! the invariant that exactly one event loop services each channel by
//! driving the server off a multi-loop group and confirming every client
//! gets its own echo independent of the others.

mod util;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use corvid::promise::{ImmediateExecutor, Promise};
use corvid::{Bootstrap, Channel, Handler, HandlerContext, Message, ServerBootstrap};

use util::Collected;

struct Echo;
impl Handler for Echo {
    fn channel_read(&mut self, ctx: &HandlerContext, msg: Message) {
        if let Ok(bytes) = msg.downcast::<Vec<u8>>() {
            ctx.write(bytes, Promise::new(Arc::new(ImmediateExecutor)));
            ctx.flush();
        }
    }
}

struct Capture {
    tag: Vec<u8>,
    collected: Collected,
}
impl Handler for Capture {
    fn channel_active(&mut self, ctx: &HandlerContext) {
        ctx.write(Box::new(self.tag.clone()), Promise::new(Arc::new(ImmediateExecutor)));
        ctx.flush();
    }

    fn channel_read(&mut self, _ctx: &HandlerContext, msg: Message) {
        if let Ok(bytes) = msg.downcast::<Vec<u8>>() {
            self.collected.extend(&bytes);
        }
    }
}

#[test]
fn ten_concurrent_clients_each_get_their_own_echo() {
    let server_group = util::group(4);
    let client_group = util::group(4);

    let server = ServerBootstrap::new()
        .group_shared(server_group.clone())
        .channel_factory(Channel::new)
        .child_handler(|| Echo);

    let bound = server.bind("127.0.0.1:0".parse().unwrap());
    bound.sync(Some(Duration::from_secs(5))).unwrap();
    let addr = bound.channel().local_addr().unwrap();

    const N: usize = 10;
    let sinks: Vec<Collected> = (0..N).map(|_| Collected::new()).collect();

    for (i, sink) in sinks.iter().enumerate() {
        let tag = format!("client-{i}").into_bytes();
        let sink = sink.clone();
        let client = Bootstrap::new().group(client_group.clone()).channel_factory(Channel::new).handler({
            let tag = tag.clone();
            move || Capture { tag: tag.clone(), collected: sink.clone() }
        });
        let connected = client.connect(addr);
        connected.sync(Some(Duration::from_secs(5))).unwrap();
    }

    for (i, sink) in sinks.iter().enumerate() {
        let expected = format!("client-{i}").into_bytes();
        let got = util::wait_until(Duration::from_secs(5), || sink.snapshot() == expected);
        assert!(got, "client {i} never saw its own tag echoed back, got {:?}", sink.snapshot());
    }

    // Cross-check: no client observed another client's tag.
    let seen_count: usize = sinks.iter().map(Collected::len).sum();
    assert_eq!(seen_count, sinks.iter().enumerate().map(|(i, _)| format!("client-{i}").len()).sum::<usize>());

    server_group
        .shutdown_gracefully(Duration::from_millis(50), Duration::from_secs(5))
        .sync(Some(Duration::from_secs(10)))
        .unwrap();
    client_group
        .shutdown_gracefully(Duration::from_millis(50), Duration::from_secs(5))
        .sync(Some(Duration::from_secs(10)))
        .unwrap();
}

#[test]
fn accept_count_matches_connect_count() {
    let server_group = util::group(2);
    let client_group = util::group(2);

    let accepted = Arc::new(AtomicUsize::new(0));

    struct CountOnActive(Arc<AtomicUsize>);
    impl Handler for CountOnActive {
        fn channel_active(&mut self, _ctx: &HandlerContext) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let server = ServerBootstrap::new().group_shared(server_group.clone()).channel_factory(Channel::new).child_handler({
        let accepted = accepted.clone();
        move || CountOnActive(accepted.clone())
    });
    let bound = server.bind("127.0.0.1:0".parse().unwrap());
    bound.sync(Some(Duration::from_secs(5))).unwrap();
    let addr = bound.channel().local_addr().unwrap();

    struct NoopHandler;
    impl Handler for NoopHandler {}

    for _ in 0..5 {
        let client = Bootstrap::new().group(client_group.clone()).channel_factory(Channel::new).handler(|| NoopHandler);
        client.connect(addr).sync(Some(Duration::from_secs(5))).unwrap();
    }

    let saw_all = util::wait_until(Duration::from_secs(5), || accepted.load(Ordering::SeqCst) == 5);
    assert!(saw_all, "expected 5 accepted children, saw {}", accepted.load(Ordering::SeqCst));

    server_group
        .shutdown_gracefully(Duration::from_millis(50), Duration::from_secs(5))
        .sync(Some(Duration::from_secs(10)))
        .unwrap();
    client_group
        .shutdown_gracefully(Duration::from_millis(50), Duration::from_secs(5))
        .sync(Some(Duration::from_secs(10)))
        .unwrap();
}
