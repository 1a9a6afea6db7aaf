//! `Bootstrap::attr` / `ServerBootstrap::child_attr` actually reach the
//! channel's `AttributeMap` through the full create/init choreography, not
//! just `AttributeMap` in isolation (already covered by its own unit tests).
//!
//! Handlers have no way back to their own `Channel` (`HandlerContext` only
//! carries a pipeline position), so
//! these assert through the `Channel` handles the bootstrap APIs hand back
//! directly rather than through a handler callback.

mod util;

use std::time::Duration;

use corvid::{AttributeKey, Bootstrap, Channel, Handler, ServerBootstrap};

#[test]
fn client_attr_reaches_the_connected_channel() {
    let key: AttributeKey<&'static str> = AttributeKey::new();
    let client_group = util::group(1);
    let server_group = util::group(1);

    struct NoopHandler;
    impl Handler for NoopHandler {}

    let server = ServerBootstrap::new()
        .group_shared(server_group.clone())
        .channel_factory(Channel::new)
        .child_handler(|| NoopHandler);
    let bound = server.bind("127.0.0.1:0".parse().unwrap());
    bound.sync(Some(Duration::from_secs(5))).unwrap();
    let addr = bound.channel().local_addr().unwrap();

    let client = Bootstrap::new()
        .group(client_group.clone())
        .channel_factory(Channel::new)
        .attr(key, "client-tag")
        .handler(|| NoopHandler);

    let connected = client.connect(addr);
    connected.sync(Some(Duration::from_secs(5))).unwrap();

    assert_eq!(connected.channel().attributes().attr(key).get(), Some("client-tag"));

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
fn child_attr_is_set_on_bind_and_never_leaks_onto_the_parent() {
    let key: AttributeKey<u32> = AttributeKey::new();
    let server_group = util::group(1);
    let client_group = util::group(1);

    struct NoopHandler;
    impl Handler for NoopHandler {}

    let server = ServerBootstrap::new()
        .group_shared(server_group.clone())
        .channel_factory(Channel::new)
        .child_attr(key, 77)
        .child_handler(|| NoopHandler);

    let bound = server.bind("127.0.0.1:0".parse().unwrap());
    bound.sync(Some(Duration::from_secs(5))).unwrap();
    let addr = bound.channel().local_addr().unwrap();

    // The listening (parent) channel itself never receives a child_attr —
    // it is only ever applied to accepted children.
    assert!(bound.channel().attributes().attr(key).get().is_none());

    let client = Bootstrap::new().group(client_group.clone()).channel_factory(Channel::new).handler(|| NoopHandler);
    let connected = client.connect(addr);
    connected.sync(Some(Duration::from_secs(5))).unwrap();

    // The client's own channel never had `child_attr` applied to it either
    // — that option only reaches the server's accepted children.
    assert!(connected.channel().attributes().attr(key).get().is_none());

    server_group
        .shutdown_gracefully(Duration::from_millis(50), Duration::from_secs(5))
        .sync(Some(Duration::from_secs(10)))
        .unwrap();
    client_group
        .shutdown_gracefully(Duration::from_millis(50), Duration::from_secs(5))
        .sync(Some(Duration::from_secs(10)))
        .unwrap();
}
