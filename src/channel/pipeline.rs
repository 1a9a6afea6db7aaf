//! The per-channel ordered handler chain.
//!
//! Grounded on Netty's `DefaultChannelPipeline`/`AbstractChannelHandlerContext`
//! pair, re-architected as an arena of tagged nodes addressed by
//! index: nodes live in a `Vec` behind one lock rather than as
//! heap-allocated, pointer-linked objects, and a `HandlerContext` carries an
//! index into that arena instead of a raw pointer to its neighbor.
//!
//! `Head` and `Tail` are ordinary arena slots at fixed indices 0 and 1.
//! `Head`'s outbound methods perform the channel's actual low-level
//! operations (via [`ChannelUnsafe`]) instead of forwarding further — there
//! is nothing upstream of it. `Tail`'s inbound `exception_caught` logs
//! instead of forwarding — there is nothing downstream of it.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex as PlMutex;

use crate::channel::context::HandlerContext;
use crate::channel::handler::{Handler, HandlerFlags, Message, UserEvent};
use crate::error::CoreError;
use crate::promise::{Executor, Promise};

const HEAD_INDEX: usize = 0;
const TAIL_INDEX: usize = 1;

/// The channel's low-level operations, invoked only by the pipeline's Head
/// node and only ever on the owning event loop thread.
pub(crate) trait ChannelUnsafe: Send + Sync {
    fn bind(&self, local: SocketAddr, promise: Promise<(), Arc<CoreError>>);
    fn connect(&self, remote: SocketAddr, local: Option<SocketAddr>, promise: Promise<(), Arc<CoreError>>);
    fn disconnect(&self, promise: Promise<(), Arc<CoreError>>);
    fn close(&self, promise: Promise<(), Arc<CoreError>>);
    fn deregister(&self, promise: Promise<(), Arc<CoreError>>);
    fn read(&self);
    fn write(&self, msg: Message, promise: Promise<(), Arc<CoreError>>);
    fn flush(&self);
}

// Held as a `Weak` rather than an `Arc`: the channel owns the pipeline
// (through `Pipeline`/`PipelineShared`), which owns this node, which would
// otherwise hold the channel alive forever through a strong reference cycle.
struct HeadHandler {
    unsafe_ops: Weak<dyn ChannelUnsafe>,
}

impl HeadHandler {
    fn ops(&self) -> Option<Arc<dyn ChannelUnsafe>> {
        self.unsafe_ops.upgrade()
    }
}

impl Handler for HeadHandler {
    fn flags(&self) -> HandlerFlags {
        HandlerFlags::BOTH
    }

    // Inbound: Head is where the channel injects every lifecycle/data
    // event; the default trait methods already just forward onward, which
    // is exactly right for Head.

    // Outbound: nothing is upstream of Head, so every method here executes
    // the real operation instead of calling `ctx.method()`. If the channel
    // has already been dropped the promise simply fails closed.
    fn bind(&mut self, _ctx: &HandlerContext, local: SocketAddr, promise: Promise<(), Arc<CoreError>>) {
        match self.ops() {
            Some(ops) => ops.bind(local, promise),
            None => { let _ = promise.try_failure(Arc::new(CoreError::ChannelClosed)); }
        }
    }

    fn connect(
        &mut self,
        _ctx: &HandlerContext,
        remote: SocketAddr,
        local: Option<SocketAddr>,
        promise: Promise<(), Arc<CoreError>>,
    ) {
        match self.ops() {
            Some(ops) => ops.connect(remote, local, promise),
            None => { let _ = promise.try_failure(Arc::new(CoreError::ChannelClosed)); }
        }
    }

    fn disconnect(&mut self, _ctx: &HandlerContext, promise: Promise<(), Arc<CoreError>>) {
        match self.ops() {
            Some(ops) => ops.disconnect(promise),
            None => { let _ = promise.try_failure(Arc::new(CoreError::ChannelClosed)); }
        }
    }

    fn close(&mut self, _ctx: &HandlerContext, promise: Promise<(), Arc<CoreError>>) {
        match self.ops() {
            Some(ops) => ops.close(promise),
            None => { let _ = promise.try_success(()); }
        }
    }

    fn deregister(&mut self, _ctx: &HandlerContext, promise: Promise<(), Arc<CoreError>>) {
        match self.ops() {
            Some(ops) => ops.deregister(promise),
            None => { let _ = promise.try_success(()); }
        }
    }

    fn read(&mut self, _ctx: &HandlerContext) {
        if let Some(ops) = self.ops() {
            ops.read();
        }
    }

    fn write(&mut self, _ctx: &HandlerContext, msg: Message, promise: Promise<(), Arc<CoreError>>) {
        match self.ops() {
            Some(ops) => ops.write(msg, promise),
            None => { let _ = promise.try_failure(Arc::new(CoreError::ChannelClosed)); }
        }
    }

    fn flush(&mut self, _ctx: &HandlerContext) {
        if let Some(ops) = self.ops() {
            ops.flush();
        }
    }
}

struct TailHandler;

impl Handler for TailHandler {
    fn flags(&self) -> HandlerFlags {
        HandlerFlags::INBOUND_ONLY
    }

    // Nothing is downstream of Tail: an unhandled exception is logged
    // rather than forwarded into the void.
    fn exception_caught(&mut self, _ctx: &HandlerContext, cause: CoreError) {
        log_warn!("exceptionCaught() reached the tail of the pipeline unhandled: {cause}");
    }
}

/// One arena slot. `prev`/`next` are links in traversal order; `removed`
/// marks a node unlinked-but-possibly-still-mid-invocation (see
/// `PipelineShared::invoke_at` for why the handler is briefly taken out of
/// its cell during a call rather than borrowed for its duration).
struct Node {
    name: String,
    // `None` only while a call into this handler is on the stack; taken out
    // for the call's duration so a handler that removes itself mid-call
    // doesn't need a reentrant lock.
    handler: PlMutex<Option<Box<dyn Handler>>>,
    flags: HandlerFlags,
    prev: usize,
    next: usize,
    removed: std::sync::atomic::AtomicBool,
}

struct Arena {
    nodes: Vec<Node>,
}

/// The shared, reference-counted pipeline state a [`HandlerContext`] walks.
/// Structural mutation (add/remove/replace) is serialized through `arena`'s
/// lock; a traversal only ever holds that lock for the brief pointer-chase,
/// never across a handler invocation, so the snapshot seen by any
/// traversal is consistent.
pub(crate) struct PipelineShared {
    arena: PlMutex<Arena>,
    name_seq: AtomicU64,
    executor: PlMutex<Option<Arc<dyn Executor>>>,
}

impl PipelineShared {
    fn new(unsafe_ops: Weak<dyn ChannelUnsafe>) -> Arc<PipelineShared> {
        let head = Node {
            name: "head".to_string(),
            handler: PlMutex::new(Some(Box::new(HeadHandler { unsafe_ops }))),
            flags: HandlerFlags::BOTH,
            prev: HEAD_INDEX,
            next: TAIL_INDEX,
            removed: std::sync::atomic::AtomicBool::new(false),
        };
        let tail = Node {
            name: "tail".to_string(),
            handler: PlMutex::new(Some(Box::new(TailHandler))),
            flags: HandlerFlags::INBOUND_ONLY,
            prev: HEAD_INDEX,
            next: TAIL_INDEX,
            removed: std::sync::atomic::AtomicBool::new(false),
        };
        Arc::new(PipelineShared {
            arena: PlMutex::new(Arena { nodes: vec![head, tail] }),
            name_seq: AtomicU64::new(0),
            executor: PlMutex::new(None),
        })
    }

    pub(crate) fn node_name(&self, index: usize) -> String {
        self.arena.lock().nodes[index].name.clone()
    }

    fn executor(&self) -> Option<Arc<dyn Executor>> {
        self.executor.lock().clone()
    }

    /// Called once at registration: pipeline mutations requested off-loop
    /// from this point on are redirected onto the channel's event loop.
    pub(crate) fn set_executor(&self, executor: Arc<dyn Executor>) {
        *self.executor.lock() = Some(executor);
    }

    fn run_on_executor_or_now(&self, task: impl FnOnce() + Send + 'static) {
        match self.executor() {
            Some(executor) if !executor.in_executor() => executor.execute(Box::new(task)),
            _ => task(),
        }
    }

    // ---- structural mutation ----

    fn unique_name(&self, requested: Option<String>, type_hint: &'static str) -> String {
        if let Some(name) = requested {
            return name;
        }
        let short = type_hint.rsplit("::").next().unwrap_or(type_hint);
        let seq = self.name_seq.fetch_add(1, Ordering::Relaxed);
        format!("{short}#{seq}")
    }

    fn insert(&self, before: usize, name: String, flags: HandlerFlags, handler: Box<dyn Handler>) -> usize {
        let mut arena = self.arena.lock();
        for node in arena.nodes.iter() {
            if !node.removed.load(Ordering::Acquire) && node.name == name {
                panic!("duplicate pipeline handler name: {name}");
            }
        }
        let after = arena.nodes[before].prev;
        let index = arena.nodes.len();
        arena.nodes.push(Node {
            name,
            handler: PlMutex::new(Some(handler)),
            flags,
            prev: after,
            next: before,
            removed: std::sync::atomic::AtomicBool::new(false),
        });
        arena.nodes[after].next = index;
        arena.nodes[before].prev = index;
        index
    }

    fn invoke_handler_added(self: &Arc<Self>, index: usize) {
        let pipeline = self.clone();
        self.run_on_executor_or_now(move || {
            let ctx = HandlerContext { pipeline: pipeline.clone(), index };
            let mut handler = {
                let arena = pipeline.arena.lock();
                arena.nodes[index].handler.lock().take()
            };
            if let Some(h) = handler.as_mut() {
                h.handler_added(&ctx);
            }
            let arena = pipeline.arena.lock();
            *arena.nodes[index].handler.lock() = handler;
        });
    }

    pub(crate) fn add_last(self: &Arc<Self>, name: Option<String>, flags: HandlerFlags, type_hint: &'static str, handler: Box<dyn Handler>) -> String {
        let name = self.unique_name(name, type_hint);
        let index = self.insert(TAIL_INDEX, name.clone(), flags, handler);
        self.invoke_handler_added(index);
        name
    }

    pub(crate) fn add_first(self: &Arc<Self>, name: Option<String>, flags: HandlerFlags, type_hint: &'static str, handler: Box<dyn Handler>) -> String {
        let name = self.unique_name(name, type_hint);
        let first_after_head = self.arena.lock().nodes[HEAD_INDEX].next;
        let index = self.insert(first_after_head, name.clone(), flags, handler);
        self.invoke_handler_added(index);
        name
    }

    pub(crate) fn add_before(
        self: &Arc<Self>,
        anchor: &str,
        name: Option<String>,
        flags: HandlerFlags,
        type_hint: &'static str,
        handler: Box<dyn Handler>,
    ) -> Option<String> {
        let anchor_index = self.find_index(anchor)?;
        let name = self.unique_name(name, type_hint);
        let index = self.insert(anchor_index, name.clone(), flags, handler);
        self.invoke_handler_added(index);
        Some(name)
    }

    pub(crate) fn add_after(
        self: &Arc<Self>,
        anchor: &str,
        name: Option<String>,
        flags: HandlerFlags,
        type_hint: &'static str,
        handler: Box<dyn Handler>,
    ) -> Option<String> {
        let anchor_index = self.find_index(anchor)?;
        let before = self.arena.lock().nodes[anchor_index].next;
        let name = self.unique_name(name, type_hint);
        let index = self.insert(before, name.clone(), flags, handler);
        self.invoke_handler_added(index);
        Some(name)
    }

    fn find_index(&self, name: &str) -> Option<usize> {
        let arena = self.arena.lock();
        arena
            .nodes
            .iter()
            .enumerate()
            .find(|(_, n)| !n.removed.load(Ordering::Acquire) && n.name == name)
            .map(|(i, _)| i)
    }

    /// Unlinks `name` from the traversal order immediately; if a call into
    /// that handler is currently on the stack (its `handler` cell is
    /// momentarily `None`), `invoke_at` notices `removed` once the call
    /// returns and fires `handler_removed` then instead of here.
    pub(crate) fn remove(self: &Arc<Self>, name: &str) -> bool {
        let index = match self.find_index(name) {
            Some(i) => i,
            None => return false,
        };
        if index == HEAD_INDEX || index == TAIL_INDEX {
            panic!("the head/tail sentinels cannot be removed");
        }
        let in_flight = {
            let mut arena = self.arena.lock();
            let (prev, next) = (arena.nodes[index].prev, arena.nodes[index].next);
            arena.nodes[prev].next = next;
            arena.nodes[next].prev = prev;
            arena.nodes[index].removed.store(true, Ordering::Release);
            arena.nodes[index].handler.lock().is_none()
        };
        if !in_flight {
            self.fire_handler_removed_now(index);
        }
        true
    }

    fn fire_handler_removed_now(self: &Arc<Self>, index: usize) {
        let pipeline = self.clone();
        self.run_on_executor_or_now(move || {
            let ctx = HandlerContext { pipeline: pipeline.clone(), index };
            let mut handler = pipeline.arena.lock().nodes[index].handler.lock().take();
            if let Some(h) = handler.as_mut() {
                h.handler_removed(&ctx);
            }
            // Dropped: a removed node's handler is never put back.
        });
    }

    pub(crate) fn replace(
        self: &Arc<Self>,
        old_name: &str,
        new_name: Option<String>,
        flags: HandlerFlags,
        type_hint: &'static str,
        handler: Box<dyn Handler>,
    ) -> Option<String> {
        let before = self.find_index(old_name)?;
        let new_name = self.unique_name(new_name, type_hint);
        let index = self.insert(before, new_name.clone(), flags, handler);
        self.invoke_handler_added(index);
        self.remove(old_name);
        Some(new_name)
    }

    // ---- traversal ----

    fn invoke_at(self: &Arc<Self>, index: usize, f: impl FnOnce(&mut dyn Handler, &HandlerContext)) {
        let ctx = HandlerContext { pipeline: self.clone(), index };
        let mut handler = {
            let arena = self.arena.lock();
            arena.nodes[index].handler.lock().take()
        };
        if let Some(h) = handler.as_mut() {
            f(h.as_mut(), &ctx);
        } else {
            // Already mid-removal with no handler to call; nothing to do.
            return;
        }

        let removed = self.arena.lock().nodes[index].removed.load(Ordering::Acquire);
        if removed {
            if let Some(mut h) = handler.take() {
                h.handler_removed(&ctx);
            }
        } else {
            *self.arena.lock().nodes[index].handler.lock() = handler;
        }
    }

    fn next_inbound(&self, from: usize) -> Option<usize> {
        let arena = self.arena.lock();
        let mut idx = arena.nodes[from].next;
        loop {
            if idx == from {
                return None;
            }
            let node = &arena.nodes[idx];
            if !node.removed.load(Ordering::Acquire) && node.flags.inbound {
                return Some(idx);
            }
            if idx == TAIL_INDEX {
                return Some(TAIL_INDEX);
            }
            idx = node.next;
        }
    }

    fn prev_outbound(&self, from: usize) -> Option<usize> {
        let arena = self.arena.lock();
        let mut idx = arena.nodes[from].prev;
        loop {
            if idx == from {
                return None;
            }
            let node = &arena.nodes[idx];
            if !node.removed.load(Ordering::Acquire) && node.flags.outbound {
                return Some(idx);
            }
            if idx == HEAD_INDEX {
                return Some(HEAD_INDEX);
            }
            idx = node.prev;
        }
    }

    pub(crate) fn invoke_inbound(self: &Arc<Self>, from: usize, f: impl FnOnce(&mut dyn Handler, &HandlerContext)) {
        if let Some(next) = self.next_inbound(from) {
            self.invoke_at(next, f);
        }
    }

    pub(crate) fn invoke_inbound_with<M>(
        self: &Arc<Self>,
        from: usize,
        msg: M,
        f: impl FnOnce(&mut dyn Handler, &HandlerContext, M),
    ) {
        if let Some(next) = self.next_inbound(from) {
            self.invoke_at(next, move |h, ctx| f(h, ctx, msg));
        }
    }

    pub(crate) fn invoke_outbound(self: &Arc<Self>, from: usize, f: impl FnOnce(&mut dyn Handler, &HandlerContext)) {
        if let Some(prev) = self.prev_outbound(from) {
            self.invoke_at(prev, f);
        }
    }

    pub(crate) fn invoke_outbound_with<M>(
        self: &Arc<Self>,
        from: usize,
        msg: M,
        f: impl FnOnce(&mut dyn Handler, &HandlerContext, M),
    ) {
        if let Some(prev) = self.prev_outbound(from) {
            self.invoke_at(prev, move |h, ctx| f(h, ctx, msg));
        }
    }
}

/// A channel's ordered chain of handlers. Cheap to clone; every clone
/// shares the same underlying arena.
#[derive(Clone)]
pub struct Pipeline {
    shared: Arc<PipelineShared>,
}

impl Pipeline {
    pub(crate) fn new(unsafe_ops: Weak<dyn ChannelUnsafe>) -> Pipeline {
        Pipeline { shared: PipelineShared::new(unsafe_ops) }
    }

    pub(crate) fn shared(&self) -> &Arc<PipelineShared> {
        &self.shared
    }

    pub(crate) fn set_executor(&self, executor: Arc<dyn Executor>) {
        self.shared.set_executor(executor);
    }

    pub fn add_last<H: Handler>(&self, name: Option<String>, handler: H) -> String {
        let flags = handler.flags();
        self.shared.add_last(name, flags, std::any::type_name::<H>(), Box::new(handler))
    }

    /// As [`Pipeline::add_last`], for a handler already boxed behind the
    /// trait object — the shape a [`crate::bootstrap`] handler factory
    /// produces, since it can't name a concrete, per-call type.
    pub fn add_last_boxed(&self, name: Option<String>, handler: Box<dyn Handler>) -> String {
        let flags = handler.flags();
        self.shared.add_last(name, flags, "dyn Handler", handler)
    }

    pub fn add_first<H: Handler>(&self, name: Option<String>, handler: H) -> String {
        let flags = handler.flags();
        self.shared.add_first(name, flags, std::any::type_name::<H>(), Box::new(handler))
    }

    pub fn add_before<H: Handler>(&self, anchor: &str, name: Option<String>, handler: H) -> Option<String> {
        let flags = handler.flags();
        self.shared.add_before(anchor, name, flags, std::any::type_name::<H>(), Box::new(handler))
    }

    pub fn add_after<H: Handler>(&self, anchor: &str, name: Option<String>, handler: H) -> Option<String> {
        let flags = handler.flags();
        self.shared.add_after(anchor, name, flags, std::any::type_name::<H>(), Box::new(handler))
    }

    pub fn replace<H: Handler>(&self, old_name: &str, new_name: Option<String>, handler: H) -> Option<String> {
        let flags = handler.flags();
        self.shared.replace(old_name, new_name, flags, std::any::type_name::<H>(), Box::new(handler))
    }

    /// Returns `true` if a handler by that name was present and removed.
    pub fn remove(&self, name: &str) -> bool {
        self.shared.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.shared.find_index(name).is_some()
    }

    // ---- inbound entry points, called by the channel itself ----

    pub(crate) fn fire_channel_registered(&self) {
        self.shared.invoke_at(HEAD_INDEX, |h, ctx| h.channel_registered(ctx));
    }

    pub(crate) fn fire_channel_unregistered(&self) {
        self.shared.invoke_at(HEAD_INDEX, |h, ctx| h.channel_unregistered(ctx));
    }

    pub(crate) fn fire_channel_active(&self) {
        self.shared.invoke_at(HEAD_INDEX, |h, ctx| h.channel_active(ctx));
    }

    pub(crate) fn fire_channel_inactive(&self) {
        self.shared.invoke_at(HEAD_INDEX, |h, ctx| h.channel_inactive(ctx));
    }

    pub(crate) fn fire_channel_read(&self, msg: Message) {
        self.shared.invoke_at(HEAD_INDEX, move |h, ctx| h.channel_read(ctx, msg));
    }

    pub(crate) fn fire_channel_read_complete(&self) {
        self.shared.invoke_at(HEAD_INDEX, |h, ctx| h.channel_read_complete(ctx));
    }

    pub(crate) fn fire_user_event_triggered(&self, evt: UserEvent) {
        self.shared.invoke_at(HEAD_INDEX, move |h, ctx| h.user_event_triggered(ctx, evt));
    }

    pub(crate) fn fire_channel_writability_changed(&self) {
        self.shared.invoke_at(HEAD_INDEX, |h, ctx| h.channel_writability_changed(ctx));
    }

    pub(crate) fn fire_exception_caught(&self, cause: CoreError) {
        self.shared.invoke_at(HEAD_INDEX, move |h, ctx| h.exception_caught(ctx, cause));
    }

    // ---- outbound entry points, called by user code via the Channel ----

    pub(crate) fn bind(&self, local: SocketAddr, promise: Promise<(), Arc<CoreError>>) {
        self.shared.invoke_at(TAIL_INDEX, move |h, ctx| h.bind(ctx, local, promise));
    }

    pub(crate) fn connect(&self, remote: SocketAddr, local: Option<SocketAddr>, promise: Promise<(), Arc<CoreError>>) {
        self.shared.invoke_at(TAIL_INDEX, move |h, ctx| h.connect(ctx, remote, local, promise));
    }

    pub(crate) fn close(&self, promise: Promise<(), Arc<CoreError>>) {
        self.shared.invoke_at(TAIL_INDEX, move |h, ctx| h.close(ctx, promise));
    }

    pub(crate) fn deregister(&self, promise: Promise<(), Arc<CoreError>>) {
        self.shared.invoke_at(TAIL_INDEX, move |h, ctx| h.deregister(ctx, promise));
    }

    pub(crate) fn read(&self) {
        self.shared.invoke_at(TAIL_INDEX, |h, ctx| h.read(ctx));
    }

    pub(crate) fn write(&self, msg: Message, promise: Promise<(), Arc<CoreError>>) {
        self.shared.invoke_at(TAIL_INDEX, move |h, ctx| h.write(ctx, msg, promise));
    }

    pub(crate) fn flush(&self) {
        self.shared.invoke_at(TAIL_INDEX, |h, ctx| h.flush(ctx));
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let arena = self.shared.arena.lock();
        f.debug_list()
            .entries(arena.nodes.iter().filter(|n| !n.removed.load(Ordering::Acquire)).map(|n| &n.name))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex as StdMutex;

    struct NoopUnsafe;
    impl ChannelUnsafe for NoopUnsafe {
        fn bind(&self, _local: SocketAddr, promise: Promise<(), Arc<CoreError>>) {
            let _ = promise.set_success(());
        }
        fn connect(&self, _remote: SocketAddr, _local: Option<SocketAddr>, promise: Promise<(), Arc<CoreError>>) {
            let _ = promise.set_success(());
        }
        fn disconnect(&self, promise: Promise<(), Arc<CoreError>>) {
            let _ = promise.set_success(());
        }
        fn close(&self, promise: Promise<(), Arc<CoreError>>) {
            let _ = promise.set_success(());
        }
        fn deregister(&self, promise: Promise<(), Arc<CoreError>>) {
            let _ = promise.set_success(());
        }
        fn read(&self) {}
        fn write(&self, _msg: Message, promise: Promise<(), Arc<CoreError>>) {
            let _ = promise.set_success(());
        }
        fn flush(&self) {}
    }

    struct RecordingHandler {
        log: Arc<StdMutex<Vec<&'static str>>>,
        tag: &'static str,
    }
    impl Handler for RecordingHandler {
        fn channel_read(&mut self, ctx: &HandlerContext, msg: Message) {
            self.log.lock().unwrap().push(self.tag);
            ctx.fire_channel_read(msg);
        }
    }

    #[test]
    fn add_last_then_remove_restores_empty_pipeline() {
        let noop_ops: Arc<dyn ChannelUnsafe> = Arc::new(NoopUnsafe);
        let pipeline = Pipeline::new(Arc::downgrade(&noop_ops));
        let name = pipeline.add_last(None, RecordingHandler { log: Default::default(), tag: "a" });
        assert!(pipeline.contains(&name));
        assert!(pipeline.remove(&name));
        assert!(!pipeline.contains(&name));
    }

    #[test]
    fn inbound_traversal_visits_handlers_in_add_order() {
        let noop_ops: Arc<dyn ChannelUnsafe> = Arc::new(NoopUnsafe);
        let pipeline = Pipeline::new(Arc::downgrade(&noop_ops));
        let log = Arc::new(StdMutex::new(Vec::new()));
        pipeline.add_last(Some("a".into()), RecordingHandler { log: log.clone(), tag: "a" });
        pipeline.add_last(Some("b".into()), RecordingHandler { log: log.clone(), tag: "b" });

        pipeline.fire_channel_read(Box::new(7u32));
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn handler_removing_itself_mid_call_completes_and_stops_future_events() {
        struct SelfRemoving {
            pipeline: Pipeline,
            calls: Arc<AtomicU32>,
        }
        impl Handler for SelfRemoving {
            fn channel_read(&mut self, ctx: &HandlerContext, msg: Message) {
                self.calls.fetch_add(1, Ordering::Relaxed);
                self.pipeline.remove(&ctx.name());
                ctx.fire_channel_read(msg);
            }
        }

        let noop_ops: Arc<dyn ChannelUnsafe> = Arc::new(NoopUnsafe);
        let pipeline = Pipeline::new(Arc::downgrade(&noop_ops));
        let calls = Arc::new(AtomicU32::new(0));
        let name = pipeline.add_last(
            Some("self-remover".into()),
            SelfRemoving { pipeline: pipeline.clone(), calls: calls.clone() },
        );

        pipeline.fire_channel_read(Box::new(1u32));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert!(!pipeline.contains(&name));

        pipeline.fire_channel_read(Box::new(2u32));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn default_auto_names_are_unique() {
        let noop_ops: Arc<dyn ChannelUnsafe> = Arc::new(NoopUnsafe);
        let pipeline = Pipeline::new(Arc::downgrade(&noop_ops));
        let a = pipeline.add_last(None, RecordingHandler { log: Default::default(), tag: "a" });
        let b = pipeline.add_last(None, RecordingHandler { log: Default::default(), tag: "b" });
        assert_ne!(a, b);
    }

    #[test]
    fn write_reaches_the_unsafe_layer_through_head() {
        let noop_ops: Arc<dyn ChannelUnsafe> = Arc::new(NoopUnsafe);
        let pipeline = Pipeline::new(Arc::downgrade(&noop_ops));
        let promise = Promise::<(), Arc<CoreError>>::new(Arc::new(crate::promise::ImmediateExecutor));
        pipeline.write(Box::new(vec![1u8, 2, 3]), promise.clone());
        assert!(promise.is_success());
    }
}
