//! The handler trait every pipeline entry implements.
//!
//! Grounded on the reactor's `IoHandler` callback shape
//! (`crate::event_loop::IoHandler`) generalized into the full inbound/
//! outbound event set a channel pipeline dispatches. Every method has a
//! default that forwards to the next applicable context, so a handler only
//! overrides what it cares about — the same "don't override, it just
//! forwards" contract Netty's `ChannelInboundHandlerAdapter` gives you,
//! collapsed here into one trait since Rust has no convenient way to detect
//! at runtime which methods a type overrode.
//!
//! # Handler panics
//!
//! A [`Handler`] method that panics while invoked from the owning event
//! loop thread unwinds straight through `run_loop` and takes the whole
//! thread down with it — unlike exceptions raised for
//! `exception_caught` propagation, there is no catch-and-log boundary around
//! a handler callback itself.

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::channel::context::HandlerContext;
use crate::error::CoreError;
use crate::promise::Promise;

/// An inbound event payload. Handlers downcast via `Any` the same way a
/// Netty handler narrows an `Object msg` by `instanceof`.
pub type Message = Box<dyn Any + Send>;

/// A user-defined signal fired via [`HandlerContext::fire_user_event_triggered`].
pub type UserEvent = Box<dyn Any + Send>;

/// Which direction(s) of the pipeline a handler participates in. A
/// `Pipeline` uses this to skip invoking a handler for events it was never
/// meant to see, the same role mio's `Interest` plays for readiness: it
/// doesn't change what the default methods *do*, only whether they're
/// reachable at all from a given traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerFlags {
    pub inbound: bool,
    pub outbound: bool,
}

impl HandlerFlags {
    pub const BOTH: HandlerFlags = HandlerFlags { inbound: true, outbound: true };
    pub const INBOUND_ONLY: HandlerFlags = HandlerFlags { inbound: true, outbound: false };
    pub const OUTBOUND_ONLY: HandlerFlags = HandlerFlags { inbound: false, outbound: true };
}

/// One node's behavior in a channel pipeline. Every method's default simply
/// continues propagation; override only the events a handler actually acts
/// on.
pub trait Handler: Send + 'static {
    /// Declares which directions this handler participates in. Defaults to
    /// both; a handler that only ever overrides inbound methods should
    /// return [`HandlerFlags::INBOUND_ONLY`] so outbound traversal skips it
    /// entirely rather than paying for a no-op lock + call.
    fn flags(&self) -> HandlerFlags {
        HandlerFlags::BOTH
    }

    /// Called once, on the event loop, after this handler is added to a
    /// pipeline — even if the add was requested from another thread (spec
    /// §4.G "pipeline mutation races").
    fn handler_added(&mut self, _ctx: &HandlerContext) {}

    /// Called once the handler has been unlinked from the pipeline. Further
    /// `ctx.fire_*`/outbound calls from within this method still reach
    /// whatever neighbors remain.
    fn handler_removed(&mut self, _ctx: &HandlerContext) {}

    // ---- inbound (Head -> Tail) ----

    fn channel_registered(&mut self, ctx: &HandlerContext) {
        ctx.fire_channel_registered();
    }

    fn channel_unregistered(&mut self, ctx: &HandlerContext) {
        ctx.fire_channel_unregistered();
    }

    fn channel_active(&mut self, ctx: &HandlerContext) {
        ctx.fire_channel_active();
    }

    fn channel_inactive(&mut self, ctx: &HandlerContext) {
        ctx.fire_channel_inactive();
    }

    fn channel_read(&mut self, ctx: &HandlerContext, msg: Message) {
        ctx.fire_channel_read(msg);
    }

    fn channel_read_complete(&mut self, ctx: &HandlerContext) {
        ctx.fire_channel_read_complete();
    }

    fn user_event_triggered(&mut self, ctx: &HandlerContext, evt: UserEvent) {
        ctx.fire_user_event_triggered(evt);
    }

    fn channel_writability_changed(&mut self, ctx: &HandlerContext) {
        ctx.fire_channel_writability_changed();
    }

    fn exception_caught(&mut self, ctx: &HandlerContext, cause: CoreError) {
        ctx.fire_exception_caught(cause);
    }

    // ---- outbound (Tail -> Head) ----

    fn bind(&mut self, ctx: &HandlerContext, local: SocketAddr, promise: Promise<(), Arc<CoreError>>) {
        ctx.bind(local, promise);
    }

    fn connect(
        &mut self,
        ctx: &HandlerContext,
        remote: SocketAddr,
        local: Option<SocketAddr>,
        promise: Promise<(), Arc<CoreError>>,
    ) {
        ctx.connect(remote, local, promise);
    }

    fn disconnect(&mut self, ctx: &HandlerContext, promise: Promise<(), Arc<CoreError>>) {
        ctx.disconnect(promise);
    }

    fn close(&mut self, ctx: &HandlerContext, promise: Promise<(), Arc<CoreError>>) {
        ctx.close(promise);
    }

    fn deregister(&mut self, ctx: &HandlerContext, promise: Promise<(), Arc<CoreError>>) {
        ctx.deregister(promise);
    }

    fn read(&mut self, ctx: &HandlerContext) {
        ctx.read();
    }

    fn write(&mut self, ctx: &HandlerContext, msg: Message, promise: Promise<(), Arc<CoreError>>) {
        ctx.write(msg, promise);
    }

    fn flush(&mut self, ctx: &HandlerContext) {
        ctx.flush();
    }
}
