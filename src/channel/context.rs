//! A position within a pipeline, handed to handler callbacks so they can
//! continue propagation.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::channel::handler::{Message, UserEvent};
use crate::channel::pipeline::PipelineShared;
use crate::error::CoreError;
use crate::promise::Promise;

/// A handler's view of its position in the pipeline. Cheap to construct;
/// every `fire_*`/outbound method looks up the next applicable node by
/// walking the arena's linked list starting from this context's index.
pub struct HandlerContext {
    pub(crate) pipeline: Arc<PipelineShared>,
    pub(crate) index: usize,
}

impl HandlerContext {
    pub fn name(&self) -> String {
        self.pipeline.node_name(self.index)
    }

    // ---- inbound continuation (Head -> Tail) ----

    pub fn fire_channel_registered(&self) {
        self.pipeline.invoke_inbound(self.index, |h, ctx| h.channel_registered(ctx));
    }

    pub fn fire_channel_unregistered(&self) {
        self.pipeline.invoke_inbound(self.index, |h, ctx| h.channel_unregistered(ctx));
    }

    pub fn fire_channel_active(&self) {
        self.pipeline.invoke_inbound(self.index, |h, ctx| h.channel_active(ctx));
    }

    pub fn fire_channel_inactive(&self) {
        self.pipeline.invoke_inbound(self.index, |h, ctx| h.channel_inactive(ctx));
    }

    pub fn fire_channel_read(&self, msg: Message) {
        self.pipeline.invoke_inbound_with(self.index, msg, |h, ctx, msg| h.channel_read(ctx, msg));
    }

    pub fn fire_channel_read_complete(&self) {
        self.pipeline.invoke_inbound(self.index, |h, ctx| h.channel_read_complete(ctx));
    }

    pub fn fire_user_event_triggered(&self, evt: UserEvent) {
        self.pipeline.invoke_inbound_with(self.index, evt, |h, ctx, evt| h.user_event_triggered(ctx, evt));
    }

    pub fn fire_channel_writability_changed(&self) {
        self.pipeline.invoke_inbound(self.index, |h, ctx| h.channel_writability_changed(ctx));
    }

    pub fn fire_exception_caught(&self, cause: CoreError) {
        self.pipeline.invoke_inbound_with(self.index, cause, |h, ctx, cause| h.exception_caught(ctx, cause));
    }

    // ---- outbound continuation (Tail -> Head) ----

    pub fn bind(&self, local: SocketAddr, promise: Promise<(), Arc<CoreError>>) {
        self.pipeline
            .invoke_outbound_with(self.index, (local, promise), |h, ctx, (local, p)| h.bind(ctx, local, p));
    }

    pub fn connect(&self, remote: SocketAddr, local: Option<SocketAddr>, promise: Promise<(), Arc<CoreError>>) {
        self.pipeline.invoke_outbound_with(self.index, (remote, local, promise), |h, ctx, (remote, local, p)| {
            h.connect(ctx, remote, local, p)
        });
    }

    pub fn disconnect(&self, promise: Promise<(), Arc<CoreError>>) {
        self.pipeline.invoke_outbound_with(self.index, promise, |h, ctx, p| h.disconnect(ctx, p));
    }

    pub fn close(&self, promise: Promise<(), Arc<CoreError>>) {
        self.pipeline.invoke_outbound_with(self.index, promise, |h, ctx, p| h.close(ctx, p));
    }

    pub fn deregister(&self, promise: Promise<(), Arc<CoreError>>) {
        self.pipeline.invoke_outbound_with(self.index, promise, |h, ctx, p| h.deregister(ctx, p));
    }

    pub fn read(&self) {
        self.pipeline.invoke_outbound(self.index, |h, ctx| h.read(ctx));
    }

    pub fn write(&self, msg: Message, promise: Promise<(), Arc<CoreError>>) {
        self.pipeline
            .invoke_outbound_with(self.index, (msg, promise), |h, ctx, (msg, p)| h.write(ctx, msg, p));
    }

    pub fn flush(&self) {
        self.pipeline.invoke_outbound(self.index, |h, ctx| h.flush(ctx));
    }
}
