//! `corvid`: a reactor-driven, single-threaded-per-loop asynchronous
//! networking runtime core, modeled after Netty's transport layer.
//!
//! A fixed pool of single-threaded [`EventLoop`](event_loop::EventLoop)s
//! (grouped by an [`EventLoopGroup`](event_loop_group::EventLoopGroup)) each
//! drive I/O for the [`Channel`](channel::Channel)s registered to them
//! through one kernel [`Reactor`](reactor::Reactor) (epoll, kqueue,
//! io_uring, or a portable `poll(2)` fallback — see [`reactor`]). Every
//! channel carries an ordered [`Pipeline`](channel::Pipeline) of
//! [`Handler`](channel::Handler)s that inbound events flow through head to
//! tail and outbound operations flow through tail to head.
//! [`Bootstrap`](bootstrap::Bootstrap)/[`ServerBootstrap`](bootstrap::ServerBootstrap)
//! choreograph the async create/init/register/bind-or-connect handshake, and
//! [`Recycler`](recycler::Recycler) pools short-lived per-event objects
//! (e.g. read buffers) with cross-thread handoff.
//!
//! This crate is the *core* only: concrete protocol codecs, a bulk
//! byte-buffer allocator, DNS resolution, TLS, and application-wiring sugar
//! are external collaborators described by the traits in [`buffer`] and
//! [`resolver`], not implemented here.

#![allow(dead_code)]

#[macro_use]
mod macros;

pub mod attributes;
pub mod bootstrap;
pub mod buffer;
pub mod channel;
pub mod error;
pub mod event_loop;
pub mod event_loop_group;
pub mod interest;
pub mod options;
pub mod promise;
pub mod reactor;
pub mod recycler;
pub mod resolver;
mod task_queue;
mod timer_wheel;
pub mod token;
pub mod waker;

pub use attributes::{Attribute, AttributeKey, AttributeMap};
pub use bootstrap::{Bootstrap, ChannelFuture, ServerBootstrap};
pub use channel::{Channel, Handler, HandlerContext, HandlerFlags, Message, Pipeline, UserEvent};
pub use error::{CoreError, CoreResult, OptionUnknown, RecycleError};
pub use event_loop::{EventLoop, EventLoopConfig};
pub use event_loop_group::EventLoopGroup;
pub use interest::Interest;
pub use options::{ChannelConfig, ChannelOption};
pub use promise::{PendingRegistrationExecutor, Promise, PromiseResult};
pub use recycler::{Handle, Recycler};
pub use token::Token;
pub use waker::Waker;

/// Documentation of this crate's Cargo features; carries no code.
///
/// - **`log`** (default): emits `log::{trace,debug,warn,error}!` calls for
///   retried/recovered internal conditions — selector rebuilds, reactor
///   wait errors, dropped recycler handles, unknown channel options — the
///   same set of events Netty logs at the equivalent level. Disabling this
///   feature compiles every log call out entirely rather than routing
///   through a no-op logger, matching how `mio` gates its own `log` calls.
/// - **`io-uring`** (Linux only): swaps the `epoll`-backed readiness reactor
///   for a completion-queue `io_uring` backend.
///   Falls back to `epoll` at compile time on non-Linux targets regardless
///   of this flag.
#[cfg(docsrs)]
pub mod features {}
