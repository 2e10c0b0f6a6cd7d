//! # downpour-reactor
//!
//! **downpour-reactor** is the I/O event reactor at the core of the
//! Downpour download engine: a single-threaded, non-blocking
//! multiplexer that watches many sockets for readiness and dispatches
//! notifications to registered commands.
//!
//! One uniform contract is backed by six interchangeable facilities,
//! selected at runtime by capability probing:
//!
//! - `epoll` on Linux
//! - `kqueue` on the BSDs and macOS
//! - event ports on Solaris and illumos
//! - portable `poll` (`WSAPoll` on Windows)
//! - legacy `select`
//! - the `polling` event-loop library
//!
//! Protocol state machines register interest through [`Reactor::register`]
//! and receive [`Command`] callbacks when their sockets become ready.
//! An asynchronous name resolver that manages its own sockets opaquely
//! can be attached with [`Reactor::track`]; the reactor re-synchronizes
//! its socket set after every poll cycle.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use downpour_reactor::{EventSet, Reactor};
//!
//! let mut reactor = Reactor::new()?;
//! reactor.register(socket, &command, EventSet::READ | EventSet::WRITE);
//!
//! loop {
//!     reactor.poll(Duration::from_millis(100));
//!     // run whatever the callbacks marked runnable
//! }
//! ```
//!
//! ## Modules
//!
//! - [`event`]: readiness events and interest masks
//! - [`command`]: the consumer-facing callback contract
//! - [`resolver`]: the asynchronous name-resolver boundary
//! - [`poller`]: the backend trait, the concrete facilities, and the
//!   runtime probe

pub mod command;
pub mod error;
pub mod event;
pub mod poller;
pub mod resolver;

mod entry;
mod reactor;
mod tracker;

pub use command::{Command, CommandRef};
pub use error::PollerError;
pub use event::EventSet;
pub use poller::{NativePoller, Poller, PollerKind, Readiness, Socket};
pub use reactor::Reactor;
pub use resolver::{
    AsyncResolver, MAX_RESOLVER_SOCKETS, ResolverRef, ResolverSockets, ResolverStatus,
};
