//! The asynchronous name-resolver boundary.
//!
//! The resolver library manages its own sockets opaquely: it may open a
//! UDP socket to send a query, open a TCP socket to retry over a
//! different transport, or close either as a side effect of processing.
//! There is no notification hook for that churn, so the reactor
//! re-queries the socket set once per poll cycle and rebuilds its
//! registrations from scratch (see the tracker in the reactor core).

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use arrayvec::ArrayVec;

use crate::event::EventSet;
use crate::poller::Socket;

/// Upper bound on the number of sockets a single resolver can hold open
/// at once. Matches the limit of the underlying resolver library.
pub const MAX_RESOLVER_SOCKETS: usize = 16;

/// A snapshot of the sockets a resolver is currently using, each tagged
/// with the directions the resolver wants watched.
pub type ResolverSockets = ArrayVec<(Socket, EventSet), MAX_RESOLVER_SOCKETS>;

/// Progress of an in-flight resolution.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ResolverStatus {
    /// No query has been started yet.
    Ready,
    /// A query is in flight.
    Active,
    /// The query completed with a result.
    Success,
    /// The query failed.
    Error,
}

impl ResolverStatus {
    /// Returns `true` once the resolver will make no further progress.
    pub fn is_final(self) -> bool {
        matches!(self, ResolverStatus::Success | ResolverStatus::Error)
    }
}

/// An asynchronous resolver driven cooperatively by the reactor.
pub trait AsyncResolver {
    /// The sockets the resolver currently wants watched, with their
    /// desired directions. Only valid until the resolver next does work.
    fn sockets(&self) -> ResolverSockets;

    /// Drives the resolver: `read`/`write` name a socket that became
    /// readable or writable, or are both `None` for a timeout tick.
    fn process(&mut self, read: Option<Socket>, write: Option<Socket>);

    /// Current progress of the resolution.
    fn status(&self) -> ResolverStatus;
}

/// Shared handle to a resolver, as held by the caller.
pub type ResolverRef = Rc<RefCell<dyn AsyncResolver>>;

/// Non-owning handle stored inside the reactor.
pub(crate) type WeakResolver = Weak<RefCell<dyn AsyncResolver>>;

/// Identity comparison between a stored binding and a caller handle.
pub(crate) fn is_same_resolver(weak: &WeakResolver, resolver: &ResolverRef) -> bool {
    std::ptr::addr_eq(weak.as_ptr(), Rc::as_ptr(resolver))
}
