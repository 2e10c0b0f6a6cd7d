//! Resolver socket trackers.
//!
//! A [`ResolverEntry`] remembers the socket set a tracked resolver was
//! last seen using. The resolver library opens and closes its sockets
//! behind the reactor's back, so the remembered set is the only thing
//! that can be safely deregistered on the next cycle; diffing against a
//! live query would race with churn the library never reports.

use crate::command::{CommandRef, WeakCommand, is_same_command};
use crate::resolver::{ResolverRef, ResolverSockets, WeakResolver, is_same_resolver};

/// Tracking state for one (resolver, owning command) pair.
pub(crate) struct ResolverEntry {
    pub(crate) resolver: WeakResolver,
    pub(crate) command: WeakCommand,
    /// The snapshot registered with the poller during the last cycle.
    pub(crate) sockets: ResolverSockets,
}

impl ResolverEntry {
    pub(crate) fn new(resolver: &ResolverRef, command: &CommandRef) -> Self {
        Self {
            resolver: std::rc::Rc::downgrade(resolver),
            command: std::rc::Rc::downgrade(command),
            sockets: ResolverSockets::new(),
        }
    }

    /// Trackers are keyed by the identity of both the resolver and the
    /// owning command; the same resolver may be tracked by two commands.
    pub(crate) fn matches(&self, resolver: &ResolverRef, command: &CommandRef) -> bool {
        is_same_resolver(&self.resolver, resolver) && is_same_command(&self.command, command)
    }
}
