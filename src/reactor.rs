//! Reactor core.
//!
//! The reactor owns every per-socket registration entry and every
//! resolver tracker, translates between the abstract event model and
//! the selected poller backend, and fans readiness back out to the
//! registered commands. It is strictly single-threaded: `poll` is the
//! only call that blocks, and all bookkeeping is mutated synchronously
//! either by a caller or inside `poll` itself, so no locking exists
//! anywhere in this module.

use std::collections::BTreeMap;
use std::io;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::command::CommandRef;
use crate::entry::SocketEntry;
use crate::error::PollerError;
use crate::event::EventSet;
use crate::poller::{NativePoller, Poller, PollerKind, Readiness, Socket, is_valid_socket};
use crate::resolver::ResolverRef;
use crate::tracker::ResolverEntry;

/// The I/O event reactor.
///
/// Generic over the poller backend so the dispatch logic is written
/// once; production code uses the [`NativePoller`] selected by the
/// runtime probe, tests substitute a scripted one.
pub struct Reactor<P: Poller = NativePoller> {
    poller: P,

    /// Per-socket registration entries, keyed by socket handle. Ready
    /// notifications are resolved through this map and never through
    /// anything carried inside a native event, so a stale handle
    /// degrades to a logged skip.
    entries: BTreeMap<Socket, SocketEntry>,

    /// Resolver trackers, rebuilt every poll cycle.
    resolvers: Vec<ResolverEntry>,

    /// Reusable readiness buffer.
    ready: Vec<Readiness>,
}

impl Reactor<NativePoller> {
    /// Creates a reactor on the best facility the platform offers.
    pub fn new() -> Result<Self, PollerError> {
        Self::with_kind(PollerKind::Auto)
    }

    /// Creates a reactor on the requested facility.
    pub fn with_kind(kind: PollerKind) -> Result<Self, PollerError> {
        Ok(Self::with_poller(NativePoller::with_kind(kind)?))
    }
}

impl<P: Poller> Reactor<P> {
    /// Creates a reactor over an already constructed backend.
    pub fn with_poller(poller: P) -> Self {
        Self {
            poller,
            entries: BTreeMap::new(),
            resolvers: Vec::new(),
            ready: Vec::new(),
        }
    }

    /// Name of the facility backing this reactor.
    pub fn backend_name(&self) -> &'static str {
        self.poller.name()
    }

    /// Number of sockets with a live registration entry.
    pub fn registered_sockets(&self) -> usize {
        self.entries.len()
    }

    /// Number of resolver trackers currently alive.
    pub fn tracked_resolvers(&self) -> usize {
        self.resolvers.len()
    }

    /// Registers `command`'s interest in `events` on `socket`.
    ///
    /// Repeated registrations for the same (socket, command) pair are
    /// coalesced by mask union. Returns `false` without touching the
    /// effective registration when the native call fails or the
    /// arguments are unusable; the caller decides whether to abandon
    /// the socket.
    pub fn register(&mut self, socket: Socket, command: &CommandRef, events: EventSet) -> bool {
        if !is_valid_socket(socket) {
            debug!(socket = socket as i64, "rejecting invalid socket handle");
            return false;
        }
        if events.is_empty() {
            debug!(socket = socket as i64, "rejecting empty interest mask");
            return false;
        }

        let existed = self.entries.contains_key(&socket);
        let entry = self
            .entries
            .entry(socket)
            .or_insert_with(|| SocketEntry::new(socket));

        let prior = entry.command_events(command).unwrap_or(EventSet::EMPTY);
        entry.add_command(command, events);
        let combined = entry.combined_events();

        match self.poller.upsert(socket, combined, existed) {
            Ok(()) => true,
            Err(err) => {
                debug!(socket = socket as i64, error = %err, "failed to add socket event");
                // Roll back to the prior effective registration: strip
                // only the bits this call introduced.
                entry.remove_command(command, events.difference(prior));
                let now_empty = entry.is_empty();
                if now_empty {
                    self.entries.remove(&socket);
                }
                false
            }
        }
    }

    /// Withdraws `events` from `command`'s interest in `socket`.
    ///
    /// Dropping the last interest bit removes the binding; removing the
    /// last binding tears down the native registration and the entry
    /// itself. Returns `false` when the socket was not registered for
    /// `command` at all; this is reported, not fatal.
    pub fn deregister(&mut self, socket: Socket, command: &CommandRef, events: EventSet) -> bool {
        let Some(entry) = self.entries.get_mut(&socket) else {
            debug!(socket = socket as i64, "socket is not registered");
            return false;
        };

        if !entry.remove_command(command, events) {
            debug!(
                socket = socket as i64,
                "socket is not registered for this command"
            );
            return false;
        }

        if entry.is_empty() {
            self.entries.remove(&socket);
            match self.poller.remove(socket) {
                Ok(()) => true,
                Err(err) => {
                    debug!(socket = socket as i64, error = %err, "failed to delete socket event");
                    false
                }
            }
        } else {
            let combined = entry.combined_events();
            match self.poller.upsert(socket, combined, true) {
                Ok(()) => true,
                Err(err) => {
                    // A closed socket is dropped from the facility on
                    // its own, so a failing modify here is expected in
                    // that window.
                    debug!(
                        socket = socket as i64,
                        error = %err,
                        "failed to update socket event, may be ignored"
                    );
                    false
                }
            }
        }
    }

    /// Starts tracking `resolver`'s internal sockets on behalf of
    /// `command`.
    ///
    /// The resolver's current socket set is registered immediately and
    /// refreshed after every poll cycle. Returns `false` when this
    /// (resolver, command) pair is already tracked.
    pub fn track(&mut self, resolver: &ResolverRef, command: &CommandRef) -> bool {
        if self.resolvers.iter().any(|e| e.matches(resolver, command)) {
            return false;
        }

        let mut entry = ResolverEntry::new(resolver, command);
        let snapshot = resolver.borrow().sockets();
        for &(socket, events) in &snapshot {
            self.add_resolver_events(socket, events, &entry);
        }
        entry.sockets = snapshot;
        self.resolvers.push(entry);
        true
    }

    /// Stops tracking the (resolver, command) pair, deregistering every
    /// socket remembered for it. Returns `false` when it was not
    /// tracked.
    pub fn untrack(&mut self, resolver: &ResolverRef, command: &CommandRef) -> bool {
        let Some(index) = self
            .resolvers
            .iter()
            .position(|e| e.matches(resolver, command))
        else {
            return false;
        };

        let mut entry = self.resolvers.remove(index);
        let sockets = std::mem::take(&mut entry.sockets);
        for (socket, _) in sockets {
            self.delete_resolver_events(socket, &entry);
        }
        true
    }

    /// Blocks for up to `timeout` and dispatches whatever became ready.
    ///
    /// A zero timeout returns immediately; an unbounded wait is not
    /// supported, so callers always keep the loop live. An interrupted
    /// native wait is retried with the remaining timeout. Any other
    /// wait failure is logged and treated as an empty cycle. After the
    /// wait, every resolver tracker is refreshed unconditionally,
    /// because the resolver library may have opened or closed sockets
    /// while processing.
    pub fn poll(&mut self, timeout: Duration) {
        let mut ready = std::mem::take(&mut self.ready);
        ready.clear();

        let started = Instant::now();
        let mut remaining = timeout;
        loop {
            match self.poller.wait(&mut ready, remaining) {
                Ok(()) => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {
                    remaining = timeout.saturating_sub(started.elapsed());
                }
                Err(err) => {
                    warn!(
                        backend = self.poller.name(),
                        error = %err,
                        "native wait failed, treating cycle as idle"
                    );
                    ready.clear();
                    break;
                }
            }
        }

        for item in &ready {
            match self.entries.get(&item.socket) {
                Some(entry) => entry.deliver(item.events),
                None => {
                    // The facility can report a handle the bookkeeping
                    // no longer knows, e.g. a closed socket reused by
                    // the OS before the registration caught up.
                    trace!(
                        socket = item.socket as i64,
                        "discarding readiness for unknown socket"
                    );
                }
            }
        }

        self.ready = ready;
        self.refresh_resolvers();
    }

    /// Tears down and rebuilds every resolver tracker.
    ///
    /// The resolver library manages its socket lifecycle opaquely, so
    /// the only consistent view is the one taken immediately after it
    /// has been asked to do work: tick it, deregister the remembered
    /// set, re-query, re-register. Incremental diffing would race with
    /// churn the library never reports.
    fn refresh_resolvers(&mut self) {
        let mut trackers = std::mem::take(&mut self.resolvers);

        for entry in &mut trackers {
            let Some(resolver) = entry.resolver.upgrade() else {
                // Dropped without untrack; tear down what we still
                // remember and let the tracker die below.
                for (socket, _) in std::mem::take(&mut entry.sockets) {
                    self.delete_resolver_events(socket, entry);
                }
                continue;
            };

            // Fire any pending timeout inside the resolver first; it
            // may release sockets as a side effect.
            resolver.borrow_mut().process(None, None);

            for (socket, _) in std::mem::take(&mut entry.sockets) {
                self.delete_resolver_events(socket, entry);
            }

            let snapshot = resolver.borrow().sockets();
            for &(socket, events) in &snapshot {
                self.add_resolver_events(socket, events, entry);
            }
            entry.sockets = snapshot;
        }

        trackers.retain(|entry| entry.resolver.strong_count() > 0);
        self.resolvers = trackers;
    }

    /// Registers a resolver binding on `socket`. Failures are logged;
    /// the next refresh cycle retries from a fresh snapshot anyway.
    fn add_resolver_events(&mut self, socket: Socket, events: EventSet, tracker: &ResolverEntry) {
        let existed = self.entries.contains_key(&socket);
        let entry = self
            .entries
            .entry(socket)
            .or_insert_with(|| SocketEntry::new(socket));

        entry.add_resolver(&tracker.resolver, &tracker.command, events);
        let combined = entry.combined_events();

        if let Err(err) = self.poller.upsert(socket, combined, existed) {
            debug!(socket = socket as i64, error = %err, "failed to add resolver socket event");
        }
    }

    /// Removes a resolver binding from `socket`, tearing down the entry
    /// when it was the last binding.
    fn delete_resolver_events(&mut self, socket: Socket, tracker: &ResolverEntry) {
        let Some(entry) = self.entries.get_mut(&socket) else {
            debug!(socket = socket as i64, "resolver socket is not registered");
            return;
        };

        if !entry.remove_resolver(&tracker.resolver) {
            debug!(
                socket = socket as i64,
                "socket is not registered for this resolver"
            );
            return;
        }

        if entry.is_empty() {
            self.entries.remove(&socket);
            if let Err(err) = self.poller.remove(socket) {
                debug!(socket = socket as i64, error = %err, "failed to delete resolver socket event");
            }
        } else {
            let combined = entry.combined_events();
            if let Err(err) = self.poller.upsert(socket, combined, true) {
                debug!(socket = socket as i64, error = %err, "failed to update resolver socket event");
            }
        }
    }
}
