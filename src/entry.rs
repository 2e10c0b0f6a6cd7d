//! Per-socket registration entries.
//!
//! A [`SocketEntry`] records every party interested in one socket: the
//! commands watching it directly, and the resolvers whose internal
//! sockets happen to live on it. The entry derives the combined interest
//! mask pushed down to the poller and fans incoming readiness back out
//! to each binding. Pollers only ever see the union mask; fan-out is
//! entirely the entry's job.

use tracing::trace;

use crate::command::{CommandRef, WeakCommand, is_same_command};
use crate::event::EventSet;
use crate::poller::Socket;
use crate::resolver::WeakResolver;

/// One command's interest in one socket.
///
/// At most one binding exists per (command, socket) pair; repeated
/// registrations are coalesced by mask union. A binding whose mask
/// drains to empty is removed, never kept around.
struct CommandBinding {
    command: WeakCommand,
    events: EventSet,
}

/// One resolver's interest in one socket, together with the command
/// that owns the resolution.
struct ResolverBinding {
    resolver: WeakResolver,
    command: WeakCommand,
    events: EventSet,
}

/// The reactor's per-socket record.
pub(crate) struct SocketEntry {
    socket: Socket,
    commands: Vec<CommandBinding>,
    resolvers: Vec<ResolverBinding>,
}

impl SocketEntry {
    pub(crate) fn new(socket: Socket) -> Self {
        Self {
            socket,
            commands: Vec::new(),
            resolvers: Vec::new(),
        }
    }

    /// The union of every binding's interest, plus error and hang-up.
    ///
    /// Error and hang-up are implicitly requested once any binding
    /// exists so that connection failures are never silently missed.
    pub(crate) fn combined_events(&self) -> EventSet {
        let mut combined = EventSet::ERROR | EventSet::HUP;
        for binding in &self.commands {
            combined |= binding.events;
        }
        for binding in &self.resolvers {
            combined |= binding.events;
        }
        combined
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.resolvers.is_empty()
    }

    /// The mask currently bound for `command`, if any.
    pub(crate) fn command_events(&self, command: &CommandRef) -> Option<EventSet> {
        self.commands
            .iter()
            .find(|b| is_same_command(&b.command, command))
            .map(|b| b.events)
    }

    /// Adds `events` to the binding for `command`, creating it if absent.
    pub(crate) fn add_command(&mut self, command: &CommandRef, events: EventSet) {
        match self
            .commands
            .iter_mut()
            .find(|b| is_same_command(&b.command, command))
        {
            Some(binding) => binding.events.insert(events),
            None => self.commands.push(CommandBinding {
                command: std::rc::Rc::downgrade(command),
                events,
            }),
        }
    }

    /// Removes `events` from the binding for `command`, dropping the
    /// binding entirely when its mask drains to empty.
    ///
    /// Returns `false` when no binding for `command` exists.
    pub(crate) fn remove_command(&mut self, command: &CommandRef, events: EventSet) -> bool {
        let Some(index) = self
            .commands
            .iter()
            .position(|b| is_same_command(&b.command, command))
        else {
            return false;
        };

        self.commands[index].events.remove(events);
        if self.commands[index].events.is_empty() {
            self.commands.swap_remove(index);
        }
        true
    }

    /// Adds a resolver binding, coalescing with an existing one for the
    /// same resolver.
    pub(crate) fn add_resolver(
        &mut self,
        resolver: &WeakResolver,
        command: &WeakCommand,
        events: EventSet,
    ) {
        match self
            .resolvers
            .iter_mut()
            .find(|b| b.resolver.ptr_eq(resolver))
        {
            Some(binding) => binding.events.insert(events),
            None => self.resolvers.push(ResolverBinding {
                resolver: resolver.clone(),
                command: command.clone(),
                events,
            }),
        }
    }

    /// Removes the binding for `resolver`. Returns `false` when absent.
    pub(crate) fn remove_resolver(&mut self, resolver: &WeakResolver) -> bool {
        let Some(index) = self
            .resolvers
            .iter()
            .position(|b| b.resolver.ptr_eq(resolver))
        else {
            return false;
        };
        self.resolvers.swap_remove(index);
        true
    }

    /// Fans `ready` out to every interested binding.
    ///
    /// Commands receive their callbacks in a fixed order (read, write,
    /// error, hang-up), each gated on the binding's own interest except
    /// for error and hang-up, which are always delivered. Resolver
    /// bindings are translated into the (readable, writable) handle pair
    /// the resolver library expects, and the owning command is marked
    /// runnable when the resolution reaches a final state.
    pub(crate) fn deliver(&self, ready: EventSet) {
        let exceptional = ready.intersects(EventSet::ERROR | EventSet::HUP);

        for binding in &self.commands {
            if !binding.events.intersects(ready) && !exceptional {
                continue;
            }
            let Some(command) = binding.command.upgrade() else {
                trace!(socket = self.socket as i64, "skipping dropped command");
                continue;
            };
            let mut command = command.borrow_mut();
            command.mark_runnable();
            if ready.contains(EventSet::READ) && binding.events.contains(EventSet::READ) {
                command.read_event_received();
            }
            if ready.contains(EventSet::WRITE) && binding.events.contains(EventSet::WRITE) {
                command.write_event_received();
            }
            if ready.contains(EventSet::ERROR) {
                command.error_event_received();
            }
            if ready.contains(EventSet::HUP) {
                command.hup_event_received();
            }
        }

        for binding in &self.resolvers {
            let Some(resolver) = binding.resolver.upgrade() else {
                trace!(socket = self.socket as i64, "skipping dropped resolver");
                continue;
            };

            let read = (ready.intersects(EventSet::READ | EventSet::ERROR | EventSet::HUP))
                .then_some(self.socket);
            let write = (ready.intersects(EventSet::WRITE | EventSet::ERROR | EventSet::HUP))
                .then_some(self.socket);

            let before = resolver.borrow().status();
            resolver.borrow_mut().process(read, write);
            let after = resolver.borrow().status();

            if after.is_final() && !before.is_final() {
                if let Some(command) = binding.command.upgrade() {
                    command.borrow_mut().mark_runnable();
                }
            }
        }
    }
}
