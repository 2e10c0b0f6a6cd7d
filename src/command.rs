//! The consumer side of the reactor contract.
//!
//! A [`Command`] is an externally owned state machine (an HTTP download,
//! a tracker announce, a peer connection) that registers interest in
//! socket readiness and is notified through the callbacks below. The
//! reactor never owns a command; it holds a weak reference and an
//! interest mask, and the caller is responsible for deregistering a
//! command before dropping it. A command dropped while still registered
//! is skipped at delivery time, not dereferenced.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// A consumer of readiness notifications.
///
/// All callbacks run on the reactor thread and must not block; the
/// expected pattern is to move a bounded amount of data or flip a state
/// flag and return. Heavier work belongs in the command's own
/// execution step, scheduled via [`mark_runnable`](Command::mark_runnable).
pub trait Command {
    /// The socket this command watches became readable.
    fn read_event_received(&mut self) {}

    /// The socket this command watches became writable.
    fn write_event_received(&mut self) {}

    /// An error condition was reported for the watched socket.
    fn error_event_received(&mut self) {}

    /// The peer hung up on the watched socket.
    fn hup_event_received(&mut self) {}

    /// An event relevant to this command fired; the owning scheduler
    /// should run the command on its next pass.
    fn mark_runnable(&mut self);
}

/// Shared handle to a command, as held by the caller.
pub type CommandRef = Rc<RefCell<dyn Command>>;

/// Non-owning handle stored inside the reactor.
pub(crate) type WeakCommand = Weak<RefCell<dyn Command>>;

/// Identity comparison between a stored binding and a caller handle.
///
/// Compares allocation addresses, so it stays meaningful even after the
/// command has been dropped.
pub(crate) fn is_same_command(weak: &WeakCommand, command: &CommandRef) -> bool {
    std::ptr::addr_eq(weak.as_ptr(), Rc::as_ptr(command))
}
