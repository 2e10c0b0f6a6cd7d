//! Readiness events and interest masks.
//!
//! An [`EventSet`] is a small bitmask combining the four readiness
//! conditions a socket can report. The same type is used both for
//! expressing interest at registration time and for describing what
//! actually happened when the poller wakes up.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// A set of readiness events.
///
/// Error and hang-up are special: once a socket has any registration at
/// all, they are always watched and always delivered, whether or not a
/// consumer asked for them. Read and write are delivered only to
/// consumers that requested them.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EventSet(u8);

impl EventSet {
    /// The empty set.
    pub const EMPTY: EventSet = EventSet(0);

    /// The socket has data to read (or a pending connection to accept).
    pub const READ: EventSet = EventSet(1 << 0);

    /// The socket can accept more outgoing data.
    pub const WRITE: EventSet = EventSet(1 << 1);

    /// An error condition is pending on the socket.
    pub const ERROR: EventSet = EventSet(1 << 2);

    /// The peer closed its end of the connection.
    pub const HUP: EventSet = EventSet(1 << 3);

    /// Returns `true` if no event is set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if every event in `other` is also set in `self`.
    pub fn contains(self, other: EventSet) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if `self` and `other` share at least one event.
    pub fn intersects(self, other: EventSet) -> bool {
        self.0 & other.0 != 0
    }

    /// Adds all events in `other` to `self`.
    pub fn insert(&mut self, other: EventSet) {
        self.0 |= other.0;
    }

    /// Removes all events in `other` from `self`.
    pub fn remove(&mut self, other: EventSet) {
        self.0 &= !other.0;
    }

    /// Returns the events set in `self` but not in `other`.
    pub fn difference(self, other: EventSet) -> EventSet {
        EventSet(self.0 & !other.0)
    }
}

impl BitOr for EventSet {
    type Output = EventSet;

    fn bitor(self, rhs: EventSet) -> EventSet {
        EventSet(self.0 | rhs.0)
    }
}

impl BitOrAssign for EventSet {
    fn bitor_assign(&mut self, rhs: EventSet) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for EventSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("(empty)");
        }

        let mut first = true;
        for (bit, name) in [
            (EventSet::READ, "READ"),
            (EventSet::WRITE, "WRITE"),
            (EventSet::ERROR, "ERROR"),
            (EventSet::HUP, "HUP"),
        ] {
            if self.contains(bit) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}
