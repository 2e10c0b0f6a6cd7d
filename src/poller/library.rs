//! Event-loop-library poller backend.
//!
//! Delegates the native multiplexing to the `polling` crate, which
//! carries its own per-platform selection. Useful as a portable last
//! resort and for pinning the reactor to a library-managed facility.
//!
//! `polling` delivers events in oneshot mode: firing removes the
//! interest. The backend re-arms every delivered socket from its own
//! registration map to preserve the reactor's level-triggered contract.

use std::collections::BTreeMap;
use std::io;
use std::time::Duration;

use polling::{Event as LibEvent, Events as LibEvents, Poller as LibPoller};
use tracing::debug;

use super::{Poller, Readiness, Socket};
use crate::event::EventSet;

/// `polling`-library poller.
pub(crate) struct LibraryPoller {
    poller: LibPoller,

    /// Registered masks, needed to re-arm after oneshot delivery.
    registered: BTreeMap<Socket, EventSet>,

    /// Reusable event buffer.
    events: LibEvents,
}

fn translate(socket: Socket, events: EventSet) -> LibEvent {
    LibEvent::new(
        socket as usize,
        events.contains(EventSet::READ),
        events.contains(EventSet::WRITE),
    )
}

#[cfg(unix)]
fn source(socket: Socket) -> std::os::fd::BorrowedFd<'static> {
    unsafe { std::os::fd::BorrowedFd::borrow_raw(socket) }
}

#[cfg(windows)]
fn source(socket: Socket) -> std::os::windows::io::BorrowedSocket<'static> {
    unsafe { std::os::windows::io::BorrowedSocket::borrow_raw(socket) }
}

impl LibraryPoller {
    pub(crate) fn new() -> io::Result<Self> {
        Ok(Self {
            poller: LibPoller::new()?,
            registered: BTreeMap::new(),
            events: LibEvents::new(),
        })
    }
}

impl Poller for LibraryPoller {
    fn upsert(&mut self, socket: Socket, events: EventSet, existing: bool) -> io::Result<()> {
        let interest = translate(socket, events);

        if existing {
            match self.poller.modify(source(socket), interest) {
                Ok(()) => {
                    self.registered.insert(socket, events);
                    return Ok(());
                }
                // The library lost the socket (closed and reused
                // descriptor); fall through and add it fresh.
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err),
            }
        }

        unsafe { self.poller.add(socket, interest)? };
        self.registered.insert(socket, events);
        Ok(())
    }

    fn remove(&mut self, socket: Socket) -> io::Result<()> {
        self.registered.remove(&socket);
        self.poller.delete(source(socket))
    }

    fn wait(&mut self, ready: &mut Vec<Readiness>, timeout: Duration) -> io::Result<()> {
        self.events.clear();
        self.poller.wait(&mut self.events, Some(timeout))?;

        for event in self.events.iter() {
            let socket = event.key as Socket;

            let mut events = EventSet::EMPTY;
            if event.readable {
                events.insert(EventSet::READ);
            }
            if event.writable {
                events.insert(EventSet::WRITE);
            }
            ready.push(Readiness { socket, events });

            // Oneshot delivery dropped the interest; re-arm with the
            // currently registered mask.
            if let Some(&mask) = self.registered.get(&socket) {
                if let Err(err) = self.poller.modify(source(socket), translate(socket, mask)) {
                    debug!(socket = socket as i64, error = %err, "failed to re-arm socket");
                }
            }
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "polling"
    }
}
