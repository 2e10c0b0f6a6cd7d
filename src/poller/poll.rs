//! Portable `poll(2)`-based poller backend.
//!
//! The fallback for Unix platforms without a scalable kernel queue.
//! Registration is a map update; the cost is paid in `wait`, which
//! rebuilds the `pollfd` array and scans it linearly on every call.

use std::collections::BTreeMap;
use std::io;
use std::time::Duration;

use libc::{POLLERR, POLLHUP, POLLIN, POLLNVAL, POLLOUT, nfds_t, pollfd};

use super::{Poller, Readiness, Socket, timeout_millis};
use crate::event::EventSet;

/// Portable `poll` poller.
pub(crate) struct PollPoller {
    /// Registered masks: `socket -> interest`.
    registered: BTreeMap<Socket, EventSet>,

    /// Reusable `pollfd` array, rebuilt before every wait.
    fds: Vec<pollfd>,
}

fn translate(events: EventSet) -> i16 {
    // Error and hang-up are output-only conditions for poll.
    let mut native = 0;
    if events.contains(EventSet::READ) {
        native |= POLLIN;
    }
    if events.contains(EventSet::WRITE) {
        native |= POLLOUT;
    }
    native
}

fn translate_back(native: i16) -> EventSet {
    let mut events = EventSet::EMPTY;
    if native & POLLIN != 0 {
        events.insert(EventSet::READ);
    }
    if native & POLLOUT != 0 {
        events.insert(EventSet::WRITE);
    }
    if native & (POLLERR | POLLNVAL) != 0 {
        events.insert(EventSet::ERROR);
    }
    if native & POLLHUP != 0 {
        events.insert(EventSet::HUP);
    }
    events
}

impl PollPoller {
    pub(crate) fn new() -> io::Result<Self> {
        Ok(Self {
            registered: BTreeMap::new(),
            fds: Vec::new(),
        })
    }
}

impl Poller for PollPoller {
    fn upsert(&mut self, socket: Socket, events: EventSet, _existing: bool) -> io::Result<()> {
        self.registered.insert(socket, events);
        Ok(())
    }

    fn remove(&mut self, socket: Socket) -> io::Result<()> {
        self.registered.remove(&socket);
        Ok(())
    }

    fn wait(&mut self, ready: &mut Vec<Readiness>, timeout: Duration) -> io::Result<()> {
        self.fds.clear();
        for (&socket, &events) in &self.registered {
            self.fds.push(pollfd {
                fd: socket,
                events: translate(events),
                revents: 0,
            });
        }

        let rc = unsafe {
            libc::poll(
                self.fds.as_mut_ptr(),
                self.fds.len() as nfds_t,
                timeout_millis(timeout),
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        for fd in &self.fds {
            if fd.revents == 0 {
                continue;
            }
            ready.push(Readiness {
                socket: fd.fd,
                events: translate_back(fd.revents),
            });
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "poll"
    }
}
