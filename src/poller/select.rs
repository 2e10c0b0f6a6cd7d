//! Legacy `select(2)`-based poller backend.
//!
//! Kept for platforms and descriptors nothing better can handle. The
//! descriptor sets are rebuilt on every registration change, and the
//! facility caps descriptors at `FD_SETSIZE`; a registration past the
//! cap fails rather than corrupting the sets.

use std::collections::BTreeMap;
use std::io;
use std::mem;
use std::ptr;
use std::time::Duration;

use libc::{FD_ISSET, FD_SET, FD_SETSIZE, FD_ZERO, fd_set, timeval};

use super::{Poller, Readiness, Socket};
use crate::event::EventSet;

/// Legacy `select` poller.
pub(crate) struct SelectPoller {
    /// Registered masks: `socket -> interest`.
    registered: BTreeMap<Socket, EventSet>,

    /// Read-interest descriptor set, kept in sync with `registered`.
    rfds: fd_set,

    /// Write-interest descriptor set, kept in sync with `registered`.
    wfds: fd_set,

    /// Highest registered descriptor.
    fdmax: Socket,
}

impl SelectPoller {
    pub(crate) fn new() -> io::Result<Self> {
        let mut poller = Self {
            registered: BTreeMap::new(),
            rfds: unsafe { mem::zeroed() },
            wfds: unsafe { mem::zeroed() },
            fdmax: 0,
        };
        poller.rebuild_sets();
        Ok(poller)
    }

    /// Recomputes both descriptor sets from scratch. O(n) per
    /// registration change, which is the price of this facility.
    fn rebuild_sets(&mut self) {
        unsafe {
            FD_ZERO(&mut self.rfds);
            FD_ZERO(&mut self.wfds);
        }
        self.fdmax = 0;
        for (&socket, &events) in &self.registered {
            if events.contains(EventSet::READ) {
                unsafe { FD_SET(socket, &mut self.rfds) };
            }
            if events.contains(EventSet::WRITE) {
                unsafe { FD_SET(socket, &mut self.wfds) };
            }
            if socket > self.fdmax {
                self.fdmax = socket;
            }
        }
    }
}

impl Poller for SelectPoller {
    fn upsert(&mut self, socket: Socket, events: EventSet, _existing: bool) -> io::Result<()> {
        if socket as usize >= FD_SETSIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "descriptor exceeds FD_SETSIZE",
            ));
        }
        self.registered.insert(socket, events);
        self.rebuild_sets();
        Ok(())
    }

    fn remove(&mut self, socket: Socket) -> io::Result<()> {
        self.registered.remove(&socket);
        self.rebuild_sets();
        Ok(())
    }

    fn wait(&mut self, ready: &mut Vec<Readiness>, timeout: Duration) -> io::Result<()> {
        let mut rfds = self.rfds;
        let mut wfds = self.wfds;
        let mut timeout = timeval {
            tv_sec: timeout.as_secs().min(libc::time_t::MAX as u64) as libc::time_t,
            tv_usec: timeout.subsec_micros() as _,
        };

        let rc = unsafe {
            libc::select(
                self.fdmax + 1,
                &mut rfds,
                &mut wfds,
                ptr::null_mut(),
                &mut timeout,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        if rc == 0 {
            return Ok(());
        }

        for &socket in self.registered.keys() {
            let mut events = EventSet::EMPTY;
            if unsafe { FD_ISSET(socket, &rfds) } {
                events.insert(EventSet::READ);
            }
            if unsafe { FD_ISSET(socket, &wfds) } {
                events.insert(EventSet::WRITE);
            }
            if !events.is_empty() {
                ready.push(Readiness { socket, events });
            }
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "select"
    }
}
