//! Solaris / illumos event-port poller backend.
//!
//! Event ports are completion-oriented: delivering an event dissociates
//! the descriptor from the port. To preserve the level-triggered
//! contract the backend keeps its own map of registered masks and
//! re-associates every delivered descriptor before the wait returns.

use std::collections::BTreeMap;
use std::io;
use std::mem;
use std::os::unix::io::RawFd;
use std::time::Duration;

use libc::{
    POLLERR, POLLHUP, POLLIN, POLLNVAL, POLLOUT, PORT_SOURCE_FD, port_associate, port_create,
    port_dissociate, port_event, port_getn, timespec,
};
use tracing::debug;

use super::{Poller, Readiness, Socket};
use crate::event::EventSet;

const INITIAL_EVENTS: usize = 64;

/// Sentinel written into the first event slot before waiting; see
/// [`PortPoller::wait`].
const UNFILLED: usize = usize::MAX;

/// Solaris event-port poller.
pub(crate) struct PortPoller {
    /// Port descriptor.
    port: RawFd,

    /// Registered masks, needed to re-associate after delivery.
    registered: BTreeMap<Socket, EventSet>,

    /// Reusable buffer handed to `port_getn`.
    events: Vec<port_event>,
}

fn translate(events: EventSet) -> i32 {
    let mut native = 0;
    if events.contains(EventSet::READ) {
        native |= POLLIN as i32;
    }
    if events.contains(EventSet::WRITE) {
        native |= POLLOUT as i32;
    }
    native
}

fn translate_back(native: i32) -> EventSet {
    let mut events = EventSet::EMPTY;
    if native & POLLIN as i32 != 0 {
        events.insert(EventSet::READ);
    }
    if native & POLLOUT as i32 != 0 {
        events.insert(EventSet::WRITE);
    }
    if native & (POLLERR as i32 | POLLNVAL as i32) != 0 {
        events.insert(EventSet::ERROR);
    }
    if native & POLLHUP as i32 != 0 {
        events.insert(EventSet::HUP);
    }
    events
}

impl PortPoller {
    pub(crate) fn new() -> io::Result<Self> {
        let port = unsafe { port_create() };
        if port < 0 {
            return Err(io::Error::last_os_error());
        }

        let mut events = Vec::with_capacity(INITIAL_EVENTS);
        events.resize_with(INITIAL_EVENTS, || unsafe { mem::zeroed() });

        Ok(Self {
            port,
            registered: BTreeMap::new(),
            events,
        })
    }

    fn associate(&self, socket: Socket, events: EventSet) -> io::Result<()> {
        let rc = unsafe {
            port_associate(
                self.port,
                PORT_SOURCE_FD,
                socket as usize,
                translate(events),
                std::ptr::null_mut(),
            )
        };
        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

impl Poller for PortPoller {
    fn upsert(&mut self, socket: Socket, events: EventSet, _existing: bool) -> io::Result<()> {
        // port_associate on an already associated descriptor replaces
        // the mask, so add and modify are the same call.
        self.associate(socket, events)?;
        self.registered.insert(socket, events);
        Ok(())
    }

    fn remove(&mut self, socket: Socket) -> io::Result<()> {
        self.registered.remove(&socket);
        let rc = unsafe { port_dissociate(self.port, PORT_SOURCE_FD, socket as usize) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            // Delivery auto-dissociates, so the descriptor may already
            // be gone from the port.
            if err.raw_os_error() == Some(libc::ENOENT) {
                return Ok(());
            }
            return Err(err);
        }
        Ok(())
    }

    fn wait(&mut self, ready: &mut Vec<Readiness>, timeout: Duration) -> io::Result<()> {
        let timeout = timespec {
            tv_sec: timeout.as_secs().min(libc::time_t::MAX as u64) as libc::time_t,
            tv_nsec: timeout.subsec_nanos() as _,
        };

        // An interrupted port_getn can consume events without updating
        // nget. Mark the first slot so a filled event is detectable
        // even when the call reports failure.
        self.events[0].portev_user = UNFILLED as *mut _;

        let mut nget: u32 = 1;
        let rc = unsafe {
            port_getn(
                self.port,
                self.events.as_mut_ptr(),
                self.events.len() as u32,
                &mut nget,
                &timeout,
            )
        };

        let consumed_anyway = self.events[0].portev_user != UNFILLED as *mut _;
        if rc < 0 {
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::ETIME) if !consumed_anyway => return Ok(()),
                Some(libc::ETIME) | Some(libc::EINTR) if consumed_anyway => {}
                _ => return Err(err),
            }
        }

        for event in &self.events[..nget as usize] {
            let socket = event.portev_object as Socket;
            ready.push(Readiness {
                socket,
                events: translate_back(event.portev_events),
            });

            // Delivery dissociated the descriptor; put it back with its
            // current mask to keep level-triggered semantics.
            if let Some(&mask) = self.registered.get(&socket) {
                if let Err(err) = self.associate(socket, mask) {
                    debug!(socket, error = %err, "failed to re-associate descriptor");
                }
            }
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "port"
    }
}

impl Drop for PortPoller {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.port);
        }
    }
}
