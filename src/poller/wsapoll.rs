//! Windows `WSAPoll`-based poller backend.
//!
//! Mirrors the semantics of the Unix `poll` backend using non-blocking
//! sockets and `WSAPoll`. Readiness-based, not completion-based:
//! registration is a map update and the socket array is rebuilt and
//! scanned on every wait.

use std::collections::BTreeMap;
use std::io;
use std::mem;
use std::sync::Once;
use std::time::Duration;

use tracing::debug;
use windows_sys::Win32::Networking::WinSock::{
    POLLERR, POLLHUP, POLLNVAL, POLLRDNORM, POLLWRNORM, SOCKET, SOCKET_ERROR, WSADATA, WSAPOLLFD,
    WSAPoll, WSAStartup,
};

use super::{Poller, Readiness, Socket, timeout_millis};
use crate::event::EventSet;

/// Initializes Winsock once per process.
fn ensure_winsock() {
    static START: Once = Once::new();
    START.call_once(|| unsafe {
        let mut data: WSADATA = mem::zeroed();
        let rc = WSAStartup(0x0202, &mut data);
        if rc != 0 {
            debug!(code = rc, "WSAStartup failed");
        }
    });
}

/// Windows `WSAPoll` poller.
pub(crate) struct WsaPollPoller {
    /// Registered masks: `socket -> interest`.
    registered: BTreeMap<Socket, EventSet>,

    /// Reusable `WSAPOLLFD` array, rebuilt before every wait.
    fds: Vec<WSAPOLLFD>,
}

fn translate(events: EventSet) -> i16 {
    // WSAPoll rejects POLLERR/POLLHUP in the interest field; they are
    // reported regardless.
    let mut native = 0;
    if events.contains(EventSet::READ) {
        native |= POLLRDNORM;
    }
    if events.contains(EventSet::WRITE) {
        native |= POLLWRNORM;
    }
    native
}

fn translate_back(native: i16) -> EventSet {
    let mut events = EventSet::EMPTY;
    if native & POLLRDNORM != 0 {
        events.insert(EventSet::READ);
    }
    if native & POLLWRNORM != 0 {
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

impl WsaPollPoller {
    pub(crate) fn new() -> io::Result<Self> {
        ensure_winsock();
        Ok(Self {
            registered: BTreeMap::new(),
            fds: Vec::new(),
        })
    }
}

impl Poller for WsaPollPoller {
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
            self.fds.push(WSAPOLLFD {
                fd: socket as SOCKET,
                events: translate(events),
                revents: 0,
            });
        }

        let rc = unsafe {
            WSAPoll(
                self.fds.as_mut_ptr(),
                self.fds.len() as u32,
                timeout_millis(timeout),
            )
        };
        if rc == SOCKET_ERROR {
            return Err(io::Error::last_os_error());
        }

        for fd in &self.fds {
            if fd.revents == 0 {
                continue;
            }
            ready.push(Readiness {
                socket: fd.fd as Socket,
                events: translate_back(fd.revents),
            });
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "wsapoll"
    }
}
