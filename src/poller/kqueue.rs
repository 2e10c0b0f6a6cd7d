//! BSD / macOS `kqueue`-based poller backend.
//!
//! Functionally equivalent to the Linux `epoll` backend and exposed
//! through the same interface. `kqueue` tracks read and write interest
//! as two separate filters per socket, so this backend always installs
//! both and toggles them with enable/disable rather than adding and
//! removing filters as interest changes.
//!
//! Without `EV_CLEAR` a kqueue filter is level-triggered, which is what
//! the reactor requires; this backend never sets it.

use std::io;
use std::mem;
use std::os::unix::io::RawFd;
use std::ptr;
use std::time::Duration;

use libc::{
    EV_ADD, EV_DELETE, EV_DISABLE, EV_ENABLE, EV_EOF, EV_ERROR, EVFILT_READ, EVFILT_WRITE, kevent,
    kqueue, timespec,
};

use super::{Poller, Readiness, Socket};
use crate::event::EventSet;

const INITIAL_EVENTS: usize = 64;

/// BSD `kqueue` poller.
pub(crate) struct KqueuePoller {
    /// Kqueue instance descriptor.
    kqfd: RawFd,

    /// Reusable buffer handed to `kevent`.
    events: Vec<libc::kevent>,
}

fn filter_change(socket: Socket, filter: i16, enable: bool) -> libc::kevent {
    let mut change: libc::kevent = unsafe { mem::zeroed() };
    change.ident = socket as usize;
    change.filter = filter as _;
    change.flags = EV_ADD | if enable { EV_ENABLE } else { EV_DISABLE };
    change
}

fn timeout_timespec(timeout: Duration) -> timespec {
    timespec {
        tv_sec: timeout.as_secs().min(libc::time_t::MAX as u64) as libc::time_t,
        tv_nsec: timeout.subsec_nanos() as _,
    }
}

impl KqueuePoller {
    pub(crate) fn new() -> io::Result<Self> {
        let kqfd = unsafe { kqueue() };
        if kqfd < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            kqfd,
            events: Vec::with_capacity(INITIAL_EVENTS),
        })
    }

    fn apply(&mut self, changes: &[libc::kevent]) -> io::Result<()> {
        let rc = unsafe {
            kevent(
                self.kqfd,
                changes.as_ptr(),
                changes.len() as _,
                ptr::null_mut(),
                0,
                ptr::null(),
            )
        };
        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

impl Poller for KqueuePoller {
    fn upsert(&mut self, socket: Socket, events: EventSet, _existing: bool) -> io::Result<()> {
        // EV_ADD on an existing filter updates it in place, so add and
        // modify collapse into one primitive here.
        let changes = [
            filter_change(socket, EVFILT_READ as i16, events.contains(EventSet::READ)),
            filter_change(socket, EVFILT_WRITE as i16, events.contains(EventSet::WRITE)),
        ];
        self.apply(&changes)
    }

    fn remove(&mut self, socket: Socket) -> io::Result<()> {
        let mut changes = [
            filter_change(socket, EVFILT_READ as i16, false),
            filter_change(socket, EVFILT_WRITE as i16, false),
        ];
        changes[0].flags = EV_DELETE;
        changes[1].flags = EV_DELETE;
        self.apply(&changes)
    }

    fn wait(&mut self, ready: &mut Vec<Readiness>, timeout: Duration) -> io::Result<()> {
        let timeout = timeout_timespec(timeout);

        unsafe {
            self.events.set_len(self.events.capacity());
        }

        let n = unsafe {
            kevent(
                self.kqfd,
                ptr::null(),
                0,
                self.events.as_mut_ptr(),
                self.events.capacity() as _,
                &timeout,
            )
        };

        if n < 0 {
            unsafe {
                self.events.set_len(0);
            }
            return Err(io::Error::last_os_error());
        }

        unsafe {
            self.events.set_len(n as usize);
        }

        for event in &self.events {
            let socket = event.ident as Socket;

            let mut translated = EventSet::EMPTY;
            if event.filter == EVFILT_READ as _ {
                translated.insert(EventSet::READ);
            } else if event.filter == EVFILT_WRITE as _ {
                translated.insert(EventSet::WRITE);
            }
            if event.flags & EV_EOF != 0 {
                translated.insert(EventSet::HUP);
            }
            if event.flags & EV_ERROR != 0 {
                translated.insert(EventSet::ERROR);
            }

            // The two filters report independently; merge them so the
            // reactor sees one readiness record per socket.
            if let Some(existing) = ready.iter_mut().find(|r| r.socket == socket) {
                existing.events |= translated;
            } else {
                ready.push(Readiness {
                    socket,
                    events: translated,
                });
            }
        }

        if n as usize == self.events.capacity() {
            self.events.reserve(self.events.capacity());
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "kqueue"
    }
}

impl Drop for KqueuePoller {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.kqfd);
        }
    }
}
