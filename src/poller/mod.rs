//! Platform-specific poller backends.
//!
//! Every backend implements the same small [`Poller`] contract: push a
//! union interest mask down for a socket, drop a socket, and block until
//! something is ready. The reactor core owns all per-consumer
//! bookkeeping; backends never see individual bindings.
//!
//! The concrete backend is chosen at runtime by [`NativePoller::probe`],
//! which tries the best facility the platform offers and falls back
//! gracefully. All backends preserve level-triggered semantics: a socket
//! with unread data is reported ready on every wait until the data is
//! drained or interest is withdrawn. Facilities that deliver one-shot
//! events (event ports, the `polling` crate) re-arm at delivery time to
//! keep that promise.

use std::io;
use std::time::Duration;

use tracing::debug;

use crate::error::PollerError;
use crate::event::EventSet;

#[cfg(any(target_os = "linux", target_os = "android"))]
mod epoll;

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
mod kqueue;

#[cfg(any(target_os = "solaris", target_os = "illumos"))]
mod port;

#[cfg(unix)]
mod poll;

#[cfg(windows)]
mod wsapoll;

#[cfg(unix)]
mod select;

mod library;

/// An opaque platform socket handle.
#[cfg(unix)]
pub type Socket = std::os::fd::RawFd;

/// An opaque platform socket handle.
#[cfg(windows)]
pub type Socket = std::os::windows::io::RawSocket;

/// One socket's readiness, as reported by a backend.
#[derive(Debug, Clone, Copy)]
pub struct Readiness {
    /// The socket that became ready.
    pub socket: Socket,
    /// What it became ready for, already translated from native bits.
    pub events: EventSet,
}

/// The native multiplexing contract implemented by every backend.
pub trait Poller {
    /// Installs or updates the union interest mask for `socket`.
    ///
    /// `existing` tells the backend whether the reactor believes the
    /// socket is already registered; facilities that distinguish add
    /// from modify use it to pick the primitive, falling back to add
    /// when the kernel reports the socket unknown (a closed descriptor
    /// may have been reused behind the reactor's back).
    fn upsert(&mut self, socket: Socket, events: EventSet, existing: bool) -> io::Result<()>;

    /// Tears down the native registration for `socket`.
    fn remove(&mut self, socket: Socket) -> io::Result<()>;

    /// Blocks until at least one socket is ready or `timeout` elapses,
    /// appending translated readiness into `ready`.
    ///
    /// An interrupted wait surfaces as [`io::ErrorKind::Interrupted`];
    /// the reactor core retries with the remaining timeout.
    fn wait(&mut self, ready: &mut Vec<Readiness>, timeout: Duration) -> io::Result<()>;

    /// Short name of the backing facility, for diagnostics.
    fn name(&self) -> &'static str;
}

/// Selects which facility backs the reactor.
///
/// `Auto` probes the platform for the best one available. The explicit
/// kinds exist for operators who need to pin a facility; asking for one
/// the platform does not offer fails cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerKind {
    /// Probe for the best available facility.
    Auto,
    /// Linux `epoll`.
    Epoll,
    /// BSD / macOS `kqueue`.
    Kqueue,
    /// Solaris / illumos event ports.
    Port,
    /// Portable `poll` (`WSAPoll` on Windows).
    Poll,
    /// Legacy `select`.
    Select,
    /// The `polling` event-loop library.
    Library,
}

/// Runtime-selected backend, wrapping whichever facility the probe (or
/// an explicit [`PollerKind`]) produced.
pub struct NativePoller(Inner);

/// One variant per facility compiled in for the target platform.
enum Inner {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    Epoll(epoll::EpollPoller),

    #[cfg(any(
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "dragonfly"
    ))]
    Kqueue(kqueue::KqueuePoller),

    #[cfg(any(target_os = "solaris", target_os = "illumos"))]
    Port(port::PortPoller),

    #[cfg(unix)]
    Poll(poll::PollPoller),

    #[cfg(windows)]
    WsaPoll(wsapoll::WsaPollPoller),

    #[cfg(unix)]
    Select(select::SelectPoller),

    Library(library::LibraryPoller),
}

impl NativePoller {
    /// Probes for the best facility the platform offers.
    ///
    /// Order is by registration and wakeup cost: the scalable kernel
    /// queues first, then portable `poll`, then `select`, then the
    /// `polling` library as the last resort. A facility whose
    /// constructor fails is logged and skipped.
    pub fn probe() -> Result<NativePoller, PollerError> {
        #[cfg(any(target_os = "linux", target_os = "android"))]
        match epoll::EpollPoller::new() {
            Ok(poller) => return Ok(NativePoller(Inner::Epoll(poller))),
            Err(err) => debug!(error = %err, "epoll unavailable, probing further"),
        }

        #[cfg(any(
            target_os = "macos",
            target_os = "ios",
            target_os = "freebsd",
            target_os = "openbsd",
            target_os = "dragonfly"
        ))]
        match kqueue::KqueuePoller::new() {
            Ok(poller) => return Ok(NativePoller(Inner::Kqueue(poller))),
            Err(err) => debug!(error = %err, "kqueue unavailable, probing further"),
        }

        #[cfg(any(target_os = "solaris", target_os = "illumos"))]
        match port::PortPoller::new() {
            Ok(poller) => return Ok(NativePoller(Inner::Port(poller))),
            Err(err) => debug!(error = %err, "event ports unavailable, probing further"),
        }

        #[cfg(unix)]
        match poll::PollPoller::new() {
            Ok(poller) => return Ok(NativePoller(Inner::Poll(poller))),
            Err(err) => debug!(error = %err, "poll unavailable, probing further"),
        }

        #[cfg(windows)]
        match wsapoll::WsaPollPoller::new() {
            Ok(poller) => return Ok(NativePoller(Inner::WsaPoll(poller))),
            Err(err) => debug!(error = %err, "WSAPoll unavailable, probing further"),
        }

        #[cfg(unix)]
        match select::SelectPoller::new() {
            Ok(poller) => return Ok(NativePoller(Inner::Select(poller))),
            Err(err) => debug!(error = %err, "select unavailable, probing further"),
        }

        match library::LibraryPoller::new() {
            Ok(poller) => Ok(NativePoller(Inner::Library(poller))),
            Err(err) => {
                debug!(error = %err, "polling library unavailable");
                Err(PollerError::Exhausted)
            }
        }
    }

    /// Builds the requested facility, or probes when `Auto`.
    pub fn with_kind(kind: PollerKind) -> Result<NativePoller, PollerError> {
        match kind {
            PollerKind::Auto => Self::probe(),

            #[cfg(any(target_os = "linux", target_os = "android"))]
            PollerKind::Epoll => epoll::EpollPoller::new()
                .map(|poller| NativePoller(Inner::Epoll(poller)))
                .map_err(|source| PollerError::Creation {
                    backend: "epoll",
                    source,
                }),

            #[cfg(any(
                target_os = "macos",
                target_os = "ios",
                target_os = "freebsd",
                target_os = "openbsd",
                target_os = "dragonfly"
            ))]
            PollerKind::Kqueue => kqueue::KqueuePoller::new()
                .map(|poller| NativePoller(Inner::Kqueue(poller)))
                .map_err(|source| PollerError::Creation {
                    backend: "kqueue",
                    source,
                }),

            #[cfg(any(target_os = "solaris", target_os = "illumos"))]
            PollerKind::Port => port::PortPoller::new()
                .map(|poller| NativePoller(Inner::Port(poller)))
                .map_err(|source| PollerError::Creation {
                    backend: "port",
                    source,
                }),

            #[cfg(unix)]
            PollerKind::Poll => poll::PollPoller::new()
                .map(|poller| NativePoller(Inner::Poll(poller)))
                .map_err(|source| PollerError::Creation {
                    backend: "poll",
                    source,
                }),

            #[cfg(windows)]
            PollerKind::Poll => wsapoll::WsaPollPoller::new()
                .map(|poller| NativePoller(Inner::WsaPoll(poller)))
                .map_err(|source| PollerError::Creation {
                    backend: "wsapoll",
                    source,
                }),

            #[cfg(unix)]
            PollerKind::Select => select::SelectPoller::new()
                .map(|poller| NativePoller(Inner::Select(poller)))
                .map_err(|source| PollerError::Creation {
                    backend: "select",
                    source,
                }),

            PollerKind::Library => library::LibraryPoller::new()
                .map(|poller| NativePoller(Inner::Library(poller)))
                .map_err(|source| PollerError::Creation {
                    backend: "polling",
                    source,
                }),

            _ => Err(PollerError::Unsupported { kind }),
        }
    }
}

macro_rules! delegate {
    ($inner:expr, $poller:ident => $call:expr) => {
        match $inner {
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Inner::Epoll($poller) => $call,

            #[cfg(any(
                target_os = "macos",
                target_os = "ios",
                target_os = "freebsd",
                target_os = "openbsd",
                target_os = "dragonfly"
            ))]
            Inner::Kqueue($poller) => $call,

            #[cfg(any(target_os = "solaris", target_os = "illumos"))]
            Inner::Port($poller) => $call,

            #[cfg(unix)]
            Inner::Poll($poller) => $call,

            #[cfg(windows)]
            Inner::WsaPoll($poller) => $call,

            #[cfg(unix)]
            Inner::Select($poller) => $call,

            Inner::Library($poller) => $call,
        }
    };
}

impl Poller for NativePoller {
    fn upsert(&mut self, socket: Socket, events: EventSet, existing: bool) -> io::Result<()> {
        delegate!(&mut self.0, poller => poller.upsert(socket, events, existing))
    }

    fn remove(&mut self, socket: Socket) -> io::Result<()> {
        delegate!(&mut self.0, poller => poller.remove(socket))
    }

    fn wait(&mut self, ready: &mut Vec<Readiness>, timeout: Duration) -> io::Result<()> {
        delegate!(&mut self.0, poller => poller.wait(ready, timeout))
    }

    fn name(&self) -> &'static str {
        delegate!(&self.0, poller => poller.name())
    }
}

/// A handle the platform could actually have produced.
#[cfg(unix)]
pub(crate) fn is_valid_socket(socket: Socket) -> bool {
    socket >= 0
}

/// A handle the platform could actually have produced.
#[cfg(windows)]
pub(crate) fn is_valid_socket(socket: Socket) -> bool {
    socket != windows_sys::Win32::Networking::WinSock::INVALID_SOCKET as Socket
}

/// Saturating millisecond conversion for the facilities that take one.
pub(crate) fn timeout_millis(timeout: Duration) -> i32 {
    timeout.as_millis().min(i32::MAX as u128) as i32
}
