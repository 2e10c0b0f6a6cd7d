//! Test doubles shared by the integration tests: a scripted poller
//! that records every native call, a command that counts its
//! callbacks, and a resolver stub with a settable socket set.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;
use std::time::Duration;

use downpour_reactor::command::{Command, CommandRef};
use downpour_reactor::poller::{Poller, Readiness, Socket};
use downpour_reactor::resolver::{AsyncResolver, ResolverRef, ResolverSockets, ResolverStatus};
use downpour_reactor::{EventSet, Reactor};

/// One native call observed by the mock poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add(Socket, EventSet),
    Modify(Socket, EventSet),
    Remove(Socket),
}

/// Outcome of one scripted wait. An empty script times out.
pub enum WaitStep {
    Ready(Vec<(Socket, EventSet)>),
    TimedOut,
    Interrupted,
    Fail(io::ErrorKind),
}

#[derive(Default)]
pub struct MockState {
    pub ops: Vec<Op>,
    pub script: VecDeque<WaitStep>,
    pub wait_timeouts: Vec<Duration>,
    pub fail_next_upsert: bool,
}

/// A poller that performs no I/O: registrations are recorded and waits
/// replay a script.
pub struct MockPoller(pub Rc<RefCell<MockState>>);

impl Poller for MockPoller {
    fn upsert(&mut self, socket: Socket, events: EventSet, existing: bool) -> io::Result<()> {
        let mut state = self.0.borrow_mut();
        if state.fail_next_upsert {
            state.fail_next_upsert = false;
            return Err(io::Error::other("injected registration failure"));
        }
        state.ops.push(if existing {
            Op::Modify(socket, events)
        } else {
            Op::Add(socket, events)
        });
        Ok(())
    }

    fn remove(&mut self, socket: Socket) -> io::Result<()> {
        self.0.borrow_mut().ops.push(Op::Remove(socket));
        Ok(())
    }

    fn wait(&mut self, ready: &mut Vec<Readiness>, timeout: Duration) -> io::Result<()> {
        let mut state = self.0.borrow_mut();
        state.wait_timeouts.push(timeout);
        match state.script.pop_front() {
            None | Some(WaitStep::TimedOut) => Ok(()),
            Some(WaitStep::Ready(items)) => {
                for (socket, events) in items {
                    ready.push(Readiness { socket, events });
                }
                Ok(())
            }
            Some(WaitStep::Interrupted) => Err(io::Error::from(io::ErrorKind::Interrupted)),
            Some(WaitStep::Fail(kind)) => Err(io::Error::from(kind)),
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Builds a reactor over a fresh mock poller, returning the shared
/// state for scripting and assertions.
pub fn mock_reactor() -> (Reactor<MockPoller>, Rc<RefCell<MockState>>) {
    let state = Rc::new(RefCell::new(MockState::default()));
    (Reactor::with_poller(MockPoller(state.clone())), state)
}

/// A command that counts every callback and records their order.
#[derive(Default)]
pub struct TestCommand {
    pub reads: usize,
    pub writes: usize,
    pub errors: usize,
    pub hups: usize,
    pub runnable: usize,
    pub order: Vec<&'static str>,
}

impl Command for TestCommand {
    fn read_event_received(&mut self) {
        self.reads += 1;
        self.order.push("read");
    }

    fn write_event_received(&mut self) {
        self.writes += 1;
        self.order.push("write");
    }

    fn error_event_received(&mut self) {
        self.errors += 1;
        self.order.push("error");
    }

    fn hup_event_received(&mut self) {
        self.hups += 1;
        self.order.push("hup");
    }

    fn mark_runnable(&mut self) {
        self.runnable += 1;
        self.order.push("runnable");
    }
}

pub fn command() -> Rc<RefCell<TestCommand>> {
    Rc::new(RefCell::new(TestCommand::default()))
}

pub fn as_command(command: &Rc<RefCell<TestCommand>>) -> CommandRef {
    command.clone()
}

/// A resolver whose socket set and status are driven by the test.
pub struct StubResolver {
    pub current: Vec<(Socket, EventSet)>,
    pub status: ResolverStatus,
    /// Flip to `Success` (and release all sockets) the next time a
    /// readiness event is processed.
    pub complete_on_process: bool,
    pub ticks: usize,
    pub processed: Vec<(Option<Socket>, Option<Socket>)>,
}

impl StubResolver {
    pub fn new(current: Vec<(Socket, EventSet)>) -> Self {
        Self {
            current,
            status: ResolverStatus::Active,
            complete_on_process: false,
            ticks: 0,
            processed: Vec::new(),
        }
    }
}

impl AsyncResolver for StubResolver {
    fn sockets(&self) -> ResolverSockets {
        self.current.iter().copied().collect()
    }

    fn process(&mut self, read: Option<Socket>, write: Option<Socket>) {
        if read.is_none() && write.is_none() {
            self.ticks += 1;
            return;
        }
        self.processed.push((read, write));
        if self.complete_on_process {
            self.status = ResolverStatus::Success;
            self.current.clear();
        }
    }

    fn status(&self) -> ResolverStatus {
        self.status
    }
}

pub fn stub_resolver(current: Vec<(Socket, EventSet)>) -> Rc<RefCell<StubResolver>> {
    Rc::new(RefCell::new(StubResolver::new(current)))
}

pub fn as_resolver(resolver: &Rc<RefCell<StubResolver>>) -> ResolverRef {
    resolver.clone()
}

/// The bits a registration always carries on top of what was asked for.
pub fn with_implicit(events: EventSet) -> EventSet {
    events | EventSet::ERROR | EventSet::HUP
}

/// Installs the env-filtered subscriber so `RUST_LOG` works in tests.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
