//! Resolver tracking: immediate registration, per-cycle refresh,
//! churn safety, and completion notification.

mod common;

use std::time::Duration;

use common::{Op, WaitStep, as_command, as_resolver, command, mock_reactor, stub_resolver};
use downpour_reactor::EventSet;

fn poll_once(reactor: &mut downpour_reactor::Reactor<common::MockPoller>) {
    reactor.poll(Duration::ZERO);
}

#[test]
fn tracking_registers_the_current_socket_set() {
    let (mut reactor, state) = mock_reactor();
    let cmd = command();
    let resolver = stub_resolver(vec![(4, EventSet::READ), (5, EventSet::WRITE)]);

    assert!(reactor.track(&as_resolver(&resolver), &as_command(&cmd)));
    assert_eq!(reactor.tracked_resolvers(), 1);
    assert_eq!(reactor.registered_sockets(), 2);

    let ops = state.borrow().ops.clone();
    assert_eq!(
        ops,
        vec![
            Op::Add(4, common::with_implicit(EventSet::READ)),
            Op::Add(5, common::with_implicit(EventSet::WRITE)),
        ]
    );

    // The same (resolver, command) pair cannot be tracked twice.
    assert!(!reactor.track(&as_resolver(&resolver), &as_command(&cmd)));
    assert_eq!(reactor.tracked_resolvers(), 1);
}

#[test]
fn refresh_swaps_the_old_set_for_the_new_one() {
    let (mut reactor, state) = mock_reactor();
    let cmd = command();
    let resolver = stub_resolver(vec![(4, EventSet::READ), (5, EventSet::WRITE)]);

    assert!(reactor.track(&as_resolver(&resolver), &as_command(&cmd)));
    state.borrow_mut().ops.clear();

    // The resolver retried over a different socket between cycles.
    resolver.borrow_mut().current = vec![(6, EventSet::READ)];
    poll_once(&mut reactor);

    let ops = state.borrow().ops.clone();
    assert_eq!(
        ops,
        vec![
            Op::Remove(4),
            Op::Remove(5),
            Op::Add(6, common::with_implicit(EventSet::READ)),
        ]
    );
    assert_eq!(reactor.registered_sockets(), 1);
}

#[test]
fn completed_query_leaves_only_the_surviving_socket_registered() {
    let (mut reactor, _state) = mock_reactor();
    let cmd = command();
    let resolver = stub_resolver(vec![(10, EventSet::READ), (11, EventSet::READ)]);

    assert!(reactor.track(&as_resolver(&resolver), &as_command(&cmd)));
    assert_eq!(reactor.registered_sockets(), 2);

    // The query finished on socket 10; the resolver closed 11.
    resolver.borrow_mut().current = vec![(10, EventSet::READ)];
    poll_once(&mut reactor);
    assert_eq!(reactor.registered_sockets(), 1);

    // The next cycle must run cleanly against the pruned table.
    poll_once(&mut reactor);
    assert_eq!(reactor.registered_sockets(), 1);
}

#[test]
fn every_cycle_ticks_the_resolver() {
    let (mut reactor, _state) = mock_reactor();
    let cmd = command();
    let resolver = stub_resolver(vec![(4, EventSet::READ)]);

    assert!(reactor.track(&as_resolver(&resolver), &as_command(&cmd)));
    poll_once(&mut reactor);
    poll_once(&mut reactor);

    assert_eq!(resolver.borrow().ticks, 2);
}

#[test]
fn readiness_is_handed_to_the_resolver_and_completion_marks_runnable() {
    let (mut reactor, state) = mock_reactor();
    let cmd = command();
    let resolver = stub_resolver(vec![(10, EventSet::READ)]);
    resolver.borrow_mut().complete_on_process = true;

    assert!(reactor.track(&as_resolver(&resolver), &as_command(&cmd)));

    state
        .borrow_mut()
        .script
        .push_back(WaitStep::Ready(vec![(10, EventSet::READ)]));
    poll_once(&mut reactor);

    assert_eq!(resolver.borrow().processed, vec![(Some(10), None)]);
    assert_eq!(cmd.borrow().runnable, 1);

    // Completion released every resolver socket; the refresh after the
    // wait must have deregistered them all.
    assert_eq!(reactor.registered_sockets(), 0);
    assert_eq!(reactor.tracked_resolvers(), 1);
}

#[test]
fn untracking_deregisters_every_remembered_socket() {
    let (mut reactor, state) = mock_reactor();
    let cmd = command();
    let resolver = stub_resolver(vec![(4, EventSet::READ), (5, EventSet::WRITE)]);

    assert!(reactor.track(&as_resolver(&resolver), &as_command(&cmd)));
    state.borrow_mut().ops.clear();

    assert!(reactor.untrack(&as_resolver(&resolver), &as_command(&cmd)));
    assert_eq!(reactor.tracked_resolvers(), 0);
    assert_eq!(reactor.registered_sockets(), 0);

    let ops = state.borrow().ops.clone();
    assert_eq!(ops, vec![Op::Remove(4), Op::Remove(5)]);

    assert!(!reactor.untrack(&as_resolver(&resolver), &as_command(&cmd)));
}

#[test]
fn dropped_resolver_is_cleaned_up_on_the_next_cycle() {
    let (mut reactor, state) = mock_reactor();
    let cmd = command();

    {
        let resolver = stub_resolver(vec![(4, EventSet::READ)]);
        assert!(reactor.track(&as_resolver(&resolver), &as_command(&cmd)));
    }
    assert_eq!(reactor.tracked_resolvers(), 1);

    poll_once(&mut reactor);

    assert_eq!(reactor.tracked_resolvers(), 0);
    assert_eq!(reactor.registered_sockets(), 0);
    assert_eq!(state.borrow().ops.last(), Some(&Op::Remove(4)));
}

#[test]
fn command_and_resolver_share_a_socket_without_interfering() {
    let (mut reactor, _state) = mock_reactor();
    let cmd = command();
    let resolver = stub_resolver(vec![(7, EventSet::READ)]);

    assert!(reactor.register(7, &as_command(&cmd), EventSet::WRITE));
    assert!(reactor.track(&as_resolver(&resolver), &as_command(&cmd)));
    assert_eq!(reactor.registered_sockets(), 1);

    // Untracking the resolver must leave the command's interest alive.
    assert!(reactor.untrack(&as_resolver(&resolver), &as_command(&cmd)));
    assert_eq!(reactor.registered_sockets(), 1);
}
