//! Registration bookkeeping: coalescing, teardown, and rollback of the
//! native registration sequence, observed through a recording poller.

mod common;

use common::{Op, as_command, command, mock_reactor, with_implicit};
use downpour_reactor::EventSet;

#[test]
fn repeated_registration_coalesces_into_one_add_then_modify() {
    let (mut reactor, state) = mock_reactor();
    let cmd = command();

    assert!(reactor.register(7, &as_command(&cmd), EventSet::READ));
    assert!(reactor.register(7, &as_command(&cmd), EventSet::WRITE));

    let ops = state.borrow().ops.clone();
    assert_eq!(
        ops,
        vec![
            Op::Add(7, with_implicit(EventSet::READ)),
            Op::Modify(7, with_implicit(EventSet::READ | EventSet::WRITE)),
        ]
    );
    assert_eq!(reactor.registered_sockets(), 1);
}

#[test]
fn full_deregistration_tears_down_exactly_once() {
    let (mut reactor, state) = mock_reactor();
    let first = command();
    let second = command();

    assert!(reactor.register(7, &as_command(&first), EventSet::READ));
    assert!(reactor.register(7, &as_command(&second), EventSet::WRITE));

    assert!(reactor.deregister(7, &as_command(&first), EventSet::READ));
    assert!(reactor.deregister(7, &as_command(&second), EventSet::WRITE));

    let removes = state
        .borrow()
        .ops
        .iter()
        .filter(|op| matches!(op, Op::Remove(7)))
        .count();
    assert_eq!(removes, 1);
    assert_eq!(reactor.registered_sockets(), 0);

    // A fresh registration must issue a native add, proving the entry
    // really was erased.
    assert!(reactor.register(7, &as_command(&first), EventSet::READ));
    assert_eq!(
        state.borrow().ops.last(),
        Some(&Op::Add(7, with_implicit(EventSet::READ)))
    );
}

#[test]
fn partial_deregistration_keeps_the_remaining_interest() {
    let (mut reactor, state) = mock_reactor();
    let first = command();
    let second = command();

    assert!(reactor.register(7, &as_command(&first), EventSet::READ));
    assert!(reactor.register(7, &as_command(&second), EventSet::WRITE));
    assert!(reactor.deregister(7, &as_command(&first), EventSet::READ));

    assert_eq!(
        state.borrow().ops.last(),
        Some(&Op::Modify(7, with_implicit(EventSet::WRITE)))
    );
    assert_eq!(reactor.registered_sockets(), 1);
}

#[test]
fn deregistering_an_unknown_socket_is_reported() {
    let (mut reactor, _state) = mock_reactor();
    let cmd = command();

    assert!(!reactor.deregister(7, &as_command(&cmd), EventSet::READ));
}

#[test]
fn deregistering_a_foreign_command_is_reported() {
    let (mut reactor, _state) = mock_reactor();
    let owner = command();
    let stranger = command();

    assert!(reactor.register(7, &as_command(&owner), EventSet::READ));
    assert!(!reactor.deregister(7, &as_command(&stranger), EventSet::READ));
    assert_eq!(reactor.registered_sockets(), 1);
}

#[test]
fn empty_interest_mask_is_rejected() {
    let (mut reactor, state) = mock_reactor();
    let cmd = command();

    assert!(!reactor.register(7, &as_command(&cmd), EventSet::EMPTY));
    assert!(state.borrow().ops.is_empty());
    assert_eq!(reactor.registered_sockets(), 0);
}

#[cfg(unix)]
#[test]
fn invalid_socket_handle_is_rejected() {
    let (mut reactor, state) = mock_reactor();
    let cmd = command();

    assert!(!reactor.register(-1, &as_command(&cmd), EventSet::READ));
    assert!(state.borrow().ops.is_empty());
}

#[test]
fn failed_native_add_leaves_no_entry_behind() {
    let (mut reactor, state) = mock_reactor();
    let cmd = command();

    state.borrow_mut().fail_next_upsert = true;
    assert!(!reactor.register(7, &as_command(&cmd), EventSet::READ));
    assert_eq!(reactor.registered_sockets(), 0);

    // The retry starts from a clean slate: a native add, not a modify.
    assert!(reactor.register(7, &as_command(&cmd), EventSet::READ));
    assert_eq!(
        state.borrow().ops.last(),
        Some(&Op::Add(7, with_implicit(EventSet::READ)))
    );
}

#[test]
fn failed_native_modify_restores_the_prior_registration() {
    let (mut reactor, state) = mock_reactor();
    let cmd = command();

    assert!(reactor.register(7, &as_command(&cmd), EventSet::READ));

    state.borrow_mut().fail_next_upsert = true;
    assert!(!reactor.register(7, &as_command(&cmd), EventSet::WRITE));

    // Only the original read interest survives: withdrawing it must
    // empty the binding and tear the entry down.
    assert!(reactor.deregister(7, &as_command(&cmd), EventSet::READ));
    assert_eq!(state.borrow().ops.last(), Some(&Op::Remove(7)));
    assert_eq!(reactor.registered_sockets(), 0);
}
