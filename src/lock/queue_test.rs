use bytes::Bytes;
use tokio::sync::oneshot::error::TryRecvError;

use super::*;
use crate::EventKind;
use crate::Listener;
use crate::WatchEvent;

fn seeded(names: &[&str]) -> LockQueue {
    LockQueue::new("/l", names.iter().map(|s| s.to_string()))
}

fn created(name: &str) -> WatchEvent {
    WatchEvent::new(format!("/l/{name}"), EventKind::Created, Bytes::new())
}

fn deleted(name: &str) -> WatchEvent {
    WatchEvent::new(format!("/l/{name}"), EventKind::Deleted, Bytes::new())
}

#[test]
fn test_enqueue_on_known_minimum_grants_immediately() {
    let queue = seeded(&["0000000001", "0000000002"]);

    let mut second = queue.enqueue("0000000002", LockOwner::from(2));
    assert_eq!(second.try_recv(), Err(TryRecvError::Empty));

    let mut first = queue.enqueue("0000000001", LockOwner::from(1));
    assert_eq!(first.try_recv(), Ok(Wakeup::Granted));
    assert_eq!(queue.waiter_count(), 1);
}

#[test]
fn test_creation_reported_after_enqueue_grants() {
    let queue = seeded(&[]);

    let mut rx = queue.enqueue("0000000003", LockOwner::from(1));
    assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));

    queue.on_event(&created("0000000003"));
    assert_eq!(rx.try_recv(), Ok(Wakeup::Granted));
}

#[test]
fn test_deleting_minimum_grants_next_in_sequence_order() {
    let queue = seeded(&["0000000001", "0000000002", "0000000003"]);
    let mut third = queue.enqueue("0000000003", LockOwner::from(3));
    let mut second = queue.enqueue("0000000002", LockOwner::from(2));

    queue.on_event(&deleted("0000000001"));
    assert_eq!(second.try_recv(), Ok(Wakeup::Granted));
    assert_eq!(third.try_recv(), Err(TryRecvError::Empty));

    queue.on_event(&deleted("0000000002"));
    assert_eq!(third.try_recv(), Ok(Wakeup::Granted));
    assert_eq!(queue.siblings(), vec!["0000000003".to_string()]);
}

#[test]
fn test_minimum_is_numeric_not_lexicographic() {
    let queue = seeded(&["lock-10", "lock-9", "lock-0011"]);
    assert_eq!(queue.minimum(), Some("lock-9".to_string()));
}

#[test]
fn test_interrupt_all_cancels_every_waiter() {
    let queue = seeded(&["0000000001", "0000000002", "0000000003"]);
    let mut a = queue.enqueue("0000000002", LockOwner::from(2));
    let mut b = queue.enqueue("0000000003", LockOwner::from(3));

    assert_eq!(queue.interrupt_all(), 2);
    assert_eq!(a.try_recv(), Ok(Wakeup::Cancelled));
    assert_eq!(b.try_recv(), Ok(Wakeup::Cancelled));
    assert_eq!(queue.waiter_count(), 0);
    assert_eq!(queue.interrupt_all(), 0);
}

#[test]
fn test_withdraw_removes_only_parked_waiters() {
    let queue = seeded(&["0000000001", "0000000002"]);
    let _granted = queue.enqueue("0000000001", LockOwner::from(1));
    let _parked = queue.enqueue("0000000002", LockOwner::from(2));

    assert!(!queue.withdraw("0000000001"));
    assert!(queue.withdraw("0000000002"));
    assert!(!queue.withdraw("0000000002"));
}

#[test]
fn test_grant_at_deadline_beats_withdrawal() {
    let queue = seeded(&["0000000001", "0000000002"]);
    let mut rx = queue.enqueue("0000000002", LockOwner::from(2));

    // The holder releases after the waiter's deadline but before it withdraws.
    queue.on_event(&deleted("0000000001"));

    assert_eq!(queue.expire("0000000002", &mut rx), Expiry::Woken(Some(Wakeup::Granted)));
    assert_eq!(queue.waiter_count(), 0);
    assert_eq!(queue.siblings(), vec!["0000000002".to_string()]);
}

#[test]
fn test_expire_withdraws_parked_waiter() {
    let queue = seeded(&["0000000001", "0000000002"]);
    let mut rx = queue.enqueue("0000000002", LockOwner::from(2));

    assert_eq!(queue.expire("0000000002", &mut rx), Expiry::Withdrawn);
    assert_eq!(queue.waiter_count(), 0);
    assert_eq!(rx.try_recv(), Err(TryRecvError::Closed));

    // A later release finds nobody to grant.
    queue.on_event(&deleted("0000000001"));
    assert_eq!(queue.waiter_count(), 0);
}

#[test]
fn test_interrupt_at_deadline_is_reported_as_cancelled() {
    let queue = seeded(&["0000000001", "0000000002"]);
    let mut rx = queue.enqueue("0000000002", LockOwner::from(2));

    queue.interrupt_all();

    assert_eq!(queue.expire("0000000002", &mut rx), Expiry::Woken(Some(Wakeup::Cancelled)));
}

#[test]
fn test_data_changes_are_ignored() {
    let queue = seeded(&["0000000001"]);
    queue.on_event(&WatchEvent::new(
        "/l/0000000001",
        EventKind::DataChanged,
        Bytes::from_static(b"x"),
    ));
    assert_eq!(queue.siblings(), vec!["0000000001".to_string()]);
}

#[test]
fn test_owner_ids() {
    let a = LockOwner::new();
    let b = LockOwner::new();
    assert_ne!(a, b);
    assert_eq!(LockOwner::from(7).id(), 7);
    assert_eq!(LockOwner::from(7).to_string(), "owner-7");
}
