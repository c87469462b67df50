use std::collections::BTreeSet;
use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::LockOwner;
use crate::last_segment;
use crate::metrics::LOCK_WAITERS;
use crate::EventKind;
use crate::Listener;
use crate::SequenceName;
use crate::WatchEvent;

/// How a parked acquirer is woken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wakeup {
    /// Its node became the minimum of the directory
    Granted,
    /// The session expired while it waited
    Cancelled,
}

/// How a wait whose deadline passed was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// The entry was still parked and has been removed
    Withdrawn,
    /// A wakeup beat the withdrawal; `None` if its sender went away unsent
    Woken(Option<Wakeup>),
}

#[derive(Debug)]
struct Waiter {
    owner: LockOwner,
    wakeup: oneshot::Sender<Wakeup>,
}

#[derive(Debug, Default)]
struct QueueState {
    /// Believed children of the lock directory, in sequence order
    siblings: BTreeSet<SequenceName>,
    /// Parked acquirers keyed by their node name
    waiters: HashMap<String, Waiter>,
}

/// Sibling set and wait entries of one lock directory
///
/// The sibling set is fed by the directory's child subscription and is
/// independent of wait entry registration, so a node reported before its
/// acquirer parks is still granted once it is the minimum.
#[derive(Debug)]
pub struct LockQueue {
    dir: String,
    state: Mutex<QueueState>,
}

impl LockQueue {
    /// `seed` is the directory listing read at initialization.
    pub fn new(
        dir: impl Into<String>,
        seed: impl IntoIterator<Item = String>,
    ) -> Self {
        let siblings = seed.into_iter().map(SequenceName::from).collect();
        Self {
            dir: dir.into(),
            state: Mutex::new(QueueState {
                siblings,
                waiters: HashMap::new(),
            }),
        }
    }

    /// Park `owner` on node `name`.
    ///
    /// The returned receiver resolves with [`Wakeup::Granted`] as soon as
    /// `name` is the minimum sibling, which may already be the case.
    pub fn enqueue(
        &self,
        name: &str,
        owner: LockOwner,
    ) -> oneshot::Receiver<Wakeup> {
        let (wakeup, rx) = oneshot::channel();
        let mut state = self.state.lock();
        if state.waiters.insert(name.to_string(), Waiter { owner, wakeup }).is_none() {
            LOCK_WAITERS.inc();
        }
        trace!(dir = %self.dir, node = name, %owner, "Waiter parked");

        if state.siblings.iter().any(|s| s.name() == name) {
            self.release(&mut state);
        }
        rx
    }

    /// Remove the wait entry of `name`. `false` if it was already woken.
    pub fn withdraw(
        &self,
        name: &str,
    ) -> bool {
        let removed = self.state.lock().waiters.remove(name).is_some();
        if removed {
            LOCK_WAITERS.dec();
            trace!(dir = %self.dir, node = name, "Waiter withdrawn");
        }
        removed
    }

    /// Settle the wait of `name` after its deadline passed.
    ///
    /// Grants are sent under the queue lock, so a grant that removed the entry
    /// first is always visible on `rx` here.
    pub fn expire(
        &self,
        name: &str,
        rx: &mut oneshot::Receiver<Wakeup>,
    ) -> Expiry {
        if self.withdraw(name) {
            return Expiry::Withdrawn;
        }
        Expiry::Woken(rx.try_recv().ok())
    }

    /// Cancel every parked acquirer. Returns how many were woken.
    pub fn interrupt_all(&self) -> usize {
        let waiters: Vec<(String, Waiter)> = self.state.lock().waiters.drain().collect();
        let count = waiters.len();
        for (name, waiter) in waiters {
            LOCK_WAITERS.dec();
            if waiter.wakeup.send(Wakeup::Cancelled).is_err() {
                trace!(dir = %self.dir, node = %name, "Interrupted waiter already gone");
            }
        }
        count
    }

    pub fn insert_sibling(
        &self,
        name: &str,
    ) {
        let mut state = self.state.lock();
        state.siblings.insert(SequenceName::from(name));
        self.release(&mut state);
    }

    pub fn remove_sibling(
        &self,
        name: &str,
    ) {
        let mut state = self.state.lock();
        state.siblings.remove(&SequenceName::from(name));
        self.release(&mut state);
    }

    /// Grant the waiter of the minimum sibling, if it is parked.
    fn release(
        &self,
        state: &mut QueueState,
    ) {
        let Some(minimum) = state.siblings.first() else {
            return;
        };
        let Some(waiter) = state.waiters.remove(minimum.name()) else {
            return;
        };
        LOCK_WAITERS.dec();

        if waiter.wakeup.send(Wakeup::Granted).is_err() {
            warn!(
                dir = %self.dir,
                node = minimum.name(),
                owner = %waiter.owner,
                "Granted waiter is gone"
            );
        } else {
            debug!(dir = %self.dir, node = minimum.name(), owner = %waiter.owner, "Lock granted");
        }
    }

    pub fn siblings(&self) -> Vec<String> {
        self.state.lock().siblings.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn minimum(&self) -> Option<String> {
        self.state.lock().siblings.first().map(|s| s.name().to_string())
    }

    pub fn waiter_count(&self) -> usize {
        self.state.lock().waiters.len()
    }
}

impl Listener for LockQueue {
    fn on_event(
        &self,
        event: &WatchEvent,
    ) {
        let name = last_segment(&event.path);
        match event.kind {
            EventKind::Created => self.insert_sibling(name),
            EventKind::Deleted => self.remove_sibling(name),
            EventKind::DataChanged => {}
        }
    }
}
