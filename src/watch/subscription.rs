use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::Mutex;

use super::Listener;

/// What a child subscription wants to hear about
///
/// Creations and deletions are always reported; the interest only decides
/// whether payloads come along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChildInterest {
    /// Report child payloads and follow each child's data changes
    pub child_data: bool,
}

impl ChildInterest {
    /// Structure only: creations and deletions, no payloads
    pub fn nodes() -> Self {
        Self { child_data: false }
    }

    /// Creations with payloads, deletions, and per-child data changes
    pub fn with_data() -> Self {
        Self { child_data: true }
    }
}

/// Outcome of comparing a fresh child list against the snapshot
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ChildDiff {
    pub(crate) created: Vec<String>,
    pub(crate) deleted: Vec<String>,
}

/// Per-path child subscription state
///
/// The snapshot maps each known child name to its "seen this round" mark.
/// Marks are only `true` while a round is being committed; between rounds
/// every entry is `false`.
pub(crate) struct ChildSubscription {
    pub(crate) path: String,
    pub(crate) listener: Arc<dyn Listener>,
    pub(crate) interest: ChildInterest,
    /// Held for the whole refresh, serializing diffs of one path
    pub(crate) snapshot: Mutex<HashMap<String, bool>>,
    /// Set once the record left the engine; in-flight refreshes drop their
    /// results
    removed: AtomicBool,
}

impl ChildSubscription {
    pub(crate) fn new(
        path: impl Into<String>,
        listener: Arc<dyn Listener>,
        interest: ChildInterest,
    ) -> Self {
        Self {
            path: path.into(),
            listener,
            interest,
            snapshot: Mutex::new(HashMap::new()),
            removed: AtomicBool::new(false),
        }
    }

    pub(crate) fn mark_removed(&self) {
        self.removed.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_removed(&self) -> bool {
        self.removed.load(Ordering::SeqCst)
    }
}

/// Names in `fresh` unknown to `snapshot`, in listing order.
pub(crate) fn unseen_children(
    snapshot: &HashMap<String, bool>,
    fresh: &[String],
) -> Vec<String> {
    fresh.iter().filter(|name| !snapshot.contains_key(*name)).cloned().collect()
}

/// Mark-and-sweep commit of one diff round.
///
/// `fresh` is the listing of this round and `admitted` the subset of unseen
/// names accepted as creations (children that vanished before their payload
/// could be read are left out). Admitted names are inserted, every listed
/// known name is marked seen, unmarked entries are swept as deletions and the
/// surviving marks are reset for the next round.
pub(crate) fn commit_round(
    snapshot: &mut HashMap<String, bool>,
    fresh: &[String],
    admitted: &[String],
) -> ChildDiff {
    for name in admitted {
        snapshot.insert(name.clone(), true);
    }
    for name in fresh {
        if let Some(seen) = snapshot.get_mut(name) {
            *seen = true;
        }
    }

    let mut deleted = Vec::new();
    snapshot.retain(|name, seen| {
        if *seen {
            *seen = false;
            true
        } else {
            deleted.push(name.clone());
            false
        }
    });
    deleted.sort();

    ChildDiff {
        created: admitted.to_vec(),
        deleted,
    }
}
