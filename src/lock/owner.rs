use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

/// Ids handed out by [`LockOwner::new`] start here, above typical caller ids.
const ALLOCATED_BASE: u64 = 1 << 48;

static NEXT_OWNER: AtomicU64 = AtomicU64::new(ALLOCATED_BASE);

/// Identity that reentrant lock state is keyed by
///
/// Every task (or thread) acquiring a lock carries one. Acquiring again with
/// the same owner while holding the lock only bumps the hold count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockOwner(u64);

impl LockOwner {
    /// Allocate a process-unique owner.
    pub fn new() -> Self {
        Self(NEXT_OWNER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

impl Default for LockOwner {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u64> for LockOwner {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for LockOwner {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "owner-{}", self.0)
    }
}
