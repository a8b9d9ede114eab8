use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Result of asking the inventory for permission to fetch a stem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// The asset already exists locally or was fetched earlier in this run.
    Present,
    /// Another worker is fetching the same stem right now.
    InFlight,
    /// The caller now owns the stem until it calls `complete` or `release`.
    Acquired,
}

#[derive(Debug, Default)]
struct InventoryState {
    present: HashSet<String>,
    claimed: HashSet<String>,
}

/// Stems known to exist locally, shared by every worker of a run.
///
/// Stems are only ever added; inserting an existing stem is a no-op.
#[derive(Debug, Default)]
pub struct InventorySet {
    state: Mutex<InventoryState>,
}

impl InventorySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_stems<I, S>(stems: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set = Self::new();
        {
            let mut state = set.lock();
            state
                .present
                .extend(stems.into_iter().map(|s| s.as_ref().to_lowercase()));
        }
        set
    }

    fn lock(&self) -> MutexGuard<'_, InventoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn contains(&self, stem: &str) -> bool {
        self.lock().present.contains(&stem.to_lowercase())
    }

    /// Returns `true` if the stem was not present before.
    pub fn insert(&self, stem: &str) -> bool {
        self.lock().present.insert(stem.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.lock().present.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn claim(&self, stem: &str) -> Claim {
        let key = stem.to_lowercase();
        let mut state = self.lock();
        if state.present.contains(&key) {
            Claim::Present
        } else if !state.claimed.insert(key) {
            Claim::InFlight
        } else {
            Claim::Acquired
        }
    }

    /// Marks a claimed stem as present and drops the claim.
    pub fn complete(&self, stem: &str) {
        let key = stem.to_lowercase();
        let mut state = self.lock();
        state.claimed.remove(&key);
        state.present.insert(key);
    }

    /// Drops a claim without marking the stem present.
    pub fn release(&self, stem: &str) {
        self.lock().claimed.remove(&stem.to_lowercase());
    }
}
