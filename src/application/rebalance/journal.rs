//! Decision journal: exactly-once application per decision key.

use std::collections::HashSet;

use parking_lot::Mutex;

use crate::domain::DecisionKey;

#[derive(Debug, Default)]
struct JournalState {
    in_flight: HashSet<DecisionKey>,
    completed: HashSet<DecisionKey>,
}

/// Tracks decisions that are executing or already applied.
///
/// A key can be begun only if it is neither in flight nor completed. An
/// abandoned key (failed execution, cancelled decision) may be begun again
/// on a later tick.
#[derive(Debug, Default)]
pub struct DecisionJournal {
    state: Mutex<JournalState>,
}

impl DecisionJournal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`. Returns false if it is in flight or already applied.
    pub fn begin(&self, key: DecisionKey) -> bool {
        let mut state = self.state.lock();
        if state.completed.contains(&key) {
            return false;
        }
        state.in_flight.insert(key)
    }

    /// Mark `key` applied; it can never be begun again.
    pub fn complete(&self, key: DecisionKey) {
        let mut state = self.state.lock();
        state.in_flight.remove(&key);
        state.completed.insert(key);
    }

    /// Release `key` without applying it.
    pub fn abandon(&self, key: DecisionKey) {
        self.state.lock().in_flight.remove(&key);
    }

    /// Drop completed keys `keep` rejects. In-flight keys are untouched.
    /// Returns how many were dropped.
    pub fn retain_completed(&self, keep: impl Fn(&DecisionKey) -> bool) -> usize {
        let mut state = self.state.lock();
        let before = state.completed.len();
        state.completed.retain(|key| keep(key));
        before - state.completed.len()
    }

    #[must_use]
    pub fn completed(&self) -> usize {
        self.state.lock().completed.len()
    }

    #[must_use]
    pub fn is_completed(&self, key: &DecisionKey) -> bool {
        self.state.lock().completed.contains(key)
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight.len()
    }
}
