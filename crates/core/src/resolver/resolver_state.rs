//! Resolution state machine.
//!
//! ```text
//! PENDING -> CACHE_CHECK -> DONE                      (full hit)
//!                        -> PROVIDER[0] -> MERGE[0] -> PROVIDER[1] -> ...
//!                                                   -> DONE          (complete)
//!                                                   -> DONE_PARTIAL  (chain exhausted)
//! ```
//!
//! A provider that is skipped goes straight from `PROVIDER[i]` to the next
//! provider. Every transition is recorded so tests can assert the path.

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "index", rename_all = "snake_case")]
pub enum ResolutionState {
    Pending,
    CacheCheck,
    /// Consulting the i-th provider of the consultation order.
    Provider(usize),
    /// Folding the i-th provider's staged results into the record.
    Merge(usize),
    Done,
    DonePartial,
}

impl ResolutionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::DonePartial)
    }

    /// Whether `next` is a legal successor of this state.
    pub fn can_transition_to(&self, next: ResolutionState) -> bool {
        use ResolutionState::*;
        match (*self, next) {
            (Pending, CacheCheck) => true,
            // A joiner that gives up waiting ends without its own cache check.
            (Pending, DonePartial) => true,
            (CacheCheck, Done | DonePartial | Provider(0)) => true,
            (Provider(i), Merge(j)) => i == j,
            (Provider(i), Provider(j)) => j == i + 1,
            (Merge(i), Provider(j)) => j == i + 1,
            (Provider(_) | Merge(_), Done | DonePartial) => true,
            _ => false,
        }
    }
}

/// Recorded path through the state machine.
#[derive(Debug)]
pub(crate) struct StateTrace {
    states: Vec<ResolutionState>,
}

impl StateTrace {
    pub fn start() -> Self {
        Self {
            states: vec![ResolutionState::Pending],
        }
    }

    pub fn current(&self) -> ResolutionState {
        self.states
            .last()
            .copied()
            .unwrap_or(ResolutionState::Pending)
    }

    pub fn enter(&mut self, next: ResolutionState) {
        debug_assert!(
            self.current().can_transition_to(next),
            "illegal resolver transition {:?} -> {:?}",
            self.current(),
            next
        );
        self.states.push(next);
    }

    pub fn into_states(self) -> Vec<ResolutionState> {
        self.states
    }
}
