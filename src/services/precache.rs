//! Dual speculative pre-cache.
//!
//! While the learner works on the current item, two background tasks each
//! assume one outcome (correct / wrong), simulate the skill update, and
//! pre-generate the item that would follow. The foreground turn pops the
//! branch matching the real outcome and clears both; a concept mismatch or
//! an empty slot falls through to synchronous generation.
//!
//! Purely an optimization: the turn loop is correct with this disabled.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::store::operations::sessions::CurrentItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeBranch {
    Correct,
    Wrong,
}

impl OutcomeBranch {
    pub fn from_outcome(is_correct: bool) -> Self {
        if is_correct {
            Self::Correct
        } else {
            Self::Wrong
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Correct => "correct",
            Self::Wrong => "wrong",
        }
    }
}

/// A speculatively generated item, tagged with the focus concept its
/// simulation predicted.
#[derive(Debug, Clone)]
pub struct CachedBranch {
    pub concept_id: String,
    pub item: CurrentItem,
}

#[derive(Debug, Default)]
struct Slot {
    /// The item on screen when this slot's tasks were spawned. A newer
    /// turn re-registers the slot and late results are dropped.
    for_item_id: String,
    correct: Option<CachedBranch>,
    wrong: Option<CachedBranch>,
}

type SlotKey = (String, String);

#[derive(Debug, Default)]
pub struct Precache {
    slots: Mutex<HashMap<SlotKey, Slot>>,
}

impl Precache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pre-cache round for the item currently displayed.
    /// Returns false when a round for this item is already registered,
    /// making trigger calls idempotent.
    pub fn begin(&self, learner_id: &str, session_id: &str, item_id: &str) -> bool {
        let mut slots = self.slots.lock().expect("precache lock");
        let key = (learner_id.to_string(), session_id.to_string());
        match slots.get(&key) {
            Some(slot) if slot.for_item_id == item_id => false,
            _ => {
                slots.insert(
                    key,
                    Slot {
                        for_item_id: item_id.to_string(),
                        correct: None,
                        wrong: None,
                    },
                );
                true
            }
        }
    }

    /// Store a completed branch. Dropped silently when the slot has moved
    /// on to a newer item (the task was implicitly cancelled).
    pub fn fulfill(
        &self,
        learner_id: &str,
        session_id: &str,
        item_id: &str,
        branch: OutcomeBranch,
        cached: CachedBranch,
    ) {
        let mut slots = self.slots.lock().expect("precache lock");
        let key = (learner_id.to_string(), session_id.to_string());
        if let Some(slot) = slots.get_mut(&key) {
            if slot.for_item_id != item_id {
                tracing::debug!(branch = branch.as_str(), "Pre-cache result discarded: turn moved on");
                return;
            }
            match branch {
                OutcomeBranch::Correct => slot.correct = Some(cached),
                OutcomeBranch::Wrong => slot.wrong = Some(cached),
            }
        }
    }

    /// Pop the branch for the observed outcome and clear both entries.
    pub fn take(
        &self,
        learner_id: &str,
        session_id: &str,
        branch: OutcomeBranch,
    ) -> Option<CachedBranch> {
        let mut slots = self.slots.lock().expect("precache lock");
        let key = (learner_id.to_string(), session_id.to_string());
        let slot = slots.remove(&key)?;
        match branch {
            OutcomeBranch::Correct => slot.correct,
            OutcomeBranch::Wrong => slot.wrong,
        }
    }

    /// Drop any state for a session (called on session end).
    pub fn clear(&self, learner_id: &str, session_id: &str) {
        let mut slots = self.slots.lock().expect("precache lock");
        slots.remove(&(learner_id.to_string(), session_id.to_string()));
    }
}
