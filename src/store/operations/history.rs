use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

/// Immutable snapshot of a skill state, keyed to the attempt that
/// triggered it. Written by `record_attempt`; read for rating-over-time
/// views.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillSnapshot {
    pub learner_id: String,
    pub concept_id: String,
    pub attempt_id: String,
    pub rating: f64,
    pub uncertainty: f64,
    pub mastery: f64,
    pub timestamp: DateTime<Utc>,
}

impl Store {
    /// Snapshots for a (learner, concept) pair, oldest first.
    pub fn history_for_concept(
        &self,
        learner_id: &str,
        concept_id: &str,
    ) -> Result<Vec<SkillSnapshot>, StoreError> {
        let prefix = keys::skill_history_prefix(learner_id, concept_id);
        let mut snapshots = Vec::new();
        for entry in self.skill_history.scan_prefix(prefix.as_bytes()) {
            let (_, raw) = entry?;
            snapshots.push(Self::deserialize::<SkillSnapshot>(&raw)?);
        }
        Ok(snapshots)
    }
}
