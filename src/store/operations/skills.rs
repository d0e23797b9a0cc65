use std::collections::HashMap;

use crate::config::AdaptiveConfig;
use crate::constants::MAX_CAS_RETRIES;
use crate::engine::elo::SkillState;
use crate::store::keys;
use crate::store::{Store, StoreError};

impl Store {
    /// Skill state for a (learner, concept) pair. An absent row is
    /// semantically equal to the initial state and is returned as such.
    pub fn get_skill(
        &self,
        learner_id: &str,
        concept_id: &str,
        config: &AdaptiveConfig,
    ) -> Result<SkillState, StoreError> {
        let key = keys::skill_key(learner_id, concept_id);
        match self.skills.get(key.as_bytes())? {
            Some(raw) => Self::deserialize(&raw),
            None => Ok(SkillState::initial(config)),
        }
    }

    /// The raw skill row, `None` when the learner has never practiced the
    /// concept. Callers doing optimistic updates need the distinction.
    pub fn get_skill_row(
        &self,
        learner_id: &str,
        concept_id: &str,
    ) -> Result<Option<SkillState>, StoreError> {
        let key = keys::skill_key(learner_id, concept_id);
        match self.skills.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// All persisted skill states for a learner, keyed by concept id.
    pub fn skills_for_learner(
        &self,
        learner_id: &str,
    ) -> Result<HashMap<String, SkillState>, StoreError> {
        let prefix = keys::skill_prefix(learner_id);
        let mut skills = HashMap::new();
        for entry in self.skills.scan_prefix(prefix.as_bytes()) {
            let (key_raw, raw) = entry?;
            let key = String::from_utf8_lossy(&key_raw).to_string();
            let Some(concept_id) = key.strip_prefix(&prefix) else {
                continue;
            };
            skills.insert(concept_id.to_string(), Self::deserialize::<SkillState>(&raw)?);
        }
        Ok(skills)
    }

    /// CAS upsert guarding against concurrent updates to the same row.
    /// `expected` is the state that was read before computing the update;
    /// pass `None` when no row existed.
    pub fn upsert_skill(
        &self,
        learner_id: &str,
        concept_id: &str,
        expected: Option<&SkillState>,
        next: &SkillState,
    ) -> Result<(), StoreError> {
        let key = keys::skill_key(learner_id, concept_id);
        let expected_bytes = expected.map(Self::serialize).transpose()?;
        let next_bytes = Self::serialize(next)?;

        for _ in 0..MAX_CAS_RETRIES {
            let current = self.skills.get(key.as_bytes())?;
            let matches = match (&current, &expected_bytes) {
                (None, None) => true,
                (Some(cur), Some(exp)) => cur.as_ref() == exp.as_slice(),
                _ => false,
            };
            if !matches {
                return Err(StoreError::Conflict {
                    entity: "skill".to_string(),
                    key,
                });
            }
            match self.skills.compare_and_swap(
                key.as_bytes(),
                current,
                Some(next_bytes.as_slice()),
            )? {
                Ok(()) => return Ok(()),
                Err(_) => continue,
            }
        }
        Err(StoreError::CasRetryExhausted {
            entity: "skill".to_string(),
            key,
            attempts: MAX_CAS_RETRIES,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tempfile::tempdir;

    use crate::config::AdaptiveConfig;
    use crate::engine::elo::SkillState;
    use crate::store::Store;

    #[test]
    fn absent_row_is_initial_state() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();
        let cfg = AdaptiveConfig::default();

        let skill = store.get_skill("l1", "c1", &cfg).unwrap();
        assert_eq!(skill.rating, 800.0);
        assert_eq!(skill.uncertainty, 350.0);
        assert_eq!(skill.total_attempts, 0);
    }

    #[test]
    fn upsert_round_trip() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();
        let cfg = AdaptiveConfig::default();

        let next = SkillState {
            rating: 845.5,
            uncertainty: 315.0,
            mastery: 0.4,
            total_attempts: 1,
            correct_attempts: 1,
            last_updated: Utc::now(),
        };
        store.upsert_skill("l1", "c1", None, &next).unwrap();

        let got = store.get_skill("l1", "c1", &cfg).unwrap();
        assert_eq!(got.rating, 845.5);
        assert_eq!(got.total_attempts, 1);
    }

    #[test]
    fn stale_expectation_conflicts() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();
        let cfg = AdaptiveConfig::default();

        let first = SkillState {
            rating: 850.0,
            ..SkillState::initial(&cfg)
        };
        store.upsert_skill("l1", "c1", None, &first).unwrap();

        // A writer that still believes there is no row must fail.
        let second = SkillState {
            rating: 900.0,
            ..SkillState::initial(&cfg)
        };
        assert!(store.upsert_skill("l1", "c1", None, &second).is_err());

        // A writer with the current state succeeds.
        let current = store.get_skill("l1", "c1", &cfg).unwrap();
        store
            .upsert_skill("l1", "c1", Some(&current), &second)
            .unwrap();
        assert_eq!(store.get_skill("l1", "c1", &cfg).unwrap().rating, 900.0);
    }

    #[test]
    fn skills_for_learner_scopes_by_prefix() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();
        let cfg = AdaptiveConfig::default();

        store
            .upsert_skill("l1", "c1", None, &SkillState::initial(&cfg))
            .unwrap();
        store
            .upsert_skill("l1", "c2", None, &SkillState::initial(&cfg))
            .unwrap();
        store
            .upsert_skill("l2", "c1", None, &SkillState::initial(&cfg))
            .unwrap();

        let skills = store.skills_for_learner("l1").unwrap();
        assert_eq!(skills.len(), 2);
        assert!(skills.contains_key("c1"));
        assert!(skills.contains_key("c2"));
    }
}
