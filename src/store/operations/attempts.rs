use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::Transactional;

use crate::engine::elo::SkillState;
use crate::store::keys;
use crate::store::operations::history::SkillSnapshot;
use crate::store::operations::items::{Item, ItemType};
use crate::store::{Store, StoreError};

/// One graded answer. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub id: String,
    pub item_id: String,
    pub learner_id: String,
    pub session_id: Option<String>,
    pub concept_id: String,
    pub answer_given: Option<String>,
    pub is_correct: bool,
    pub partial_score: Option<f64>,
    pub response_time_s: Option<f64>,
    pub rating_before: f64,
    pub rating_after: f64,
    pub timestamp: DateTime<Utc>,
}

/// Attempt joined with the item fields the analyzers need.
#[derive(Debug, Clone)]
pub struct EnrichedAttempt {
    pub attempt: Attempt,
    pub content: String,
    pub correct_answer: String,
    pub difficulty: f64,
    pub item_type: ItemType,
    pub options: Option<Vec<String>>,
}

impl Store {
    /// Commit one accepted attempt: the attempt row, both of its indexes,
    /// the skill upsert, the history snapshot, and (for correct answers)
    /// the lifetime dedup text — in a single transaction.
    ///
    /// The skill row must still match `expected_skill` inside the
    /// transaction; a concurrent update to the same (learner, concept)
    /// surfaces as a conflict and nothing is written.
    pub fn record_attempt(
        &self,
        attempt: &Attempt,
        expected_skill: Option<&SkillState>,
        new_skill: &SkillState,
        snapshot: &SkillSnapshot,
        normalized_item_text: &str,
    ) -> Result<(), StoreError> {
        let timestamp_ms = attempt.timestamp.timestamp_millis();

        let attempt_key = keys::attempt_key(&attempt.id);
        let attempt_bytes = Self::serialize(attempt)?;
        let time_index_key =
            keys::attempt_time_index_key(&attempt.learner_id, timestamp_ms, &attempt.id);
        let session_index_key = attempt
            .session_id
            .as_ref()
            .map(|sid| keys::attempt_session_index_key(sid, timestamp_ms, &attempt.id));
        let skill_key = keys::skill_key(&attempt.learner_id, &attempt.concept_id);
        let expected_bytes = expected_skill.map(Self::serialize).transpose()?;
        let new_skill_bytes = Self::serialize(new_skill)?;
        let history_key = keys::skill_history_key(
            &attempt.learner_id,
            &attempt.concept_id,
            timestamp_ms,
            &attempt.id,
        );
        let history_bytes = Self::serialize(snapshot)?;
        let correct_text_key = attempt
            .is_correct
            .then(|| keys::correct_text_key(&attempt.learner_id, normalized_item_text));

        (
            &self.attempts,
            &self.attempts_by_time,
            &self.attempts_by_session,
            &self.skills,
            &self.skill_history,
            &self.correct_texts,
        )
            .transaction(
                |(attempts, by_time, by_session, skills, history, correct_texts)| {
                    use sled::transaction::ConflictableTransactionError;

                    // Optimistic concurrency on the skill row.
                    let current = skills.get(skill_key.as_bytes())?;
                    let matches = match (&current, &expected_bytes) {
                        (None, None) => true,
                        (Some(cur), Some(exp)) => cur.as_ref() == exp.as_slice(),
                        _ => false,
                    };
                    if !matches {
                        return Err(ConflictableTransactionError::Abort(()));
                    }

                    attempts.insert(attempt_key.as_bytes(), attempt_bytes.as_slice())?;
                    by_time.insert(time_index_key.as_bytes(), attempt.id.as_bytes())?;
                    if let Some(session_key) = &session_index_key {
                        by_session.insert(session_key.as_bytes(), attempt.id.as_bytes())?;
                    }
                    skills.insert(skill_key.as_bytes(), new_skill_bytes.as_slice())?;
                    history.insert(history_key.as_bytes(), history_bytes.as_slice())?;
                    if let Some(text_key) = &correct_text_key {
                        correct_texts.insert(text_key.as_bytes(), &[] as &[u8])?;
                    }
                    Ok(())
                },
            )
            .map_err(|e: sled::transaction::TransactionError<()>| match e {
                sled::transaction::TransactionError::Abort(()) => StoreError::Conflict {
                    entity: "skill".to_string(),
                    key: skill_key.clone(),
                },
                sled::transaction::TransactionError::Storage(se) => StoreError::Sled(se),
            })?;
        Ok(())
    }

    pub fn get_attempt(&self, attempt_id: &str) -> Result<Attempt, StoreError> {
        match self.attempts.get(keys::attempt_key(attempt_id).as_bytes())? {
            Some(raw) => Self::deserialize(&raw),
            None => Err(StoreError::NotFound {
                entity: "attempt".to_string(),
                key: attempt_id.to_string(),
            }),
        }
    }

    /// Last `limit` attempts for a learner, newest first, joined with item
    /// fields.
    pub fn recent_enriched(
        &self,
        learner_id: &str,
        limit: usize,
    ) -> Result<Vec<EnrichedAttempt>, StoreError> {
        let prefix = keys::attempt_time_index_prefix(learner_id);
        let mut enriched = Vec::new();
        for entry in self.attempts_by_time.scan_prefix(prefix.as_bytes()) {
            if enriched.len() >= limit {
                break;
            }
            let (_, attempt_id_raw) = entry?;
            let attempt_id = String::from_utf8_lossy(&attempt_id_raw).to_string();
            enriched.push(self.enrich(self.get_attempt(&attempt_id)?)?);
        }
        Ok(enriched)
    }

    /// Attempts recorded in a session, oldest first.
    pub fn attempts_for_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<EnrichedAttempt>, StoreError> {
        let prefix = keys::attempt_session_index_prefix(session_id);
        let mut enriched = Vec::new();
        for entry in self.attempts_by_session.scan_prefix(prefix.as_bytes()) {
            let (_, attempt_id_raw) = entry?;
            let attempt_id = String::from_utf8_lossy(&attempt_id_raw).to_string();
            enriched.push(self.enrich(self.get_attempt(&attempt_id)?)?);
        }
        Ok(enriched)
    }

    /// Normalized texts of every item this learner has answered correctly.
    pub fn correct_texts(&self, learner_id: &str) -> Result<HashSet<String>, StoreError> {
        let prefix = keys::correct_text_prefix(learner_id);
        let mut texts = HashSet::new();
        for entry in self.correct_texts.scan_prefix(prefix.as_bytes()) {
            let (key_raw, _) = entry?;
            let key = String::from_utf8_lossy(&key_raw).to_string();
            if let Some(text) = key.strip_prefix(&prefix) {
                texts.insert(text.to_string());
            }
        }
        Ok(texts)
    }

    fn enrich(&self, attempt: Attempt) -> Result<EnrichedAttempt, StoreError> {
        let item: Item = self.get_item(&attempt.item_id)?;
        Ok(EnrichedAttempt {
            content: item.content,
            correct_answer: item.correct_answer,
            difficulty: item.difficulty,
            item_type: item.item_type,
            options: item.options,
            attempt,
        })
    }
}
