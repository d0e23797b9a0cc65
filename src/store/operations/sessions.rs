use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::Transactional;

use crate::constants::MAX_CAS_RETRIES;
use crate::store::keys;
use crate::store::operations::items::ItemType;
use crate::store::{Store, StoreError};

/// The item currently in front of the learner, denormalized into the
/// session so grading needs no extra lookups. References stay id-based;
/// the item row itself is immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentItem {
    pub item_id: String,
    pub concept_id: String,
    pub concept_name: String,
    pub content: String,
    pub item_type: ItemType,
    pub options: Option<Vec<String>>,
    pub correct_answer: String,
    pub explanation: Option<String>,
    pub difficulty: f64,
    /// 1-10 display badge derived from the ELO difficulty.
    pub difficulty_score: u8,
    pub p_correct: f64,
    #[serde(default)]
    pub svg: Option<String>,
}

/// Grading outcome of the most recent submit, kept for the result view
/// and for deciding which pre-cache branch applies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastResult {
    pub item_id: String,
    pub is_correct: bool,
    pub is_close: bool,
    pub partial_score: f64,
    pub rating_before: f64,
    pub rating_after: f64,
    pub mastery: f64,
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub learner_id: String,
    pub topic_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub total_questions: u32,
    pub total_correct: u32,
    #[serde(default)]
    pub current_item: Option<CurrentItem>,
    #[serde(default)]
    pub last_result: Option<LastResult>,
}

impl Session {
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }
}

impl Store {
    pub fn create_session(
        &self,
        learner_id: &str,
        topic_id: Option<&str>,
    ) -> Result<Session, StoreError> {
        let session = Session {
            id: uuid::Uuid::new_v4().to_string(),
            learner_id: learner_id.to_string(),
            topic_id: topic_id.map(|t| t.to_string()),
            started_at: Utc::now(),
            updated_at: Utc::now(),
            ended_at: None,
            total_questions: 0,
            total_correct: 0,
            current_item: None,
            last_result: None,
        };

        let key = keys::session_key(&session.id);
        let index_key = keys::session_learner_index_key(learner_id, &session.id);
        let bytes = Self::serialize(&session)?;

        (&self.sessions, &self.sessions_by_learner)
            .transaction(|(sessions, index)| {
                sessions.insert(key.as_bytes(), bytes.as_slice())?;
                index.insert(index_key.as_bytes(), &[] as &[u8])?;
                Ok(())
            })
            .map_err(|e: sled::transaction::TransactionError<()>| match e {
                sled::transaction::TransactionError::Abort(()) => StoreError::Conflict {
                    entity: "session".to_string(),
                    key: session.id.clone(),
                },
                sled::transaction::TransactionError::Storage(se) => StoreError::Sled(se),
            })?;
        Ok(session)
    }

    pub fn get_session(&self, session_id: &str) -> Result<Session, StoreError> {
        match self.sessions.get(keys::session_key(session_id).as_bytes())? {
            Some(raw) => Self::deserialize(&raw),
            None => Err(StoreError::NotFound {
                entity: "session".to_string(),
                key: session_id.to_string(),
            }),
        }
    }

    /// CAS read-modify-write; retried against concurrent writers.
    pub fn modify_session(
        &self,
        session_id: &str,
        mutate: impl Fn(&mut Session),
    ) -> Result<Session, StoreError> {
        let key = keys::session_key(session_id);
        for _ in 0..MAX_CAS_RETRIES {
            let Some(old_raw) = self.sessions.get(key.as_bytes())? else {
                return Err(StoreError::NotFound {
                    entity: "session".to_string(),
                    key: session_id.to_string(),
                });
            };
            let mut session: Session = Self::deserialize(&old_raw)?;
            mutate(&mut session);
            session.updated_at = Utc::now();
            let new_bytes = Self::serialize(&session)?;
            match self.sessions.compare_and_swap(
                key.as_bytes(),
                Some(old_raw),
                Some(new_bytes.as_slice()),
            )? {
                Ok(()) => return Ok(session),
                Err(_) => continue,
            }
        }
        Err(StoreError::CasRetryExhausted {
            entity: "session".to_string(),
            key,
            attempts: MAX_CAS_RETRIES,
        })
    }

    pub fn set_session_current(
        &self,
        session_id: &str,
        current: Option<CurrentItem>,
    ) -> Result<Session, StoreError> {
        self.modify_session(session_id, |session| {
            session.current_item = current.clone();
        })
    }

    pub fn set_session_last_result(
        &self,
        session_id: &str,
        last_result: LastResult,
    ) -> Result<Session, StoreError> {
        self.modify_session(session_id, |session| {
            session.last_result = Some(last_result.clone());
        })
    }

    /// Compute totals from the session's attempts and mark it ended.
    pub fn end_session(&self, session_id: &str) -> Result<Session, StoreError> {
        let attempts = self.attempts_for_session(session_id)?;
        let total = attempts.len() as u32;
        let correct = attempts.iter().filter(|a| a.attempt.is_correct).count() as u32;

        self.modify_session(session_id, |session| {
            if session.ended_at.is_none() {
                session.ended_at = Some(Utc::now());
            }
            session.total_questions = total;
            session.total_correct = correct;
            session.current_item = None;
        })
    }

    pub fn active_sessions_for_learner(
        &self,
        learner_id: &str,
    ) -> Result<Vec<Session>, StoreError> {
        let prefix = keys::session_learner_index_prefix(learner_id);
        let mut sessions = Vec::new();
        for entry in self.sessions_by_learner.scan_prefix(prefix.as_bytes()) {
            let (key_raw, _) = entry?;
            let key = String::from_utf8_lossy(&key_raw).to_string();
            if let Some(session_id) = key.rsplit(':').next() {
                let session = self.get_session(session_id)?;
                if session.is_active() {
                    sessions.push(session);
                }
            }
        }
        Ok(sessions)
    }

    /// End active sessions idle longer than `max_idle_secs`. Returns the
    /// number of sessions closed.
    pub fn end_idle_sessions(&self, max_idle_secs: i64) -> Result<u32, StoreError> {
        let cutoff = Utc::now() - chrono::Duration::seconds(max_idle_secs);
        let mut closed = 0u32;
        for entry in self.sessions.iter() {
            let (_, raw) = entry?;
            let session: Session = Self::deserialize(&raw)?;
            if session.is_active() && session.updated_at < cutoff {
                self.end_session(&session.id)?;
                closed += 1;
            }
        }
        Ok(closed)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use crate::store::Store;

    use super::*;

    fn current_item(item_id: &str) -> CurrentItem {
        CurrentItem {
            item_id: item_id.to_string(),
            concept_id: "c1".to_string(),
            concept_name: "addition".to_string(),
            content: "What is 5 + 3?".to_string(),
            item_type: ItemType::ShortAnswer,
            options: None,
            correct_answer: "8".to_string(),
            explanation: None,
            difficulty: 559.0,
            difficulty_score: 3,
            p_correct: 0.8,
            svg: None,
        }
    }

    #[test]
    fn create_and_fetch() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();

        let session = store.create_session("l1", Some("t1")).unwrap();
        let got = store.get_session(&session.id).unwrap();
        assert!(got.is_active());
        assert_eq!(got.topic_id.as_deref(), Some("t1"));
    }

    #[test]
    fn current_item_round_trip() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();

        let session = store.create_session("l1", None).unwrap();
        store
            .set_session_current(&session.id, Some(current_item("i1")))
            .unwrap();

        let got = store.get_session(&session.id).unwrap();
        assert_eq!(got.current_item.unwrap().item_id, "i1");
    }

    #[test]
    fn end_clears_current_and_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();

        let session = store.create_session("l1", None).unwrap();
        store
            .set_session_current(&session.id, Some(current_item("i1")))
            .unwrap();

        let ended = store.end_session(&session.id).unwrap();
        assert!(!ended.is_active());
        assert!(ended.current_item.is_none());
        let first_ended_at = ended.ended_at;

        let again = store.end_session(&session.id).unwrap();
        assert_eq!(again.ended_at, first_ended_at);
    }

    #[test]
    fn active_sessions_listing() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();

        let s1 = store.create_session("l1", None).unwrap();
        let _s2 = store.create_session("l1", None).unwrap();
        store.end_session(&s1.id).unwrap();

        let active = store.active_sessions_for_learner("l1").unwrap();
        assert_eq!(active.len(), 1);
    }

    #[test]
    fn idle_sessions_get_closed() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();

        store.create_session("l1", None).unwrap();
        // Nothing is older than an hour yet.
        assert_eq!(store.end_idle_sessions(3600).unwrap(), 0);
        // Everything is older than "idle for 0 seconds".
        assert_eq!(store.end_idle_sessions(-1).unwrap(), 1);
    }
}
