pub mod keys;
pub mod operations;
pub mod trees;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::Db;
use thiserror::Error;

#[derive(Debug)]
pub struct Store {
    db: Db,
    pub learners: sled::Tree,
    pub topics: sled::Tree,
    pub concepts: sled::Tree,
    pub items: sled::Tree,
    pub attempts: sled::Tree,
    pub skills: sled::Tree,
    pub sessions: sled::Tree,
    pub skill_history: sled::Tree,
    // Secondary index trees
    pub learners_by_name: sled::Tree,
    pub concepts_by_topic: sled::Tree,
    pub attempts_by_time: sled::Tree,
    pub attempts_by_session: sled::Tree,
    pub correct_texts: sled::Tree,
    pub sessions_by_learner: sled::Tree,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found: entity={entity}, key={key}")]
    NotFound { entity: String, key: String },
    #[error("conflict: entity={entity}, key={key}")]
    Conflict { entity: String, key: String },
    #[error("CAS retry exhausted after {attempts} attempts: entity={entity}, key={key}")]
    CasRetryExhausted {
        entity: String,
        key: String,
        attempts: u32,
    },
    #[error("validation error: {0}")]
    Validation(String),
}

impl Store {
    pub fn open(sled_path: &str) -> Result<Self, StoreError> {
        let db = sled::open(sled_path)?;
        let learners = db.open_tree(trees::LEARNERS)?;
        let topics = db.open_tree(trees::TOPICS)?;
        let concepts = db.open_tree(trees::CONCEPTS)?;
        let items = db.open_tree(trees::ITEMS)?;
        let attempts = db.open_tree(trees::ATTEMPTS)?;
        let skills = db.open_tree(trees::SKILLS)?;
        let sessions = db.open_tree(trees::SESSIONS)?;
        let skill_history = db.open_tree(trees::SKILL_HISTORY)?;
        let learners_by_name = db.open_tree(trees::LEARNERS_BY_NAME)?;
        let concepts_by_topic = db.open_tree(trees::CONCEPTS_BY_TOPIC)?;
        let attempts_by_time = db.open_tree(trees::ATTEMPTS_BY_TIME)?;
        let attempts_by_session = db.open_tree(trees::ATTEMPTS_BY_SESSION)?;
        let correct_texts = db.open_tree(trees::CORRECT_TEXTS)?;
        let sessions_by_learner = db.open_tree(trees::SESSIONS_BY_LEARNER)?;

        Ok(Self {
            db,
            learners,
            topics,
            concepts,
            items,
            attempts,
            skills,
            sessions,
            skill_history,
            learners_by_name,
            concepts_by_topic,
            attempts_by_time,
            attempts_by_session,
            correct_texts,
            sessions_by_learner,
        })
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    pub fn raw_db(&self) -> &Db {
        &self.db
    }

    pub(crate) fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec(value)?)
    }

    pub(crate) fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
