use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Learner {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Store {
    /// Fetch the learner with this name, creating it on first sight.
    /// Names are unique case-insensitively.
    pub fn create_or_get_learner(&self, name: &str) -> Result<Learner, StoreError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(StoreError::Validation("learner name is empty".to_string()));
        }

        let index_key = keys::learner_name_index_key(trimmed);
        if let Some(id_raw) = self.learners_by_name.get(index_key.as_bytes())? {
            let learner_id = String::from_utf8_lossy(&id_raw).to_string();
            return self.get_learner(&learner_id);
        }

        let learner = Learner {
            id: uuid::Uuid::new_v4().to_string(),
            name: trimmed.to_string(),
            created_at: Utc::now(),
        };

        // Claim the name index first; a concurrent creator that loses the
        // race reads back the winner's row.
        match self.learners_by_name.compare_and_swap(
            index_key.as_bytes(),
            None::<&[u8]>,
            Some(learner.id.as_bytes()),
        )? {
            Ok(()) => {}
            Err(_) => {
                if let Some(id_raw) = self.learners_by_name.get(index_key.as_bytes())? {
                    let learner_id = String::from_utf8_lossy(&id_raw).to_string();
                    return self.get_learner(&learner_id);
                }
                return Err(StoreError::Conflict {
                    entity: "learner".to_string(),
                    key: trimmed.to_string(),
                });
            }
        }

        self.learners.insert(
            keys::learner_key(&learner.id).as_bytes(),
            Self::serialize(&learner)?,
        )?;
        Ok(learner)
    }

    pub fn get_learner(&self, learner_id: &str) -> Result<Learner, StoreError> {
        match self.learners.get(keys::learner_key(learner_id).as_bytes())? {
            Some(raw) => Self::deserialize(&raw),
            None => Err(StoreError::NotFound {
                entity: "learner".to_string(),
                key: learner_id.to_string(),
            }),
        }
    }

    pub fn list_learners(&self) -> Result<Vec<Learner>, StoreError> {
        let mut learners = Vec::new();
        for entry in self.learners.iter() {
            let (_, raw) = entry?;
            learners.push(Self::deserialize::<Learner>(&raw)?);
        }
        learners.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(learners)
    }
}
