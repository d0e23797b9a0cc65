use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// A curriculum node: one focused, testable learning objective.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Concept {
    pub id: String,
    pub topic_id: String,
    pub name: String,
    pub description: String,
    pub order_index: u32,
    /// Concept ids within the same topic; the graph is acyclic.
    #[serde(default)]
    pub prerequisites: Vec<String>,
    pub mastery_threshold: f64,
    /// Needs imagery the system cannot generate; skipped by the policy.
    #[serde(default)]
    pub visual_required: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewConcept {
    pub name: String,
    pub description: String,
    pub order_index: u32,
    pub prerequisites: Vec<String>,
    pub mastery_threshold: Option<f64>,
    pub visual_required: bool,
}

impl Store {
    pub fn create_topic(&self, name: &str, description: &str) -> Result<Topic, StoreError> {
        if name.trim().is_empty() {
            return Err(StoreError::Validation("topic name is empty".to_string()));
        }
        let topic = Topic {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            description: description.trim().to_string(),
            created_at: Utc::now(),
        };
        self.topics.insert(
            keys::topic_key(&topic.id).as_bytes(),
            Self::serialize(&topic)?,
        )?;
        Ok(topic)
    }

    pub fn get_topic(&self, topic_id: &str) -> Result<Topic, StoreError> {
        match self.topics.get(keys::topic_key(topic_id).as_bytes())? {
            Some(raw) => Self::deserialize(&raw),
            None => Err(StoreError::NotFound {
                entity: "topic".to_string(),
                key: topic_id.to_string(),
            }),
        }
    }

    pub fn list_topics(&self) -> Result<Vec<Topic>, StoreError> {
        let mut topics = Vec::new();
        for entry in self.topics.iter() {
            let (_, raw) = entry?;
            topics.push(Self::deserialize::<Topic>(&raw)?);
        }
        topics.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(topics)
    }

    pub fn create_concept(
        &self,
        topic_id: &str,
        new_concept: &NewConcept,
        default_mastery_threshold: f64,
    ) -> Result<Concept, StoreError> {
        if new_concept.name.trim().is_empty() {
            return Err(StoreError::Validation("concept name is empty".to_string()));
        }
        self.get_topic(topic_id)?;

        let concept = Concept {
            id: uuid::Uuid::new_v4().to_string(),
            topic_id: topic_id.to_string(),
            name: new_concept.name.trim().to_string(),
            description: new_concept.description.trim().to_string(),
            order_index: new_concept.order_index,
            prerequisites: new_concept.prerequisites.clone(),
            mastery_threshold: new_concept
                .mastery_threshold
                .unwrap_or(default_mastery_threshold),
            visual_required: new_concept.visual_required,
            created_at: Utc::now(),
        };

        self.concepts.insert(
            keys::concept_key(&concept.id).as_bytes(),
            Self::serialize(&concept)?,
        )?;
        self.concepts_by_topic.insert(
            keys::concept_topic_index_key(topic_id, concept.order_index, &concept.id).as_bytes(),
            concept.id.as_bytes(),
        )?;
        Ok(concept)
    }

    pub fn get_concept(&self, concept_id: &str) -> Result<Concept, StoreError> {
        match self.concepts.get(keys::concept_key(concept_id).as_bytes())? {
            Some(raw) => Self::deserialize(&raw),
            None => Err(StoreError::NotFound {
                entity: "concept".to_string(),
                key: concept_id.to_string(),
            }),
        }
    }

    /// Concepts of a topic, ordered by `order_index`.
    pub fn list_concepts_by_topic(&self, topic_id: &str) -> Result<Vec<Concept>, StoreError> {
        let prefix = keys::concept_topic_index_prefix(topic_id);
        let mut concepts = Vec::new();
        for entry in self.concepts_by_topic.scan_prefix(prefix.as_bytes()) {
            let (_, concept_id_raw) = entry?;
            let concept_id = String::from_utf8_lossy(&concept_id_raw).to_string();
            concepts.push(self.get_concept(&concept_id)?);
        }
        Ok(concepts)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use crate::store::operations::curriculum::NewConcept;
    use crate::store::Store;

    fn new_concept(name: &str, order: u32, prereqs: Vec<String>) -> NewConcept {
        NewConcept {
            name: name.to_string(),
            description: format!("{name} description"),
            order_index: order,
            prerequisites: prereqs,
            mastery_threshold: None,
            visual_required: false,
        }
    }

    #[test]
    fn concepts_come_back_in_order() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();

        let topic = store.create_topic("Math", "first grade").unwrap();
        store
            .create_concept(&topic.id, &new_concept("counting", 2, vec![]), 0.75)
            .unwrap();
        store
            .create_concept(&topic.id, &new_concept("addition", 0, vec![]), 0.75)
            .unwrap();
        store
            .create_concept(&topic.id, &new_concept("subtraction", 1, vec![]), 0.75)
            .unwrap();

        let names: Vec<String> = store
            .list_concepts_by_topic(&topic.id)
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["addition", "subtraction", "counting"]);
    }

    #[test]
    fn default_mastery_threshold_applied() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();

        let topic = store.create_topic("Math", "").unwrap();
        let concept = store
            .create_concept(&topic.id, &new_concept("counting", 0, vec![]), 0.75)
            .unwrap();
        assert_eq!(concept.mastery_threshold, 0.75);
    }

    #[test]
    fn concept_requires_existing_topic() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();
        assert!(store
            .create_concept("missing", &new_concept("counting", 0, vec![]), 0.75)
            .is_err());
    }
}
