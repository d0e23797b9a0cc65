use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Mcq,
    ShortAnswer,
    Problem,
}

impl ItemType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mcq => "mcq",
            Self::ShortAnswer => "short_answer",
            Self::Problem => "problem",
        }
    }
}

/// A generated question. Rows are write-once: never mutated after
/// acceptance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub concept_id: String,
    pub content: String,
    pub item_type: ItemType,
    /// Ordered choices for mcq; absent otherwise.
    pub options: Option<Vec<String>>,
    pub correct_answer: String,
    pub explanation: Option<String>,
    /// ELO-scale difficulty the item was generated at.
    pub difficulty: f64,
    pub estimated_p_correct: f64,
    pub prompt_used: Option<String>,
    pub model_used: Option<String>,
    /// Inline SVG for locally generated visual items.
    #[serde(default)]
    pub svg: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Store {
    pub fn insert_item(&self, item: &Item) -> Result<(), StoreError> {
        let key = keys::item_key(&item.id);
        let bytes = Self::serialize(item)?;
        match self
            .items
            .compare_and_swap(key.as_bytes(), None::<&[u8]>, Some(bytes.as_slice()))?
        {
            Ok(()) => Ok(()),
            Err(_) => Err(StoreError::Conflict {
                entity: "item".to_string(),
                key,
            }),
        }
    }

    pub fn get_item(&self, item_id: &str) -> Result<Item, StoreError> {
        match self.items.get(keys::item_key(item_id).as_bytes())? {
            Some(raw) => Self::deserialize(&raw),
            None => Err(StoreError::NotFound {
                entity: "item".to_string(),
                key: item_id.to_string(),
            }),
        }
    }
}
