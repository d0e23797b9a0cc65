//! Sled tree name constants.
//!
//! Tree names are part of the on-disk format; renaming one strands its data.
//! Index trees carry an `idx_` prefix.

pub const LEARNERS: &str = "learners";
pub const TOPICS: &str = "topics";
pub const CONCEPTS: &str = "concepts";
pub const ITEMS: &str = "items";
pub const ATTEMPTS: &str = "attempts";
pub const SKILLS: &str = "skills";
pub const SESSIONS: &str = "sessions";
pub const SKILL_HISTORY: &str = "skill_history";

// Secondary index trees
pub const LEARNERS_BY_NAME: &str = "idx_learners_by_name";
pub const CONCEPTS_BY_TOPIC: &str = "idx_concepts_by_topic";
pub const ATTEMPTS_BY_TIME: &str = "idx_attempts_by_time";
pub const ATTEMPTS_BY_SESSION: &str = "idx_attempts_by_session";
pub const CORRECT_TEXTS: &str = "idx_correct_texts";
pub const SESSIONS_BY_LEARNER: &str = "idx_sessions_by_learner";
