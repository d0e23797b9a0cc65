//! Three-layer question deduplication.
//!
//! 1. Session: every question shown in the current session, including the
//!    one currently on screen and unanswered.
//! 2. Lifetime-correct: every question this learner has ever answered
//!    correctly.
//! 3. Prompt hints: the union of both, forwarded to the LLM as avoid-list.
//!
//! Layers 1 and 2 are hard post-generation rejections; layer 3 is advisory.

use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupHit {
    Session,
    Lifetime,
}

#[derive(Debug, Default)]
pub struct DedupRegistry {
    session: HashSet<String>,
    lifetime: HashSet<String>,
}

/// Lowercase and collapse whitespace so formatting differences don't defeat
/// the exclusion sets.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl DedupRegistry {
    pub fn new<I, J>(session_texts: I, lifetime_texts: J) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        J: IntoIterator,
        J::Item: AsRef<str>,
    {
        Self {
            session: session_texts
                .into_iter()
                .map(|t| normalize_text(t.as_ref()))
                .collect(),
            lifetime: lifetime_texts
                .into_iter()
                .map(|t| normalize_text(t.as_ref()))
                .collect(),
        }
    }

    /// Register the currently displayed, not yet answered question.
    pub fn add_current(&mut self, text: &str) {
        self.session.insert(normalize_text(text));
    }

    /// Hard dedup check for a freshly generated candidate.
    pub fn check(&self, text: &str) -> Option<DedupHit> {
        let normalized = normalize_text(text);
        if self.session.contains(&normalized) {
            Some(DedupHit::Session)
        } else if self.lifetime.contains(&normalized) {
            Some(DedupHit::Lifetime)
        } else {
            None
        }
    }

    /// Advisory avoid-list for the LLM prompt, capped to keep prompts small.
    pub fn prompt_hints(&self, cap: usize) -> Vec<String> {
        let mut hints: Vec<String> = self.session.union(&self.lifetime).cloned().collect();
        hints.sort();
        hints.truncate(cap);
        hints
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_collapses_case_and_whitespace() {
        assert_eq!(
            normalize_text("  What  is\t5 + 3?\n"),
            "what is 5 + 3?"
        );
    }

    #[test]
    fn session_hit_beats_lifetime() {
        let registry = DedupRegistry::new(["What is 5 + 3?"], ["what is 5 + 3?"]);
        assert_eq!(registry.check("WHAT IS  5 + 3?"), Some(DedupHit::Session));
    }

    #[test]
    fn lifetime_hit() {
        let registry = DedupRegistry::new(Vec::<String>::new(), ["What is 9 - 4?"]);
        assert_eq!(registry.check("what is 9 - 4?"), Some(DedupHit::Lifetime));
        assert_eq!(registry.check("what is 9 - 3?"), None);
    }

    #[test]
    fn current_unanswered_question_is_excluded() {
        let mut registry = DedupRegistry::new(Vec::<String>::new(), Vec::<String>::new());
        registry.add_current("What is 2 + 2?");
        assert_eq!(registry.check("What is 2 + 2?"), Some(DedupHit::Session));
    }

    #[test]
    fn prompt_hints_union_and_cap() {
        let registry = DedupRegistry::new(["q1", "q2"], ["q2", "q3"]);
        let hints = registry.prompt_hints(10);
        assert_eq!(hints, vec!["q1", "q2", "q3"]);
        assert_eq!(registry.prompt_hints(2).len(), 2);
    }
}
