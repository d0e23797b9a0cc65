//! Focus-concept selection.
//!
//! Priority order, first match wins:
//!   1. stay on the current concept while accuracy sits in the 60-90% band
//!   2. fall back to an unmastered prerequisite when struggling (<60%)
//!   3. advance past a mastered or too-easy concept
//!   4. weakest recently-practiced unmastered concept
//!   5. next untouched concept in curriculum order
//!   6. lowest mastery overall
//!
//! Rules 4-6 apply a variety constraint: the concept practiced last is
//! dropped from the pool whenever another candidate qualifies, and ties are
//! broken by an additive score of need (1 - mastery), a virgin bonus for
//! untouched concepts, and a recency penalty.

use std::collections::HashMap;

use crate::config::AdaptiveConfig;
use crate::engine::analysis::RecentAnalysis;
use crate::engine::elo::{self, SkillState};
use crate::store::operations::curriculum::Concept;

/// Attempts required on every prerequisite before a concept opens up.
const SOFT_PREREQ_ATTEMPTS: u32 = 2;

pub struct FocusInput<'a> {
    /// Concepts of the active topic, ordered by `order_index`.
    pub concepts: &'a [Concept],
    pub skills: &'a HashMap<String, SkillState>,
    pub analysis: &'a RecentAnalysis,
    /// Concept of the item currently (or most recently) displayed.
    pub current_concept_id: Option<&'a str>,
    /// Concept of the last recorded attempt, for the variety constraint.
    pub last_concept_id: Option<&'a str>,
}

pub fn select_focus(input: &FocusInput<'_>, config: &AdaptiveConfig) -> Option<String> {
    let selectable: Vec<&Concept> = input
        .concepts
        .iter()
        .filter(|c| !c.visual_required)
        .collect();
    if selectable.is_empty() {
        return None;
    }

    let by_id: HashMap<&str, &Concept> = selectable.iter().map(|c| (c.id.as_str(), *c)).collect();

    if let Some(current_id) = input.current_concept_id {
        if let Some(current) = by_id.get(current_id) {
            if let Some(focus) = check_current(input, current, &by_id, &selectable) {
                return Some(focus);
            }
        }
    }

    // Rule 4: weakest recently-practiced, unmastered, available concept.
    let mut practiced: Vec<(&Concept, f64)> = selectable
        .iter()
        .filter_map(|c| {
            let accuracy = input.analysis.concept_accuracy(&c.id)?;
            if is_mastered(input, c) || !is_available(input, c) {
                return None;
            }
            Some((*c, accuracy))
        })
        .collect();
    apply_variety(&mut practiced, input.last_concept_id);
    if let Some(weakest) = practiced
        .iter()
        .min_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    variety_score(input, b.0, config)
                        .partial_cmp(&variety_score(input, a.0, config))
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
        })
        .map(|(c, _)| c.id.clone())
    {
        return Some(weakest);
    }

    // Rule 5: next untouched concept in curriculum order.
    if let Some(untouched) = selectable
        .iter()
        .find(|c| attempts_of(input, &c.id) == 0 && is_available(input, c))
    {
        return Some(untouched.id.clone());
    }

    // Rule 6: lowest mastery over the whole topic, scored for variety.
    let mut pool: Vec<(&Concept, f64)> = selectable
        .iter()
        .map(|c| (*c, mastery_of(input, &c.id)))
        .collect();
    apply_variety(&mut pool, input.last_concept_id);
    pool.iter()
        .max_by(|a, b| {
            variety_score(input, a.0, config)
                .partial_cmp(&variety_score(input, b.0, config))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(c, _)| c.id.clone())
}

/// Rules 1-3, anchored on the current concept.
fn check_current(
    input: &FocusInput<'_>,
    current: &Concept,
    by_id: &HashMap<&str, &Concept>,
    selectable: &[&Concept],
) -> Option<String> {
    let stats = input.analysis.per_concept.get(&current.id)?;
    let accuracy = stats.accuracy;
    let mastered = is_mastered(input, current);

    // Rule 1: sweet spot, keep practicing.
    if (0.60..=0.90).contains(&accuracy) && !mastered {
        return Some(current.id.clone());
    }

    // Rule 2: struggling, back off to the first unmastered prerequisite.
    if accuracy < 0.60 {
        let mut prereqs = current.prerequisites.clone();
        prereqs.sort();
        for prereq_id in &prereqs {
            if let Some(prereq) = by_id.get(prereq_id.as_str()) {
                if !is_mastered(input, prereq) {
                    return Some(prereq.id.clone());
                }
            }
        }
    }

    // Rule 3: mastered or cruising, advance to the next unmastered concept.
    if mastered || accuracy > 0.90 {
        let mut seen_current = false;
        for concept in selectable {
            if concept.id == current.id {
                seen_current = true;
                continue;
            }
            if seen_current && !is_mastered(input, concept) && is_available(input, concept) {
                return Some(concept.id.clone());
            }
        }
    }

    None
}

/// Drop the last practiced concept from a pool that has alternatives.
fn apply_variety(pool: &mut Vec<(&Concept, f64)>, last_concept_id: Option<&str>) {
    if pool.len() < 2 {
        return;
    }
    if let Some(last) = last_concept_id {
        pool.retain(|(c, _)| c.id != last);
    }
}

fn variety_score(input: &FocusInput<'_>, concept: &Concept, config: &AdaptiveConfig) -> f64 {
    let need = 1.0 - mastery_of(input, &concept.id);
    let virgin = if attempts_of(input, &concept.id) == 0 {
        config.virgin_bonus
    } else {
        0.0
    };
    let recency = if input.last_concept_id == Some(concept.id.as_str()) {
        config.recency_penalty
    } else {
        0.0
    };
    need + virgin - recency
}

fn mastery_of(input: &FocusInput<'_>, concept_id: &str) -> f64 {
    input
        .skills
        .get(concept_id)
        .map(|s| s.mastery)
        .unwrap_or(0.0)
}

fn attempts_of(input: &FocusInput<'_>, concept_id: &str) -> u32 {
    input
        .skills
        .get(concept_id)
        .map(|s| s.total_attempts)
        .unwrap_or(0)
}

fn is_mastered(input: &FocusInput<'_>, concept: &Concept) -> bool {
    elo::is_mastered(mastery_of(input, &concept.id), concept.mastery_threshold)
}

/// Soft prerequisite gate: every prerequisite needs a minimum number of
/// attempts, mastery not required.
fn is_available(input: &FocusInput<'_>, concept: &Concept) -> bool {
    concept
        .prerequisites
        .iter()
        .all(|p| attempts_of(input, p) >= SOFT_PREREQ_ATTEMPTS)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::engine::analysis::{analyze, RecentAttempt};

    use super::*;

    fn concept(id: &str, order: u32, prereqs: &[&str]) -> Concept {
        Concept {
            id: id.to_string(),
            topic_id: "t1".to_string(),
            name: id.to_string(),
            description: String::new(),
            order_index: order,
            prerequisites: prereqs.iter().map(|p| p.to_string()).collect(),
            mastery_threshold: 0.75,
            visual_required: false,
            created_at: Utc::now(),
        }
    }

    fn skill(mastery: f64, attempts: u32) -> SkillState {
        SkillState {
            rating: 800.0,
            uncertainty: 350.0,
            mastery,
            total_attempts: attempts,
            correct_attempts: attempts,
            last_updated: Utc::now(),
        }
    }

    fn recent(concept_id: &str, outcomes: &[bool]) -> Vec<RecentAttempt> {
        outcomes
            .iter()
            .map(|ok| RecentAttempt {
                concept_id: concept_id.to_string(),
                is_correct: *ok,
            })
            .collect()
    }

    #[test]
    fn stays_in_sweet_spot() {
        let concepts = vec![concept("c1", 0, &[]), concept("c2", 1, &["c1"])];
        let mut skills = HashMap::new();
        skills.insert("c1".to_string(), skill(0.4, 5));
        let analysis = analyze(&recent("c1", &[true, true, true, false, true]));

        let focus = select_focus(
            &FocusInput {
                concepts: &concepts,
                skills: &skills,
                analysis: &analysis,
                current_concept_id: Some("c1"),
                last_concept_id: Some("c1"),
            },
            &AdaptiveConfig::default(),
        );
        assert_eq!(focus.as_deref(), Some("c1"));
    }

    #[test]
    fn falls_back_to_unmastered_prerequisite() {
        // c3 at 40% accuracy; prerequisite c1 is mastered, c2 is not.
        let concepts = vec![
            concept("c1", 0, &[]),
            concept("c2", 1, &[]),
            concept("c3", 2, &["c1", "c2"]),
        ];
        let mut skills = HashMap::new();
        skills.insert("c1".to_string(), skill(0.9, 10));
        skills.insert("c2".to_string(), skill(0.4, 4));
        skills.insert("c3".to_string(), skill(0.2, 5));
        let analysis = analyze(&recent("c3", &[false, false, true, false, true]));

        let focus = select_focus(
            &FocusInput {
                concepts: &concepts,
                skills: &skills,
                analysis: &analysis,
                current_concept_id: Some("c3"),
                last_concept_id: Some("c3"),
            },
            &AdaptiveConfig::default(),
        );
        assert_eq!(focus.as_deref(), Some("c2"));
    }

    #[test]
    fn advances_past_mastered_concept() {
        // A mastered concept advances focus to the next unmastered one.
        let concepts = vec![concept("c1", 0, &[]), concept("c2", 1, &[])];
        let mut skills = HashMap::new();
        skills.insert("c1".to_string(), skill(0.83, 10));
        let analysis = analyze(&recent(
            "c1",
            &[true, true, true, true, true, true, true, true, true, false],
        ));

        let focus = select_focus(
            &FocusInput {
                concepts: &concepts,
                skills: &skills,
                analysis: &analysis,
                current_concept_id: Some("c1"),
                last_concept_id: Some("c1"),
            },
            &AdaptiveConfig::default(),
        );
        assert_eq!(focus.as_deref(), Some("c2"));
    }

    #[test]
    fn picks_weakest_recent_concept() {
        let concepts = vec![concept("c1", 0, &[]), concept("c2", 1, &[])];
        let mut skills = HashMap::new();
        skills.insert("c1".to_string(), skill(0.3, 4));
        skills.insert("c2".to_string(), skill(0.3, 4));
        let mut attempts = recent("c1", &[false, false, true]);
        attempts.extend(recent("c2", &[true, true, false]));
        let analysis = analyze(&attempts);

        let focus = select_focus(
            &FocusInput {
                concepts: &concepts,
                skills: &skills,
                analysis: &analysis,
                current_concept_id: None,
                last_concept_id: Some("c2"),
            },
            &AdaptiveConfig::default(),
        );
        assert_eq!(focus.as_deref(), Some("c1"));
    }

    #[test]
    fn untouched_concept_in_order() {
        let concepts = vec![
            concept("c1", 0, &[]),
            concept("c2", 1, &[]),
            concept("c3", 2, &[]),
        ];
        let mut skills = HashMap::new();
        skills.insert("c1".to_string(), skill(0.8, 10));
        // No recent attempts at all: rules 1-4 have nothing to work with.
        let analysis = analyze(&[]);

        let focus = select_focus(
            &FocusInput {
                concepts: &concepts,
                skills: &skills,
                analysis: &analysis,
                current_concept_id: None,
                last_concept_id: None,
            },
            &AdaptiveConfig::default(),
        );
        assert_eq!(focus.as_deref(), Some("c2"));
    }

    #[test]
    fn soft_prereq_gates_untouched_concepts() {
        let concepts = vec![concept("c1", 0, &[]), concept("c2", 1, &["c1"])];
        let mut skills = HashMap::new();
        // c1 practiced once only: c2 is not yet available.
        skills.insert("c1".to_string(), skill(0.9, 1));
        let analysis = analyze(&[]);

        let focus = select_focus(
            &FocusInput {
                concepts: &concepts,
                skills: &skills,
                analysis: &analysis,
                current_concept_id: None,
                last_concept_id: None,
            },
            &AdaptiveConfig::default(),
        );
        // Falls to rule 6 and picks the lowest-mastery concept instead.
        assert_eq!(focus.as_deref(), Some("c2"));

        skills.insert("c1".to_string(), skill(0.9, 2));
        let focus = select_focus(
            &FocusInput {
                concepts: &concepts,
                skills: &skills,
                analysis: &analysis,
                current_concept_id: None,
                last_concept_id: None,
            },
            &AdaptiveConfig::default(),
        );
        assert_eq!(focus.as_deref(), Some("c2"));
    }

    #[test]
    fn never_repeats_last_concept_with_alternatives() {
        let concepts = vec![concept("c1", 0, &[]), concept("c2", 1, &[])];
        let mut skills = HashMap::new();
        skills.insert("c1".to_string(), skill(0.5, 4));
        skills.insert("c2".to_string(), skill(0.5, 4));
        let mut attempts = recent("c1", &[false, false]);
        attempts.extend(recent("c2", &[false, true]));
        let analysis = analyze(&attempts);

        let focus = select_focus(
            &FocusInput {
                concepts: &concepts,
                skills: &skills,
                analysis: &analysis,
                current_concept_id: None,
                last_concept_id: Some("c1"),
            },
            &AdaptiveConfig::default(),
        );
        // c1 is weaker but was just practiced; c2 qualifies, so c1 is skipped.
        assert_eq!(focus.as_deref(), Some("c2"));
    }

    #[test]
    fn repeats_when_sole_candidate() {
        let concepts = vec![concept("c1", 0, &[])];
        let mut skills = HashMap::new();
        skills.insert("c1".to_string(), skill(0.2, 3));
        let analysis = analyze(&recent("c1", &[false, false, false]));

        let focus = select_focus(
            &FocusInput {
                concepts: &concepts,
                skills: &skills,
                analysis: &analysis,
                current_concept_id: None,
                last_concept_id: Some("c1"),
            },
            &AdaptiveConfig::default(),
        );
        assert_eq!(focus.as_deref(), Some("c1"));
    }

    #[test]
    fn skips_visual_required_concepts() {
        let mut visual = concept("c1", 0, &[]);
        visual.visual_required = true;
        let concepts = vec![visual, concept("c2", 1, &[])];
        let analysis = analyze(&[]);

        let focus = select_focus(
            &FocusInput {
                concepts: &concepts,
                skills: &HashMap::new(),
                analysis: &analysis,
                current_concept_id: None,
                last_concept_id: None,
            },
            &AdaptiveConfig::default(),
        );
        assert_eq!(focus.as_deref(), Some("c2"));
    }
}
