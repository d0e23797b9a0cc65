//! Recent-window analysis: per-concept accuracy and the improvement trend
//! that drive focus selection.

use std::collections::HashMap;

use serde::Serialize;

/// One attempt as seen by the analyzer, newest first.
#[derive(Debug, Clone)]
pub struct RecentAttempt {
    pub concept_id: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
}

#[derive(Debug, Clone, Default)]
pub struct ConceptStats {
    /// Outcomes on this concept, newest first.
    pub results: Vec<bool>,
    pub count: usize,
    pub correct: usize,
    pub accuracy: f64,
}

#[derive(Debug, Clone)]
pub struct RecentAnalysis {
    pub overall_accuracy: f64,
    pub total_attempts: usize,
    pub per_concept: HashMap<String, ConceptStats>,
    pub trend: Trend,
}

impl RecentAnalysis {
    pub fn empty() -> Self {
        Self {
            overall_accuracy: 0.0,
            total_attempts: 0,
            per_concept: HashMap::new(),
            trend: Trend::Stable,
        }
    }

    pub fn concept_accuracy(&self, concept_id: &str) -> Option<f64> {
        self.per_concept.get(concept_id).map(|s| s.accuracy)
    }
}

/// Analyze the recent attempt window (ordered newest first).
pub fn analyze(recent: &[RecentAttempt]) -> RecentAnalysis {
    if recent.is_empty() {
        return RecentAnalysis::empty();
    }

    let total_correct = recent.iter().filter(|a| a.is_correct).count();
    let overall_accuracy = total_correct as f64 / recent.len() as f64;

    let mut per_concept: HashMap<String, ConceptStats> = HashMap::new();
    for attempt in recent {
        let stats = per_concept.entry(attempt.concept_id.clone()).or_default();
        stats.results.push(attempt.is_correct);
        stats.count += 1;
        if attempt.is_correct {
            stats.correct += 1;
        }
    }
    for stats in per_concept.values_mut() {
        stats.accuracy = stats.correct as f64 / stats.count as f64;
    }

    RecentAnalysis {
        overall_accuracy,
        total_attempts: recent.len(),
        per_concept,
        trend: compute_trend(recent),
    }
}

/// Compare the newer half of the window against the older half.
/// Requires at least three attempts per half; a >10pp gap moves the needle.
fn compute_trend(recent: &[RecentAttempt]) -> Trend {
    let half = recent.len() / 2;
    if half < 3 {
        return Trend::Stable;
    }

    let newer = &recent[..half];
    let older = &recent[half..];
    let newer_acc = newer.iter().filter(|a| a.is_correct).count() as f64 / newer.len() as f64;
    let older_acc = older.iter().filter(|a| a.is_correct).count() as f64 / older.len() as f64;

    if newer_acc - older_acc > 0.10 {
        Trend::Improving
    } else if older_acc - newer_acc > 0.10 {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempts(outcomes: &[(&str, bool)]) -> Vec<RecentAttempt> {
        outcomes
            .iter()
            .map(|(c, ok)| RecentAttempt {
                concept_id: c.to_string(),
                is_correct: *ok,
            })
            .collect()
    }

    #[test]
    fn empty_window_is_stable() {
        let analysis = analyze(&[]);
        assert_eq!(analysis.total_attempts, 0);
        assert_eq!(analysis.overall_accuracy, 0.0);
        assert_eq!(analysis.trend, Trend::Stable);
    }

    #[test]
    fn per_concept_accuracy() {
        let analysis = analyze(&attempts(&[
            ("c1", true),
            ("c1", false),
            ("c2", true),
            ("c2", true),
        ]));
        assert_eq!(analysis.concept_accuracy("c1"), Some(0.5));
        assert_eq!(analysis.concept_accuracy("c2"), Some(1.0));
        assert_eq!(analysis.overall_accuracy, 0.75);
    }

    #[test]
    fn trend_requires_six_attempts() {
        // Five attempts: even an obvious ramp stays stable.
        let analysis = analyze(&attempts(&[
            ("c1", true),
            ("c1", true),
            ("c1", true),
            ("c1", false),
            ("c1", false),
        ]));
        assert_eq!(analysis.trend, Trend::Stable);
    }

    #[test]
    fn trend_improving_when_newer_half_ahead() {
        // Newest first: newer half all correct, older half all wrong.
        let analysis = analyze(&attempts(&[
            ("c1", true),
            ("c1", true),
            ("c1", true),
            ("c1", false),
            ("c1", false),
            ("c1", false),
        ]));
        assert_eq!(analysis.trend, Trend::Improving);
    }

    #[test]
    fn trend_declining_when_newer_half_behind() {
        let analysis = analyze(&attempts(&[
            ("c1", false),
            ("c1", false),
            ("c1", false),
            ("c1", true),
            ("c1", true),
            ("c1", true),
        ]));
        assert_eq!(analysis.trend, Trend::Declining);
    }

    #[test]
    fn trend_stable_within_margin() {
        let analysis = analyze(&attempts(&[
            ("c1", true),
            ("c1", false),
            ("c1", true),
            ("c1", true),
            ("c1", false),
            ("c1", true),
        ]));
        assert_eq!(analysis.trend, Trend::Stable);
    }
}
