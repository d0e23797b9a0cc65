//! ELO-style skill estimator with uncertainty decay.
//!
//! Core formulas:
//!   P(correct) = 1 / (1 + 10^((D - S) / scale))
//!   target D   = S + scale * log10(1/P_target - 1)
//!   delta      = K * (actual - expected)
//!   K          = base_K * (uncertainty / initial_uncertainty) * streak_bonus

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AdaptiveConfig;

/// Clamp applied to probabilities before logs and comparisons.
const P_EPSILON: f64 = 1e-6;

/// Rating range normalized into [0, 1] for the mastery blend.
const MASTERY_RATING_FLOOR: f64 = 400.0;
const MASTERY_RATING_SPAN: f64 = 1200.0;

/// Mastery blend weights: normalized rating vs recent accuracy.
const MASTERY_WEIGHT_RATING: f64 = 0.6;
const MASTERY_WEIGHT_RECENT: f64 = 0.4;

/// Correct-answer streak length that doubles the K-factor.
const STREAK_BONUS_THRESHOLD: u32 = 2;
const STREAK_BONUS: f64 = 2.0;

/// Calibration needs at least this many attempts on the concept.
const MIN_CALIBRATION_ATTEMPTS: usize = 3;

/// Per-learner, per-concept skill estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillState {
    pub rating: f64,
    pub uncertainty: f64,
    pub mastery: f64,
    pub total_attempts: u32,
    pub correct_attempts: u32,
    pub last_updated: DateTime<Utc>,
}

impl SkillState {
    /// The state an absent skill row is equivalent to.
    pub fn initial(config: &AdaptiveConfig) -> Self {
        Self {
            rating: config.initial_skill_rating,
            uncertainty: config.initial_uncertainty,
            mastery: 0.0,
            total_attempts: 0,
            correct_attempts: 0,
            last_updated: Utc::now(),
        }
    }
}

/// Probability of a correct answer given skill rating and item difficulty.
/// Clamped away from {0, 1} so downstream logs stay finite.
pub fn probability(rating: f64, difficulty: f64, config: &AdaptiveConfig) -> f64 {
    let p = 1.0 / (1.0 + 10_f64.powf((difficulty - rating) / config.elo_scale_factor));
    p.clamp(P_EPSILON, 1.0 - P_EPSILON)
}

/// Item difficulty D such that P(correct) equals the configured target rate.
/// For P = 0.8: D = S + 400 * log10(0.25) = S - 241.
pub fn target_difficulty(rating: f64, config: &AdaptiveConfig) -> f64 {
    let p = config
        .target_success_rate
        .clamp(P_EPSILON, 1.0 - P_EPSILON);
    rating + config.elo_scale_factor * (1.0 / p - 1.0).log10()
}

/// Dynamic K-factor: aggressive while uncertain, doubled during a streak.
pub fn k_factor(uncertainty: f64, streak: u32, config: &AdaptiveConfig) -> f64 {
    let bonus = if streak >= STREAK_BONUS_THRESHOLD {
        STREAK_BONUS
    } else {
        1.0
    };
    config.base_k_factor * (uncertainty / config.initial_uncertainty) * bonus
}

/// Apply one attempt outcome to a skill state. Rating moves by
/// K * (actual - expected); uncertainty decays toward its floor.
/// Mastery is left for the caller, which knows the recent accuracy.
pub fn update(
    state: &SkillState,
    is_correct: bool,
    difficulty: f64,
    streak: u32,
    config: &AdaptiveConfig,
) -> SkillState {
    let expected = probability(state.rating, difficulty, config);
    let actual = if is_correct { 1.0 } else { 0.0 };
    let k = k_factor(state.uncertainty, streak, config);

    SkillState {
        rating: state.rating + k * (actual - expected),
        uncertainty: (state.uncertainty * config.uncertainty_decay).max(config.uncertainty_floor),
        mastery: state.mastery,
        total_attempts: state.total_attempts + 1,
        correct_attempts: state.correct_attempts + u32::from(is_correct),
        last_updated: Utc::now(),
    }
}

/// Mastery in [0, 1]: normalized rating blended with recent accuracy.
pub fn mastery(rating: f64, recent_accuracy: f64) -> f64 {
    let normalized = ((rating - MASTERY_RATING_FLOOR) / MASTERY_RATING_SPAN).clamp(0.0, 1.0);
    MASTERY_WEIGHT_RATING * normalized + MASTERY_WEIGHT_RECENT * recent_accuracy
}

pub fn is_mastered(mastery: f64, threshold: f64) -> bool {
    mastery >= threshold
}

/// Pull target difficulty toward the observed success rate on this concept.
/// Below three attempts the base target is returned untouched.
pub fn calibrate(
    base_target: f64,
    recent_accuracy: f64,
    attempts_on_concept: usize,
    config: &AdaptiveConfig,
) -> f64 {
    if attempts_on_concept < MIN_CALIBRATION_ATTEMPTS {
        return base_target;
    }
    base_target + config.calibration_gain * (recent_accuracy - config.target_success_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> AdaptiveConfig {
        AdaptiveConfig::default()
    }

    #[test]
    fn probability_half_at_equal_rating() {
        let c = cfg();
        assert!((probability(800.0, 800.0, &c) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn probability_stays_in_open_interval() {
        let c = cfg();
        assert!(probability(800.0, 100_000.0, &c) > 0.0);
        assert!(probability(100_000.0, 800.0, &c) < 1.0);
    }

    #[test]
    fn target_difficulty_round_trips() {
        let c = cfg();
        let d = target_difficulty(800.0, &c);
        assert!((probability(800.0, d, &c) - 0.80).abs() < 1e-9);
        // At P = 0.8 the target sits roughly 241 points below the rating.
        assert!((d - (800.0 - 241.0)).abs() < 1.0);
    }

    #[test]
    fn correct_answer_raises_rating() {
        let c = cfg();
        let state = SkillState::initial(&c);
        let updated = update(&state, true, 600.0, 0, &c);
        assert!(updated.rating > state.rating);
        assert_eq!(updated.total_attempts, 1);
        assert_eq!(updated.correct_attempts, 1);
    }

    #[test]
    fn wrong_answer_lowers_rating() {
        let c = cfg();
        let state = SkillState::initial(&c);
        let updated = update(&state, false, 600.0, 0, &c);
        assert!(updated.rating < state.rating);
        assert_eq!(updated.correct_attempts, 0);
    }

    #[test]
    fn uncertainty_decays_ten_percent_with_floor() {
        let c = cfg();
        let state = SkillState::initial(&c);
        let updated = update(&state, true, 600.0, 0, &c);
        assert!((updated.uncertainty - 315.0).abs() < 1e-9);

        let mut s = state;
        for _ in 0..100 {
            s = update(&s, true, 600.0, 0, &c);
        }
        assert!((s.uncertainty - 50.0).abs() < 1e-9);
    }

    #[test]
    fn streak_doubles_k() {
        let c = cfg();
        assert_eq!(k_factor(350.0, 0, &c), 64.0);
        assert_eq!(k_factor(350.0, 1, &c), 64.0);
        assert_eq!(k_factor(350.0, 2, &c), 128.0);
        assert_eq!(k_factor(175.0, 5, &c), 64.0);
    }

    #[test]
    fn mastery_blend() {
        // Rating 1600 normalizes to 1.0; perfect recent accuracy gives 1.0.
        assert!((mastery(1600.0, 1.0) - 1.0).abs() < 1e-9);
        // Rating 400 normalizes to 0.0.
        assert!((mastery(400.0, 0.5) - 0.2).abs() < 1e-9);
        // Rating 1300 with 0.95 recent accuracy clears the 0.75 threshold.
        assert!(is_mastered(mastery(1300.0, 0.95), 0.75));
    }

    #[test]
    fn calibrate_needs_three_attempts() {
        let c = cfg();
        assert_eq!(calibrate(559.0, 0.2, 2, &c), 559.0);
        // 20pp below target at gain 500 lowers the target by 300.
        assert!((calibrate(559.0, 0.2, 3, &c) - (559.0 - 300.0)).abs() < 1e-9);
        // Above target pushes difficulty up.
        assert!(calibrate(559.0, 1.0, 10, &c) > 559.0);
    }
}
